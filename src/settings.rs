//! # Settings Resolver
//!
//! Merges three layers into one immutable [`Settings`] value:
//!
//! 1. built-in defaults
//! 2. the configuration file (`config/bridge.config.json`)
//! 3. environment overrides
//!
//! Later layers win, and an empty string counts as "not set" in every layer.
//! An environment override may arrive under several names; for a key `K` the
//! candidates are tried in the order `NIIMBOT_K`, `NIIMBLUE_K`, `K`.
//!
//! ## Example
//!
//! ```
//! use std::collections::HashMap;
//! use niimbridge::settings::{Settings, SettingsSources};
//!
//! let mut file = HashMap::new();
//! file.insert("NIIMBLUE_NAME".to_string(), "D110_M-H123".to_string());
//! file.insert("QUANTITY".to_string(), "2".to_string());
//!
//! let mut env = HashMap::new();
//! env.insert("NIIMBOT_QUANTITY".to_string(), "3".to_string());
//!
//! let settings = Settings::resolve(&SettingsSources { file, env })?;
//! assert_eq!(settings.name, "D110_M-H123");
//! assert_eq!(settings.quantity, 3);
//! # Ok::<(), niimbridge::BridgeError>(())
//! ```

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::BridgeError;

/// Configuration file location, relative to the working directory.
pub const CONFIG_PATH: &str = "config/bridge.config.json";

/// Environment prefixes tried before the bare key, in order.
pub const ENV_PREFIXES: &[&str] = &["NIIMBOT_", "NIIMBLUE_"];

pub const KEY_NAME: &str = "NIIMBLUE_NAME";
pub const KEY_RENDER: &str = "RENDER";
pub const KEY_THRESHOLD: &str = "THRESHOLD";
pub const KEY_DIRECTION: &str = "DIRECTION";
pub const KEY_ROTATE_FOR_LEFT: &str = "ROTATE_FOR_LEFT";
pub const KEY_LABEL_TYPE: &str = "LABEL_TYPE";
pub const KEY_QUANTITY: &str = "QUANTITY";
pub const KEY_DEBUG: &str = "DEBUG";

/// Built-in default for each key.
pub const DEFAULTS: &[(&str, &str)] = &[
    (KEY_NAME, ""),
    (KEY_RENDER, "text"),
    (KEY_THRESHOLD, "60%"),
    (KEY_DIRECTION, ""),
    (KEY_ROTATE_FOR_LEFT, "0"),
    (KEY_LABEL_TYPE, "1"),
    (KEY_QUANTITY, "1"),
    (KEY_DEBUG, "0"),
];

// ============================================================================
// ENUMERATIONS
// ============================================================================

/// Image processing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Crisp edges: hard threshold, unsharp mask on vector input
    Text,
    /// Perceptual: error-diffusion dithering on vector input
    Photo,
}

impl RenderMode {
    /// Anything other than `photo` renders as text.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("photo") {
            Self::Photo
        } else {
            Self::Text
        }
    }
}

/// Feed/orientation convention of the label stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Top,
    Left,
    Right,
    Bottom,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Some(Self::Top),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Left => "left",
            Self::Right => "right",
            Self::Bottom => "bottom",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SOURCES
// ============================================================================

/// The two non-default layers, as flat string maps.
#[derive(Debug, Clone, Default)]
pub struct SettingsSources {
    /// Values from the configuration file
    pub file: HashMap<String, String>,
    /// Process environment
    pub env: HashMap<String, String>,
}

impl SettingsSources {
    /// Read the configuration file at `path` and the process environment.
    pub fn load(path: &Path) -> Self {
        Self {
            file: load_config_file(path),
            env: env_map(),
        }
    }

    /// Sources for the default configuration path under `root`.
    pub fn load_from_dir(root: &Path) -> Self {
        Self::load(&default_config_path(root))
    }
}

/// The process environment as a string map.
///
/// Variables whose name or value is not valid UTF-8 are left out; none of
/// the keys this bridge reads can be affected by that.
pub fn env_map() -> HashMap<String, String> {
    utf8_vars(std::env::vars_os())
}

/// Keep only the entries that are valid UTF-8.
pub fn utf8_vars<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// `config/bridge.config.json` under `root`.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_PATH)
}

/// Load the configuration file as a flat string map.
///
/// A missing, unreadable, or malformed file yields an empty map. Strings are
/// taken verbatim, other scalars are stringified, and `null` is dropped.
pub fn load_config_file(path: &Path) -> HashMap<String, String> {
    let Ok(text) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::Null => return None,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((key, value))
            })
            .collect(),
        _ => HashMap::new(),
    }
}

/// Look up `key` through the precedence chain: env aliases, file, default.
///
/// Empty strings are skipped at every layer.
pub fn pick(key: &str, sources: &SettingsSources) -> String {
    let env_value = ENV_PREFIXES
        .iter()
        .map(|prefix| format!("{prefix}{key}"))
        .chain(std::iter::once(key.to_string()))
        .filter_map(|name| sources.env.get(&name))
        .find(|value| !value.is_empty());
    if let Some(value) = env_value {
        return value.clone();
    }

    if let Some(value) = sources.file.get(key).filter(|v| !v.is_empty()) {
        return value.clone();
    }

    DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .unwrap_or_default()
}

/// Leading integer, clamped to at least 1; `default` when there is none.
///
/// `"2.5"` and `"2.0"` (a JSON `2.0` after stringifying) both give 2.
fn parse_count(value: &str, default: u32) -> u32 {
    match leading_integer(value) {
        Some(n) if n >= 1 => n.min(u32::MAX as i64) as u32,
        Some(_) => 1,
        None => default,
    }
}

/// Optional sign and the digits that follow it, ignoring the rest.
fn leading_integer(value: &str) -> Option<i64> {
    let s = value.trim_start();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    // Only overflow can fail here
    let magnitude = rest[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Resolved, read-only settings for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Printer identity (advertised Bluetooth name, MAC, or RFCOMM device path)
    pub name: String,
    pub render: RenderMode,
    /// Raw threshold string, e.g. `"60%"` or `"150"`
    pub threshold: String,
    /// Explicit direction override; `None` defers to the device
    pub direction: Option<Direction>,
    pub rotate_for_left: bool,
    pub label_type: u32,
    pub quantity: u32,
    pub debug: bool,
}

impl Settings {
    /// Resolve every key and validate the printer name.
    ///
    /// ## Errors
    ///
    /// Returns [`BridgeError::Config`] when the printer name is empty in all
    /// three layers.
    pub fn resolve(sources: &SettingsSources) -> Result<Self, BridgeError> {
        let name = pick(KEY_NAME, sources).trim().to_string();
        if name.is_empty() {
            return Err(BridgeError::Config(format!(
                "Set your printer name in {CONFIG_PATH} ({{\"{KEY_NAME}\":\"D110_M-....\"}}) or via env {KEY_NAME}."
            )));
        }

        let direction_raw = pick(KEY_DIRECTION, sources);
        let direction = Direction::parse(&direction_raw);
        if direction.is_none() && !direction_raw.trim().is_empty() {
            log::warn!("ignoring unknown direction '{}'", direction_raw);
        }

        Ok(Self {
            name,
            render: RenderMode::parse(&pick(KEY_RENDER, sources)),
            threshold: pick(KEY_THRESHOLD, sources),
            direction,
            rotate_for_left: pick(KEY_ROTATE_FOR_LEFT, sources) == "1",
            label_type: parse_count(&pick(KEY_LABEL_TYPE, sources), 1),
            quantity: parse_count(&pick(KEY_QUANTITY, sources), 1),
            debug: pick(KEY_DEBUG, sources) == "1",
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn with_name(env: &[(&str, &str)], file: &[(&str, &str)]) -> SettingsSources {
        let mut file = map(file);
        file.entry(KEY_NAME.to_string())
            .or_insert_with(|| "D110_M-TEST".to_string());
        SettingsSources { file, env: map(env) }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&with_name(&[], &[])).unwrap();
        assert_eq!(
            settings,
            Settings {
                name: "D110_M-TEST".into(),
                render: RenderMode::Text,
                threshold: "60%".into(),
                direction: None,
                rotate_for_left: false,
                label_type: 1,
                quantity: 1,
                debug: false,
            }
        );
    }

    #[test]
    fn test_precedence_env_file_default() {
        let all = with_name(&[("QUANTITY", "4")], &[("QUANTITY", "3")]);
        assert_eq!(pick(KEY_QUANTITY, &all), "4");

        let file_only = with_name(&[], &[("QUANTITY", "3")]);
        assert_eq!(pick(KEY_QUANTITY, &file_only), "3");

        let neither = with_name(&[], &[]);
        assert_eq!(pick(KEY_QUANTITY, &neither), "1");
    }

    #[test]
    fn test_env_alias_order() {
        let sources = with_name(
            &[
                ("NIIMBOT_RENDER", "photo"),
                ("NIIMBLUE_RENDER", "text"),
                ("RENDER", "text"),
            ],
            &[],
        );
        assert_eq!(pick(KEY_RENDER, &sources), "photo");

        let sources = with_name(&[("NIIMBLUE_RENDER", "photo"), ("RENDER", "text")], &[]);
        assert_eq!(pick(KEY_RENDER, &sources), "photo");
    }

    #[test]
    fn test_empty_values_are_absent() {
        let sources = with_name(
            &[("NIIMBOT_THRESHOLD", ""), ("THRESHOLD", "")],
            &[("THRESHOLD", "")],
        );
        assert_eq!(pick(KEY_THRESHOLD, &sources), "60%");

        // Empty first alias falls through to the next one
        let sources = with_name(&[("NIIMBOT_THRESHOLD", ""), ("THRESHOLD", "70%")], &[]);
        assert_eq!(pick(KEY_THRESHOLD, &sources), "70%");
    }

    #[test]
    fn test_counts_clamped_and_defaulted() {
        let s = Settings::resolve(&with_name(&[("LABEL_TYPE", "0"), ("QUANTITY", "-3")], &[]))
            .unwrap();
        assert_eq!(s.label_type, 1);
        assert_eq!(s.quantity, 1);

        let s = Settings::resolve(&with_name(&[("QUANTITY", "lots")], &[])).unwrap();
        assert_eq!(s.quantity, 1);

        let s = Settings::resolve(&with_name(&[("LABEL_TYPE", "2")], &[])).unwrap();
        assert_eq!(s.label_type, 2);
    }

    #[test]
    fn test_counts_take_leading_integer() {
        let s = Settings::resolve(&with_name(&[("QUANTITY", "2.5"), ("LABEL_TYPE", " 3 labels")], &[]))
            .unwrap();
        assert_eq!(s.quantity, 2);
        assert_eq!(s.label_type, 3);

        let s = Settings::resolve(&with_name(&[("QUANTITY", "-0.5")], &[])).unwrap();
        assert_eq!(s.quantity, 1);

        let s = Settings::resolve(&with_name(&[("QUANTITY", ".5")], &[])).unwrap();
        assert_eq!(s.quantity, 1);

        assert_eq!(parse_count("99999999999999999999", 1), u32::MAX);
    }

    #[test]
    fn test_json_float_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.config.json");
        fs::write(&path, r#"{"NIIMBLUE_NAME": "B1-1", "QUANTITY": 2.0}"#).unwrap();
        let sources = SettingsSources {
            file: load_config_file(&path),
            env: HashMap::new(),
        };
        assert_eq!(Settings::resolve(&sources).unwrap().quantity, 2);
    }

    #[test]
    fn test_non_utf8_environment_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let vars = vec![
            (OsString::from("NIIMBOT_QUANTITY"), OsString::from("2")),
            (OsString::from("FRONTEND_USER"), OsStr::from_bytes(b"J\xE9r").to_os_string()),
            (OsStr::from_bytes(b"K\xE9Y").to_os_string(), OsString::from("x")),
        ];
        let env = utf8_vars(vars);
        assert_eq!(env.len(), 1);
        assert_eq!(env["NIIMBOT_QUANTITY"], "2");
    }

    #[test]
    fn test_booleans_only_exact_one() {
        let s = Settings::resolve(&with_name(&[("DEBUG", "1"), ("ROTATE_FOR_LEFT", "1")], &[]))
            .unwrap();
        assert!(s.debug);
        assert!(s.rotate_for_left);

        let s = Settings::resolve(&with_name(&[("DEBUG", "true"), ("ROTATE_FOR_LEFT", "yes")], &[]))
            .unwrap();
        assert!(!s.debug);
        assert!(!s.rotate_for_left);
    }

    #[test]
    fn test_direction_and_render_parsing() {
        let s = Settings::resolve(&with_name(&[("DIRECTION", "LEFT"), ("RENDER", "Photo")], &[]))
            .unwrap();
        assert_eq!(s.direction, Some(Direction::Left));
        assert_eq!(s.render, RenderMode::Photo);

        let s = Settings::resolve(&with_name(&[("DIRECTION", "sideways")], &[])).unwrap();
        assert_eq!(s.direction, None);
    }

    #[test]
    fn test_missing_name_is_config_error() {
        let sources = SettingsSources::default();
        let err = Settings::resolve(&sources).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains(KEY_NAME));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_config_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"NIIMBLUE_NAME":"B1-G123","THRESHOLD":"55%","LABEL_TYPE":2,"DEBUG":true,"DIRECTION":null}"#,
        )
        .unwrap();

        let file = load_config_file(&path);
        assert_eq!(file.get("LABEL_TYPE").map(String::as_str), Some("2"));
        assert_eq!(file.get("DEBUG").map(String::as_str), Some("true"));
        assert!(!file.contains_key("DIRECTION"));

        let settings = Settings::resolve(&SettingsSources { file, env: HashMap::new() }).unwrap();
        assert_eq!(settings.name, "B1-G123");
        assert_eq!(settings.threshold, "55%");
        assert_eq!(settings.label_type, 2);
        assert!(!settings.debug);
    }

    #[test]
    fn test_bad_config_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_file(&dir.path().join("missing.json")).is_empty());

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_config_file(&path).is_empty());

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(load_config_file(&path).is_empty());
    }
}
