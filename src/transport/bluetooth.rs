//! # Bluetooth RFCOMM Transport
//!
//! This module provides communication with NIIMBOT printers over the
//! Bluetooth Serial Port Profile (SPP) via RFCOMM.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired. Binding to an RFCOMM device happens on demand
//! when the printer is named by MAC address or advertised name, or can be
//! done once by hand:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Look for "D110_M-..." or "B1-..."
//! [bluetooth]# pair 00:11:62:XX:XX:XX
//!
//! $ sudo rfcomm bind 0 00:11:62:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened read/write in raw mode so binary packets pass
//! unmodified. Reads block for at most [`READ_TIMEOUT_DECISECONDS`] tenths of
//! a second (`VMIN = 0`, `VTIME = n`), which bounds every wait for a response.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::error::BridgeError;

/// Default chunk size for writes (bytes)
const CHUNK_SIZE: usize = 512;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

/// Per-read timeout in tenths of a second
pub const READ_TIMEOUT_DECISECONDS: u8 = 10;

/// # Bluetooth Printer Transport
///
/// Manages a connection to a printer over a bound RFCOMM device.
pub struct BluetoothTransport {
    file: File,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BluetoothTransport {
    /// Open a Bluetooth connection to the printer.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The device doesn't exist
    /// - Permission denied (may need root or dialout group)
    /// - TTY configuration fails
    pub fn open<P: AsRef<Path>>(device: P) -> Result<Self, BridgeError> {
        let path = device.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                BridgeError::Transport(format!("Failed to open {}: {}", path.display(), e))
            })?;

        configure_tty_raw(file.as_raw_fd())?;

        Ok(Self {
            file,
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        })
    }

    /// Write data to the printer, chunking large writes.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        if data.len() <= self.chunk_size {
            self.file
                .write_all(data)
                .map_err(|e| BridgeError::Transport(format!("Write failed: {}", e)))?;
        } else {
            for chunk in data.chunks(self.chunk_size) {
                self.file
                    .write_all(chunk)
                    .map_err(|e| BridgeError::Transport(format!("Write failed: {}", e)))?;

                if !self.chunk_delay.is_zero() {
                    thread::sleep(self.chunk_delay);
                }
            }
        }

        self.file
            .flush()
            .map_err(|e| BridgeError::Transport(format!("Flush failed: {}", e)))
    }

    /// Read whatever is available, waiting at most one read timeout.
    ///
    /// Returns an empty vector when nothing arrived in time.
    pub fn read_available(&mut self) -> Result<Vec<u8>, BridgeError> {
        let mut buf = [0u8; 256];
        match self.file.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) => Err(BridgeError::Transport(format!("Read failed: {}", e))),
        }
    }
}

/// Configure a file descriptor for raw TTY mode.
///
/// This disables all input/output processing so binary data passes through
/// unmodified, and sets a bounded read timeout.
///
/// Note: IXON/IXOFF/IXANY disable XON/XOFF software flow control. This is critical
/// because 0x11 (XON/DC1) and 0x13 (XOFF/DC3) appear in packet payloads.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> Result<(), BridgeError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(BridgeError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);

    termios.c_oflag &= !libc::OPOST;

    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;

    // Non-blocking-ish reads: return after VTIME even with no data
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = READ_TIMEOUT_DECISECONDS;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(BridgeError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_fd: i32) -> Result<(), BridgeError> {
    Ok(())
}

// ============================================================================
// DEVICE RESOLUTION
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find the MAC of a known device by its advertised name in `bluetoothctl devices` output.
///
/// Lines look like `Device 00:11:22:33:44:55 D110_M-H123456`. Matching is
/// exact first, then case-insensitive.
pub fn mac_for_name_in(listing: &str, name: &str) -> Option<String> {
    let devices: Vec<(&str, &str)> = listing
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (mac, device_name) = rest.split_once(' ')?;
            is_valid_mac(mac).then_some((mac, device_name.trim()))
        })
        .collect();

    devices
        .iter()
        .find(|(_, n)| *n == name)
        .or_else(|| devices.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)))
        .map(|(mac, _)| mac.to_uppercase())
}

/// Look up a device name through `bluetoothctl devices`.
pub fn find_mac_for_name(name: &str) -> Result<Option<String>, BridgeError> {
    let output = Command::new("bluetoothctl")
        .arg("devices")
        .output()
        .map_err(|e| BridgeError::Transport(format!("Failed to run bluetoothctl: {}", e)))?;
    Ok(mac_for_name_in(&String::from_utf8_lossy(&output.stdout), name))
}

/// Find an RFCOMM device in `rfcomm`-style listing lines for a MAC.
///
/// Lines look like `rfcomm0: 00:11:22:33:44:55 channel 1 clean`.
pub fn rfcomm_device_in(listing: &str, mac: &str) -> Option<String> {
    let mac_upper = mac.to_uppercase();
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|dev_name| format!("/dev/{}", dev_name.trim()))
        .next()
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a` command.
#[cfg(unix)]
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>, BridgeError> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = rfcomm_device_in(&contents, mac).filter(|p| Path::new(p).exists()) {
            return Ok(Some(path));
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| BridgeError::Transport(format!("Failed to run 'rfcomm -a': {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(rfcomm_device_in(&stdout, mac).filter(|p| Path::new(p).exists()))
}

#[cfg(not(unix))]
pub fn find_rfcomm_for_mac(_mac: &str) -> Result<Option<String>, BridgeError> {
    Ok(None)
}

/// Set up an RFCOMM device for a Bluetooth MAC address.
///
/// Runs:
/// 1. `bluetoothctl connect <MAC>` - connect to device
/// 2. `rfcomm bind <channel> <MAC> 1` - create /dev/rfcommN
///
/// **Requires root privileges** for `rfcomm bind`.
#[cfg(unix)]
pub fn setup_rfcomm(mac: &str, channel: u8) -> Result<String, BridgeError> {
    let mac_upper = mac.to_uppercase();
    let device_path = format!("/dev/rfcomm{}", channel);

    log::info!("Connecting to {}...", mac_upper);
    let output = Command::new("bluetoothctl")
        .arg("connect")
        .arg(&mac_upper)
        .output()
        .map_err(|e| BridgeError::Transport(format!("Failed to run bluetoothctl: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !(stdout.contains("Connection successful") || stdout.contains("already connected")) {
        // Continue anyway - bind/open will fail loudly if the device is gone
        log::info!("bluetoothctl returned: {}", stdout.trim());
    }

    thread::sleep(Duration::from_millis(500));

    log::info!("Binding rfcomm{}...", channel);
    let output = Command::new("rfcomm")
        .arg("bind")
        .arg(channel.to_string())
        .arg(&mac_upper)
        .arg("1") // RFCOMM channel 1 (standard for SPP)
        .output()
        .map_err(|e| BridgeError::Transport(format!("Failed to run rfcomm bind: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BridgeError::Transport(format!(
            "rfcomm bind failed: {}",
            stderr.trim()
        )));
    }

    thread::sleep(Duration::from_millis(500));

    if !Path::new(&device_path).exists() {
        return Err(BridgeError::Transport(format!(
            "Device {} was not created",
            device_path
        )));
    }

    log::info!("Created {}", device_path);
    Ok(device_path)
}

#[cfg(not(unix))]
pub fn setup_rfcomm(_mac: &str, _channel: u8) -> Result<String, BridgeError> {
    Err(BridgeError::Transport(
        "RFCOMM setup not supported on this platform".to_string(),
    ))
}

/// First `/dev/rfcommN` that does not exist yet.
fn free_rfcomm_channel() -> u8 {
    (0..=u8::MAX)
        .find(|n| !Path::new(&format!("/dev/rfcomm{}", n)).exists())
        .unwrap_or(0)
}

/// Turn a printer identity into an RFCOMM device path.
///
/// - `/dev/...` paths are used as-is
/// - MAC addresses are looked up, and bound if no device exists yet
/// - anything else is treated as an advertised name and resolved to a MAC
pub fn resolve_device(name: &str) -> Result<String, BridgeError> {
    if name.starts_with("/dev/") {
        return Ok(name.to_string());
    }

    let mac = if is_valid_mac(name) {
        name.to_uppercase()
    } else {
        find_mac_for_name(name)?.ok_or_else(|| {
            BridgeError::Transport(format!(
                "No paired Bluetooth device named '{}' (pair it with bluetoothctl first)",
                name
            ))
        })?
    };

    if let Some(device) = find_rfcomm_for_mac(&mac)? {
        return Ok(device);
    }
    setup_rfcomm(&mac, free_rfcomm_channel())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac(""));
        assert!(!is_valid_mac("D110_M-H123"));
    }

    #[test]
    fn test_mac_for_name() {
        let listing = "Device 11:22:33:44:55:66 Headphones\n\
                       Device aa:bb:cc:dd:ee:ff D110_M-H123456789\n\
                       Device 00:00:00:00:00:01 B1-G220\n";
        assert_eq!(
            mac_for_name_in(listing, "D110_M-H123456789"),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(
            mac_for_name_in(listing, "b1-g220"),
            Some("00:00:00:00:00:01".to_string())
        );
        assert_eq!(mac_for_name_in(listing, "D11-X"), None);
        assert_eq!(mac_for_name_in("", "B1-G220"), None);
    }

    #[test]
    fn test_rfcomm_device_in_listing() {
        let listing = "rfcomm0: 11:22:33:44:55:66 channel 1 clean\n\
                       rfcomm3: AA:BB:CC:DD:EE:FF channel 1 connected\n";
        assert_eq!(
            rfcomm_device_in(listing, "aa:bb:cc:dd:ee:ff"),
            Some("/dev/rfcomm3".to_string())
        );
        assert_eq!(rfcomm_device_in(listing, "00:00:00:00:00:00"), None);
    }

    #[test]
    fn test_device_path_passthrough() {
        assert_eq!(resolve_device("/dev/rfcomm7").unwrap(), "/dev/rfcomm7");
    }

    #[test]
    fn test_open_missing_device() {
        let err = BluetoothTransport::open("/dev/niimbridge-no-such-device").err().unwrap();
        assert!(matches!(err, BridgeError::Transport(_)));
    }
}
