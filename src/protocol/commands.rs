//! # NIIMBOT Commands
//!
//! Request builders for the label printer command set. Most requests are
//! answered by a response whose code is the request code plus a fixed
//! offset (usually 1); image row packets get no response.
//!
//! | Request | Code | Response | Payload |
//! |---------|------|----------|---------|
//! | Connect | 0xC1 | 0xC2 | `01` |
//! | Get info | 0x40 | 0x40 + key | `key` |
//! | Label density | 0x21 | 0x22 | `density` |
//! | Label type | 0x23 | 0x24 | `type` |
//! | Start print | 0x01 | 0x02 | `01` |
//! | Start page | 0x03 | 0x04 | `01` |
//! | Page size | 0x13 | 0x14 | `rows:u16 cols:u16` |
//! | Quantity | 0x15 | 0x16 | `count:u16` |
//! | Empty row | 0x84 | - | `row:u16 repeat:u8` |
//! | Bitmap row | 0x85 | - | `row:u16 counts:3×u8 repeat:u8 bits...` |
//! | End page | 0xE3 | 0xE4 | `01` |
//! | Print status | 0xA3 | 0xB3 | `01` |
//! | End print | 0xF3 | 0xF4 | `01` |
//!
//! A response with code `0xDB` reports a printer-side error.

use crate::protocol::packet::Packet;

/// Response code the printer uses to report an error.
pub const ERROR_RESPONSE: u8 = 0xDB;

/// Request codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCode {
    StartPrint = 0x01,
    StartPagePrint = 0x03,
    SetPageSize = 0x13,
    SetQuantity = 0x15,
    SetLabelDensity = 0x21,
    SetLabelType = 0x23,
    GetInfo = 0x40,
    PrintEmptyRow = 0x84,
    PrintBitmapRow = 0x85,
    GetPrintStatus = 0xA3,
    Connect = 0xC1,
    EndPagePrint = 0xE3,
    EndPrint = 0xF3,
}

impl RequestCode {
    /// Code of the matching response.
    pub fn response_code(self) -> u8 {
        match self {
            Self::GetPrintStatus => self as u8 + 0x10,
            other => other as u8 + 1,
        }
    }
}

/// Keys for [`get_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    AutoShutdownTime = 7,
    PrinterModelId = 8,
    SoftwareVersion = 9,
    BatteryChargeLevel = 10,
    SerialNumber = 11,
    HardwareVersion = 12,
}

impl InfoKey {
    pub fn response_code(self) -> u8 {
        RequestCode::GetInfo as u8 + self as u8
    }
}

fn simple(code: RequestCode, data: Vec<u8>) -> Packet {
    Packet::new(code as u8, data)
}

pub fn connect() -> Packet {
    simple(RequestCode::Connect, vec![1])
}

pub fn get_info(key: InfoKey) -> Packet {
    simple(RequestCode::GetInfo, vec![key as u8])
}

pub fn set_label_density(density: u8) -> Packet {
    simple(RequestCode::SetLabelDensity, vec![density])
}

pub fn set_label_type(label_type: u8) -> Packet {
    simple(RequestCode::SetLabelType, vec![label_type])
}

pub fn start_print() -> Packet {
    simple(RequestCode::StartPrint, vec![1])
}

pub fn end_print() -> Packet {
    simple(RequestCode::EndPrint, vec![1])
}

pub fn start_page_print() -> Packet {
    simple(RequestCode::StartPagePrint, vec![1])
}

pub fn end_page_print() -> Packet {
    simple(RequestCode::EndPagePrint, vec![1])
}

pub fn get_print_status() -> Packet {
    simple(RequestCode::GetPrintStatus, vec![1])
}

/// Page geometry as printed: `rows` along the feed, `cols` across the head.
pub fn set_page_size(rows: u16, cols: u16) -> Packet {
    let mut data = Vec::with_capacity(4);
    data.extend(rows.to_be_bytes());
    data.extend(cols.to_be_bytes());
    simple(RequestCode::SetPageSize, data)
}

pub fn set_quantity(quantity: u16) -> Packet {
    simple(RequestCode::SetQuantity, quantity.to_be_bytes().to_vec())
}

/// `repeat` blank rows starting at `row`.
pub fn print_empty_row(row: u16, repeat: u8) -> Packet {
    let mut data = Vec::with_capacity(3);
    data.extend(row.to_be_bytes());
    data.push(repeat);
    simple(RequestCode::PrintEmptyRow, data)
}

/// Row index, three black-pixel counts, and repeat count ahead of the bits.
pub const BITMAP_ROW_HEADER: usize = 6;

/// One packed row, printed `repeat` times starting at `row`.
pub fn print_bitmap_row(row: u16, bits: &[u8], repeat: u8) -> Packet {
    let counts = black_pixel_counts(bits);
    let mut data = Vec::with_capacity(BITMAP_ROW_HEADER + bits.len());
    data.extend(row.to_be_bytes());
    data.extend(counts);
    data.push(repeat);
    data.extend(bits);
    simple(RequestCode::PrintBitmapRow, data)
}

/// Black pixel counts for the three thirds of a packed row, saturated at 255.
pub fn black_pixel_counts(bits: &[u8]) -> [u8; 3] {
    let chunk = bits.len().div_ceil(3).max(1);
    let mut counts = [0u8; 3];
    for (i, part) in bits.chunks(chunk).take(3).enumerate() {
        let ones: u32 = part.iter().map(|b| b.count_ones()).sum();
        counts[i] = ones.min(255) as u8;
    }
    counts
}

/// Decoded print-status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintStatus {
    /// Pages completed so far
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

impl PrintStatus {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        Some(Self {
            page: u16::from_be_bytes([data[0], data[1]]),
            progress1: data[2],
            progress2: data[3],
        })
    }
}

/// Interpret a one-byte acknowledgement payload.
pub fn is_ack(packet: &Packet) -> bool {
    packet.data.first().is_some_and(|&b| b != 0)
}

/// Big-endian unsigned integer from an info payload.
pub fn info_value(data: &[u8]) -> u64 {
    data.iter().take(8).fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes() {
        assert_eq!(RequestCode::Connect.response_code(), 0xC2);
        assert_eq!(RequestCode::SetLabelDensity.response_code(), 0x22);
        assert_eq!(RequestCode::GetPrintStatus.response_code(), 0xB3);
        assert_eq!(InfoKey::PrinterModelId.response_code(), 0x48);
    }

    #[test]
    fn test_page_size_big_endian() {
        let packet = set_page_size(320, 96);
        assert_eq!(packet.cmd, 0x13);
        assert_eq!(packet.data, vec![0x01, 0x40, 0x00, 0x60]);
    }

    #[test]
    fn test_quantity() {
        assert_eq!(set_quantity(2).data, vec![0x00, 0x02]);
    }

    #[test]
    fn test_bitmap_row_layout() {
        let bits = [0xFF, 0x00, 0x0F];
        let packet = print_bitmap_row(7, &bits, 2);
        assert_eq!(packet.cmd, 0x85);
        assert_eq!(packet.data, vec![0x00, 0x07, 8, 0, 4, 2, 0xFF, 0x00, 0x0F]);
    }

    #[test]
    fn test_empty_row_layout() {
        assert_eq!(print_empty_row(300, 20).data, vec![0x01, 0x2C, 20]);
    }

    #[test]
    fn test_black_pixel_counts_saturate() {
        let bits = vec![0xFF; 96];
        assert_eq!(black_pixel_counts(&bits), [255, 255, 255]);
        assert_eq!(black_pixel_counts(&[]), [0, 0, 0]);
    }

    #[test]
    fn test_print_status_parse() {
        let status = PrintStatus::parse(&[0x00, 0x02, 100, 100]).unwrap();
        assert_eq!(status.page, 2);
        assert!(PrintStatus::parse(&[0x00]).is_none());
    }

    #[test]
    fn test_info_value() {
        assert_eq!(info_value(&[0x09, 0x00]), 2304);
        assert_eq!(info_value(&[]), 0);
    }
}
