//! # NIIMBOT Print Client
//!
//! Drives the NIIMBOT command set over a byte-stream [`Wire`] and implements
//! [`PrinterLink`] on top of the Bluetooth RFCOMM transport.
//!
//! ## Print Task
//!
//! ```text
//! density → label type → start print → start page → page size → quantity
//!   → rows (blank rows and repeats collapsed)
//!   → end page (retried) → poll status until page == quantity → end print
//! ```

use std::thread;
use std::time::Duration;

use crate::error::BridgeError;
use crate::printer::config::ModelMetadata;
use crate::printer::link::{PrintOptions, PrinterLink};
use crate::protocol::commands::{self, ERROR_RESPONSE, InfoKey, PrintStatus, RequestCode};
use crate::protocol::encoder::{self, EncodedImage};
use crate::protocol::packet::{Packet, PacketReader};
use crate::transport::BluetoothTransport;
use crate::transport::bluetooth;

/// Reads to attempt while waiting for one response.
const RESPONSE_READS: usize = 5;

/// Attempts at closing the page before giving up.
const END_PAGE_ATTEMPTS: usize = 20;

/// Print-status polls before giving up.
const STATUS_POLL_ATTEMPTS: usize = 300;

/// Pause between retries and status polls (milliseconds).
const POLL_DELAY_MS: u64 = 100;

/// A raw byte stream to the printer.
pub trait Wire {
    fn write_all(&mut self, data: &[u8]) -> Result<(), BridgeError>;

    /// Bytes received so far; empty when a read timed out.
    fn read_available(&mut self) -> Result<Vec<u8>, BridgeError>;
}

impl Wire for BluetoothTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        BluetoothTransport::write_all(self, data)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, BridgeError> {
        BluetoothTransport::read_available(self)
    }
}

/// Request/response client for one connected printer.
pub struct NiimbotClient<W: Wire> {
    wire: W,
    reader: PacketReader,
    poll_delay: Duration,
}

impl<W: Wire> NiimbotClient<W> {
    pub fn new(wire: W) -> Self {
        Self {
            wire,
            reader: PacketReader::new(),
            poll_delay: Duration::from_millis(POLL_DELAY_MS),
        }
    }

    /// Change the pause between retries.
    pub fn set_poll_delay(&mut self, delay: Duration) {
        self.poll_delay = delay;
    }

    pub fn into_inner(self) -> W {
        self.wire
    }

    /// Send without waiting for a response.
    pub fn send(&mut self, packet: &Packet) -> Result<(), BridgeError> {
        self.wire.write_all(&packet.to_bytes()?)
    }

    /// Send and wait for the response with code `expected`.
    pub fn transceive(&mut self, packet: &Packet, expected: u8) -> Result<Packet, BridgeError> {
        self.send(packet)?;
        for _ in 0..RESPONSE_READS {
            let bytes = self.wire.read_available()?;
            self.reader.push(&bytes);
            while let Some(response) = self.reader.next_packet() {
                let response = response?;
                if response.cmd == expected {
                    return Ok(response);
                }
                if response.cmd == ERROR_RESPONSE {
                    return Err(BridgeError::Print(format!(
                        "printer reported error {:02X?} for request 0x{:02X}",
                        response.data, packet.cmd
                    )));
                }
                log::debug!("ignoring unsolicited packet 0x{:02X}", response.cmd);
            }
        }
        Err(BridgeError::Transport(format!(
            "no response to request 0x{:02X}",
            packet.cmd
        )))
    }

    fn request(&mut self, packet: &Packet, code: RequestCode) -> Result<Packet, BridgeError> {
        self.transceive(packet, code.response_code())
    }

    fn expect_ack(&mut self, packet: &Packet, code: RequestCode) -> Result<(), BridgeError> {
        let response = self.request(packet, code)?;
        if commands::is_ack(&response) {
            Ok(())
        } else {
            Err(BridgeError::Print(format!(
                "printer rejected {:?} ({:02X?})",
                code, response.data
            )))
        }
    }

    /// Open a session with the printer.
    pub fn handshake(&mut self) -> Result<(), BridgeError> {
        self.request(&commands::connect(), RequestCode::Connect)
            .map(|_| ())
    }

    /// Query one info value.
    pub fn get_info(&mut self, key: InfoKey) -> Result<u64, BridgeError> {
        let response = self.transceive(&commands::get_info(key), key.response_code())?;
        Ok(commands::info_value(&response.data))
    }

    /// Device-reported model metadata; `None` for an unknown model id.
    pub fn model_metadata(&mut self) -> Result<Option<ModelMetadata>, BridgeError> {
        let id = self.get_info(InfoKey::PrinterModelId)?;
        log::info!("printer model id {}", id);
        Ok(ModelMetadata::from_model_id(id))
    }

    pub fn print_status(&mut self) -> Result<PrintStatus, BridgeError> {
        let response = self.request(&commands::get_print_status(), RequestCode::GetPrintStatus)?;
        PrintStatus::parse(&response.data)
            .ok_or_else(|| BridgeError::Protocol("short print status response".into()))
    }

    /// Run the full print task for one image.
    pub fn print_image(
        &mut self,
        image: &EncodedImage,
        options: &PrintOptions,
    ) -> Result<(), BridgeError> {
        image.validate()?;
        let label_type = u8::try_from(options.label_type).map_err(|_| {
            BridgeError::Print(format!("label type {} out of range", options.label_type))
        })?;
        let quantity = u16::try_from(options.quantity).map_err(|_| {
            BridgeError::Print(format!("quantity {} out of range", options.quantity))
        })?;

        self.expect_ack(
            &commands::set_label_density(options.density.value()),
            RequestCode::SetLabelDensity,
        )?;
        self.expect_ack(&commands::set_label_type(label_type), RequestCode::SetLabelType)?;
        self.expect_ack(&commands::start_print(), RequestCode::StartPrint)?;
        self.expect_ack(&commands::start_page_print(), RequestCode::StartPagePrint)?;
        self.expect_ack(
            &commands::set_page_size(image.row_count(), image.cols),
            RequestCode::SetPageSize,
        )?;
        self.expect_ack(&commands::set_quantity(quantity), RequestCode::SetQuantity)?;

        for (row, repeat, bits) in image.runs() {
            let packet = if encoder::is_blank(bits) {
                commands::print_empty_row(row, repeat)
            } else {
                commands::print_bitmap_row(row, bits, repeat)
            };
            self.send(&packet)?;
        }

        self.end_page()?;
        self.wait_for_pages(quantity)?;
        self.expect_ack(&commands::end_print(), RequestCode::EndPrint)
    }

    fn end_page(&mut self) -> Result<(), BridgeError> {
        for _ in 0..END_PAGE_ATTEMPTS {
            let response = self.request(&commands::end_page_print(), RequestCode::EndPagePrint)?;
            if commands::is_ack(&response) {
                return Ok(());
            }
            thread::sleep(self.poll_delay);
        }
        Err(BridgeError::Print("printer did not accept end of page".into()))
    }

    fn wait_for_pages(&mut self, quantity: u16) -> Result<(), BridgeError> {
        for _ in 0..STATUS_POLL_ATTEMPTS {
            let status = self.print_status()?;
            log::debug!(
                "print status: page {}/{} progress {}/{}",
                status.page,
                quantity,
                status.progress1,
                status.progress2
            );
            if status.page >= quantity {
                return Ok(());
            }
            thread::sleep(self.poll_delay);
        }
        Err(BridgeError::Print(format!(
            "printer did not report {} finished page(s)",
            quantity
        )))
    }
}

// ============================================================================
// LINK
// ============================================================================

/// [`PrinterLink`] for a NIIMBOT printer over Bluetooth RFCOMM.
pub struct NiimbotLink {
    name: String,
    client: Option<NiimbotClient<BluetoothTransport>>,
    metadata: Option<ModelMetadata>,
}

impl NiimbotLink {
    /// A disconnected link to the printer identified by `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            client: None,
            metadata: ModelMetadata::from_device_name(name),
        }
    }

    /// Prefer what the printer reports; keep the name-derived metadata otherwise.
    fn adopt_reported(&mut self, reported: Result<Option<ModelMetadata>, BridgeError>) {
        match reported {
            Ok(Some(metadata)) => self.metadata = Some(metadata),
            Ok(None) => log::info!("unknown model id, using name '{}'", self.name),
            Err(e) => log::info!("model id unavailable: {}", e),
        }
    }

    fn client(&mut self) -> Result<&mut NiimbotClient<BluetoothTransport>, BridgeError> {
        self.client
            .as_mut()
            .ok_or_else(|| BridgeError::Transport("printer is not connected".into()))
    }
}

impl PrinterLink for NiimbotLink {
    fn connect(&mut self) -> Result<(), BridgeError> {
        let device = bluetooth::resolve_device(&self.name)?;
        log::info!("connecting to {} via {}", self.name, device);

        let mut client = NiimbotClient::new(BluetoothTransport::open(&device)?);
        if let Err(e) = client.handshake() {
            // Older firmware does not answer the connect request
            log::info!("handshake skipped: {}", e);
        }
        let reported = client.model_metadata();
        self.adopt_reported(reported);
        self.client = Some(client);
        Ok(())
    }

    fn metadata(&self) -> Option<ModelMetadata> {
        self.metadata.clone()
    }

    fn print(&mut self, image: &EncodedImage, options: &PrintOptions) -> Result<(), BridgeError> {
        self.client()?.print_image(image, options)
    }

    fn disconnect(&mut self) -> Result<(), BridgeError> {
        // Closing the device ends the RFCOMM session
        self.client.take();
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipp::Density;
    use crate::settings::Direction;
    use std::collections::VecDeque;

    /// Answers every request the way a healthy printer would.
    #[derive(Default)]
    struct FakePrinter {
        sent: Vec<Packet>,
        pending: VecDeque<u8>,
        quantity: u16,
        status_polls_until_done: usize,
        reject: Option<u8>,
        silent: bool,
        model_id: Option<u16>,
    }

    impl Wire for FakePrinter {
        fn write_all(&mut self, data: &[u8]) -> Result<(), BridgeError> {
            let packet = Packet::from_bytes(data)?;
            self.sent.push(packet.clone());
            if self.silent {
                return Ok(());
            }

            let response = match packet.cmd {
                0x84 | 0x85 => None,
                0x15 => {
                    self.quantity = u16::from_be_bytes([packet.data[0], packet.data[1]]);
                    Some(Packet::new(0x16, vec![1]))
                }
                0xA3 => {
                    let page = if self.status_polls_until_done == 0 {
                        self.quantity
                    } else {
                        self.status_polls_until_done -= 1;
                        0
                    };
                    let mut data = page.to_be_bytes().to_vec();
                    data.extend([100, 100]);
                    Some(Packet::new(0xB3, data))
                }
                0x40 => {
                    let id = self.model_id.unwrap_or(2304);
                    Some(Packet::new(0x40 + packet.data[0], id.to_be_bytes().to_vec()))
                }
                cmd if Some(cmd) == self.reject => Some(Packet::new(cmd + 1, vec![0])),
                cmd => Some(Packet::new(cmd + 1, vec![1])),
            };
            if let Some(response) = response {
                self.pending.extend(response.to_bytes().unwrap());
            }
            Ok(())
        }

        fn read_available(&mut self) -> Result<Vec<u8>, BridgeError> {
            Ok(self.pending.drain(..).collect())
        }
    }

    fn options(quantity: u32) -> PrintOptions {
        PrintOptions {
            density: Density::new(3),
            label_type: 1,
            quantity,
        }
    }

    fn image() -> EncodedImage {
        EncodedImage {
            cols: 16,
            rows: vec![vec![0, 0], vec![0, 0], vec![0xFF, 0x00], vec![0, 0]],
        }
    }

    fn client(fake: FakePrinter) -> NiimbotClient<FakePrinter> {
        let mut client = NiimbotClient::new(fake);
        client.set_poll_delay(Duration::ZERO);
        client
    }

    #[test]
    fn test_print_task_sequence() {
        let mut client = client(FakePrinter {
            status_polls_until_done: 2,
            ..Default::default()
        });
        client.print_image(&image(), &options(2)).unwrap();

        let cmds: Vec<u8> = client.into_inner().sent.iter().map(|p| p.cmd).collect();
        assert_eq!(
            cmds,
            vec![0x21, 0x23, 0x01, 0x03, 0x13, 0x15, 0x84, 0x85, 0x84, 0xE3, 0xA3, 0xA3, 0xA3, 0xF3]
        );
    }

    #[test]
    fn test_print_task_parameters() {
        let mut client = client(FakePrinter::default());
        let opts = PrintOptions {
            density: Density::new(4),
            label_type: 2,
            quantity: 3,
        };
        client.print_image(&image(), &opts).unwrap();

        let sent = client.into_inner().sent;
        assert_eq!(sent[0].data, vec![4]);
        assert_eq!(sent[1].data, vec![2]);
        assert_eq!(sent[4].data, vec![0x00, 0x04, 0x00, 0x10]);
        assert_eq!(sent[5].data, vec![0x00, 0x03]);
        // Two blank rows collapsed into one packet
        assert_eq!(sent[6].data, vec![0x00, 0x00, 2]);
    }

    #[test]
    fn test_rejected_density_fails() {
        let mut client = client(FakePrinter {
            reject: Some(0x21),
            ..Default::default()
        });
        let err = client.print_image(&image(), &options(1)).unwrap_err();
        assert!(matches!(err, BridgeError::Print(_)));
    }

    #[test]
    fn test_silent_printer_times_out() {
        let mut client = client(FakePrinter {
            silent: true,
            ..Default::default()
        });
        let err = client.print_image(&image(), &options(1)).unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }

    #[test]
    fn test_error_response() {
        struct Failing(Vec<u8>);
        impl Wire for Failing {
            fn write_all(&mut self, _data: &[u8]) -> Result<(), BridgeError> {
                self.0 = Packet::new(ERROR_RESPONSE, vec![0x06]).to_bytes().unwrap();
                Ok(())
            }
            fn read_available(&mut self) -> Result<Vec<u8>, BridgeError> {
                Ok(std::mem::take(&mut self.0))
            }
        }

        let mut client = NiimbotClient::new(Failing(Vec::new()));
        let err = client.handshake().unwrap_err();
        assert!(matches!(err, BridgeError::Print(_)));
    }

    #[test]
    fn test_get_info_model_id() {
        let mut client = client(FakePrinter::default());
        assert_eq!(client.get_info(InfoKey::PrinterModelId).unwrap(), 2304);
    }

    #[test]
    fn test_model_metadata_from_device() {
        let mut d110m = client(FakePrinter {
            model_id: Some(2320),
            ..Default::default()
        });
        let meta = d110m.model_metadata().unwrap().unwrap();
        assert_eq!(meta.model, "D110_M");
        assert_eq!(meta.print_direction, Direction::Left);

        let mut unknown = client(FakePrinter {
            model_id: Some(1),
            ..Default::default()
        });
        assert_eq!(unknown.model_metadata().unwrap(), None);
    }

    #[test]
    fn test_reported_metadata_wins_over_name() {
        // Addressed by MAC: nothing to derive from the name
        let mut link = NiimbotLink::new("AA:BB:CC:DD:EE:FF");
        assert!(link.metadata().is_none());
        link.adopt_reported(Ok(ModelMetadata::from_model_id(2320)));
        assert_eq!(link.metadata().unwrap().model, "D110_M");

        let mut link = NiimbotLink::new("B1-G220");
        link.adopt_reported(Ok(ModelMetadata::from_model_id(2304)));
        assert_eq!(link.metadata().unwrap().model, "D110");

        // Unknown id or failed query keeps the name-derived metadata
        let mut link = NiimbotLink::new("B1-G220");
        link.adopt_reported(Ok(None));
        assert_eq!(link.metadata().unwrap().model, "B1");
        link.adopt_reported(Err(BridgeError::Transport("no response".into())));
        assert_eq!(link.metadata().unwrap().model, "B1");
    }

    #[test]
    fn test_oversized_image_sends_nothing() {
        let mut client = client(FakePrinter::default());
        let wide = EncodedImage {
            cols: 2000,
            rows: vec![vec![0xFF; 250]; 4],
        };
        let err = client.print_image(&wide, &options(1)).unwrap_err();
        assert!(matches!(err, BridgeError::Print(_)));
        assert!(client.into_inner().sent.is_empty());
    }

    #[test]
    fn test_quantity_out_of_range() {
        let mut client = client(FakePrinter::default());
        let err = client.print_image(&image(), &options(70_000)).unwrap_err();
        assert!(matches!(err, BridgeError::Print(_)));
        assert!(client.into_inner().sent.is_empty());
    }

    #[test]
    fn test_link_metadata_from_name() {
        let link = NiimbotLink::new("D110_M-H123456789");
        assert_eq!(link.metadata().unwrap().model, "D110_M");
        assert!(NiimbotLink::new("/dev/rfcomm0").metadata().is_none());
    }

    #[test]
    fn test_print_without_connect() {
        let mut link = NiimbotLink::new("/dev/rfcomm0");
        let err = link.print(&image(), &options(1)).unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        link.disconnect().unwrap();
    }
}
