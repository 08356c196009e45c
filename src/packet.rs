//! Outbound command packets
//!
//! A [`Packet`] describes one pending command on the link: a data-type tag,
//! a virtual channel, and a payload of 0 to [`PKTHDR_FIFO_CNT`] bytes. The
//! value is short-lived — the transaction engine consumes it when the packet
//! completes or times out.
//!
//! ## Short vs. long packets
//!
//! Short packets travel entirely in the 24-bit packet header (data id plus
//! two data bytes). Long packets carry a word count in the header and their
//! payload through the payload FIFO. [`Packet::dcs_write`] and
//! [`Packet::generic_write`] pick the right format from the payload length.
//!
//! ```
//! use dsim::packet::{DataId, Packet};
//!
//! // Two-byte DCS write fits a short packet
//! let p = Packet::dcs_write(0x53, &[0x24]);
//! assert_eq!(p.di, DataId::DcsShortWrite1);
//!
//! // Anything longer becomes a long packet
//! let p = Packet::dcs_write(0x2a, &[0x00, 0x00, 0x01, 0xdf]);
//! assert_eq!(p.di, DataId::DcsLongWrite);
//! assert!(p.di.is_long());
//! ```

pub use crate::regs::PKTHDR_FIFO_CNT;

/// MIPI-DSI processor-to-peripheral data types
///
/// Only the data types the command path uses are listed; video-mode data
/// types belong to the sink-side scheduler and never pass through here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DataId {
    /// Generic short write, no parameter
    GenericShortWrite0 = 0x03,
    /// Generic short write, one parameter
    GenericShortWrite1 = 0x13,
    /// Generic short write, two parameters
    GenericShortWrite2 = 0x23,
    /// Generic read, no parameter
    GenericRead0 = 0x04,
    /// Generic read, one parameter
    GenericRead1 = 0x14,
    /// Generic read, two parameters
    GenericRead2 = 0x24,
    /// DCS short write, no parameter
    DcsShortWrite0 = 0x05,
    /// DCS short write, one parameter
    DcsShortWrite1 = 0x15,
    /// DCS read
    DcsRead = 0x06,
    /// Set the largest response the peripheral may return
    SetMaxReturnPacketSize = 0x37,
    /// Generic long write
    GenericLongWrite = 0x29,
    /// DCS long write
    DcsLongWrite = 0x39,
    /// Peripheral shutdown
    ShutdownPeripheral = 0x22,
    /// Peripheral turn-on
    TurnOnPeripheral = 0x32,
}

impl DataId {
    /// Whether this data type carries its payload through the payload FIFO
    pub const fn is_long(self) -> bool {
        matches!(self, Self::GenericLongWrite | Self::DcsLongWrite)
    }

    /// Whether a transaction of this type expects a response read
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::GenericRead0 | Self::GenericRead1 | Self::GenericRead2 | Self::DcsRead
        )
    }
}

// Receive-direction data types, peripheral to processor. The transaction
// engine matches these while draining the receive FIFO.

/// Acknowledge and error report
pub const RX_ACK_AND_ERROR: u8 = 0x02;

/// End-of-transmission packet
pub const RX_EOT: u8 = 0x08;

/// Generic short read response, one byte
pub const RX_GENERIC_SHORT_1: u8 = 0x11;

/// Generic short read response, two bytes
pub const RX_GENERIC_SHORT_2: u8 = 0x12;

/// Generic long read response
pub const RX_GENERIC_LONG: u8 = 0x1a;

/// DCS long read response
pub const RX_DCS_LONG: u8 = 0x1c;

/// DCS short read response, one byte
pub const RX_DCS_SHORT_1: u8 = 0x21;

/// DCS short read response, two bytes
pub const RX_DCS_SHORT_2: u8 = 0x22;

/// One outbound command packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Data type
    pub di: DataId,
    /// Virtual channel, 0..=3
    pub vc: u8,
    /// Payload bytes; for DCS packets the first byte is the DCS command
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a packet with an explicit data type on virtual channel 0
    pub fn new(di: DataId, payload: &[u8]) -> Self {
        Self {
            di,
            vc: 0,
            payload: payload.to_vec(),
        }
    }

    /// Move the packet to another virtual channel
    pub fn on_channel(mut self, vc: u8) -> Self {
        self.vc = vc & 0x3;
        self
    }

    /// DCS write of `cmd` with `params`, choosing short or long format
    pub fn dcs_write(cmd: u8, params: &[u8]) -> Self {
        let di = match params.len() {
            0 => DataId::DcsShortWrite0,
            1 => DataId::DcsShortWrite1,
            _ => DataId::DcsLongWrite,
        };
        let mut payload = Vec::with_capacity(1 + params.len());
        payload.push(cmd);
        payload.extend_from_slice(params);
        Self {
            di,
            vc: 0,
            payload,
        }
    }

    /// Generic write of `params`, choosing short or long format
    pub fn generic_write(params: &[u8]) -> Self {
        let di = match params.len() {
            0 => DataId::GenericShortWrite0,
            1 => DataId::GenericShortWrite1,
            2 => DataId::GenericShortWrite2,
            _ => DataId::GenericLongWrite,
        };
        Self::new(di, params)
    }

    /// DCS read request for register `addr`
    pub fn dcs_read(addr: u8) -> Self {
        Self::new(DataId::DcsRead, &[addr])
    }

    /// Bound the next response to `size` bytes
    pub fn set_max_return_size(size: u16) -> Self {
        Self::new(
            DataId::SetMaxReturnPacketSize,
            &[(size & 0xff) as u8, (size >> 8) as u8],
        )
    }

    /// Whether the transaction expects a response read
    pub fn expects_response(&self) -> bool {
        self.di.is_read()
    }

    /// 24-bit packet header as written to the header FIFO
    ///
    /// Byte 0 is the data id with the virtual channel in bits 6..=7; for
    /// short packets bytes 1 and 2 carry the (zero-padded) payload, for long
    /// packets they carry the little-endian payload word count.
    pub fn header(&self) -> u32 {
        let id = (self.di as u32) | ((self.vc as u32) << 6);
        let (d0, d1) = if self.di.is_long() {
            let wc = self.payload.len() as u16;
            ((wc & 0xff) as u8, (wc >> 8) as u8)
        } else {
            (
                self.payload.first().copied().unwrap_or(0),
                self.payload.get(1).copied().unwrap_or(0),
            )
        };
        id | ((d0 as u32) << 8) | ((d1 as u32) << 16)
    }
}
