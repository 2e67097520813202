//! Link Layer Receive Path Module
//!
//! This module models the receive side of a byte-wide link-layer interface: a
//! clocked state machine that is fed one byte per clock edge, recognises the
//! start of a frame, filters on the destination address, captures a
//! length-delimited payload and verifies a one-byte longitudinal checksum.
//!
//! # Overview
//!
//! The receive path is responsible for:
//! - **Framing**: detecting the start strobe, preamble and start-frame delimiter
//! - **Address Filtering**: dropping frames not addressed to the local MAC
//! - **Payload Capture**: collecting exactly `length` payload bytes
//! - **Error Detection**: LRC verification over the frame body
//! - **Output Handshake**: driving `source ++ payload ++ status` with a valid flag
//!
//! # Frame Format
//!
//! On the wire, one byte per clock:
//! - Start strobe byte (0xAA, sampled together with `start`)
//! - Preamble (6 bytes by default): 0xAA
//! - Start Frame Delimiter (1 byte): 0xAB
//! - Destination MAC (6 bytes)
//! - Source MAC (6 bytes)
//! - Length (2 bytes, big-endian)
//! - Payload (`length` bytes)
//! - FCS (4 bytes), each carrying the same LRC byte
//!
//! # Status Codes
//!
//! The trailing status byte of every output record is `0` for a good frame,
//! otherwise its low nibble is the index of the receiver state in which the
//! fault was detected:
//!
//! | Status | Error |
//! |--------|-------|
//! | 1 | preamble byte mismatch |
//! | 2 | start-frame delimiter mismatch |
//! | 5 | declared length exceeds `max_payload_len` (only when a cap is configured) |
//! | 7 | FCS byte does not match the computed LRC |
//!
//! Frames addressed to another station produce no output at all.
//!
//! # Examples
//!
//! ```
//! use ethrecv::datalink::frame::Frame;
//! use ethrecv::datalink::receiver::{FrameReceiver, ReceiverConfig};
//! use ethrecv::datalink::MacAddress;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReceiverConfig::default();
//! let mut receiver = FrameReceiver::new(config.clone());
//!
//! let source: MacAddress = "00:14:22:01:23:45".parse()?;
//! let frame = Frame::new(config.local_mac, source, b"Hello World!".to_vec())?;
//!
//! let mut record = Vec::new();
//! for input in frame.to_ticks(config.preamble_len) {
//!     receiver.tick(input);
//! }
//! for _ in 0..32 {
//!     let output = receiver.on_clock_rising(0, false);
//!     if output.valid {
//!         record.push(output.out);
//!     }
//! }
//!
//! assert_eq!(&record[..6], source.as_bytes());
//! assert_eq!(&record[6..18], b"Hello World!");
//! assert_eq!(record[18], 0);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thiserror::Error;

/// Result type for frame construction and offline decoding.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Default preamble byte (0b1010_1010)
pub const PREAMBLE_BYTE: u8 = 0xAA;

/// Default start-frame delimiter (0b1010_1011)
pub const SFD_BYTE: u8 = 0xAB;

/// Default number of preamble bytes following the strobe byte
pub const DEFAULT_PREAMBLE_LEN: usize = 6;

/// Size of a MAC address on the wire
pub const MAC_LEN: usize = 6;

/// Size of the length field on the wire
pub const LENGTH_FIELD_LEN: usize = 2;

/// Number of FCS bytes on the wire (all carrying the same LRC)
pub const FCS_LEN: usize = 4;

/// Size of the LRC-covered header (destination, source, length)
pub const HEADER_LEN: usize = 2 * MAC_LEN + LENGTH_FIELD_LEN;

/// Status byte of a successfully received frame
pub const STATUS_OK: u8 = 0;

/// Errors that abort a frame in flight.
///
/// The receiver never surfaces these through a `Result` on the clock path;
/// each one is encoded in the trailing status byte of the next output record
/// (see [`ReceiveError::status`]) and kept as the receiver's last outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// A preamble byte did not equal the expected pattern.
    #[error("preamble byte {position} was 0x{found:02X}")]
    Preamble { position: usize, found: u8 },

    /// The start-frame delimiter did not match.
    #[error("start-frame delimiter was 0x{found:02X}")]
    Sfd { found: u8 },

    /// The declared payload length exceeds the configured cap.
    ///
    /// Never raised under the default configuration, which has no cap.
    #[error("declared length {length} exceeds maximum {max}")]
    Length { length: u16, max: u16 },

    /// An FCS byte disagreed with the LRC computed over the frame body.
    #[error("FCS byte {position} was 0x{found:02X}, computed LRC 0x{expected:02X}")]
    Checksum {
        position: usize,
        expected: u8,
        found: u8,
    },
}

impl ReceiveError {
    /// Wire status byte: the index of the state at whose entry the fault was
    /// detected.
    pub fn status(&self) -> u8 {
        match self {
            ReceiveError::Preamble { .. } => 1,
            ReceiveError::Sfd { .. } => 2,
            ReceiveError::Length { .. } => 5,
            ReceiveError::Checksum { .. } => 7,
        }
    }
}

/// Errors raised while building or decoding whole frames outside the clocked
/// receiver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Malformed textual MAC address
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// Payload does not fit the 16-bit length field or the configured maximum
    #[error("payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLong { len: usize, max: usize },

    /// Not enough bytes for the declared frame
    #[error("frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Bytes left over after the FCS
    #[error("{0} trailing bytes after FCS")]
    TrailingBytes(usize),

    /// The wire bytes violate the frame format
    #[error(transparent)]
    Receive(#[from] ReceiveError),
}

/// 48-bit link-layer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MacAddress(pub [u8; MAC_LEN]);

impl MacAddress {
    /// All-ones broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_LEN]);

    pub const fn new(octets: [u8; MAC_LEN]) -> Self {
        Self(octets)
    }

    pub fn as_bytes(&self) -> &[u8; MAC_LEN] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; MAC_LEN]> for MacAddress {
    fn from(octets: [u8; MAC_LEN]) -> Self {
        Self(octets)
    }
}

impl FromStr for MacAddress {
    type Err = FrameError;

    /// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated) notation.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(&[':', '-'][..]).collect();
        if parts.len() != MAC_LEN {
            return Err(FrameError::InvalidMac(s.to_string()));
        }

        let mut octets = [0u8; MAC_LEN];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(FrameError::InvalidMac(s.to_string()));
            }
            let mut byte = [0u8; 1];
            hex::decode_to_slice(part, &mut byte)
                .map_err(|e| FrameError::InvalidMac(format!("{}: {}", s, e)))?;
            *octet = byte[0];
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

/// Signals sampled on one rising clock edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInput {
    /// Synchronous reset
    pub reset: bool,
    /// Input byte
    pub data: u8,
    /// Frame start strobe, asserted for exactly one tick
    pub start: bool,
}

impl TickInput {
    /// A data byte with the strobe deasserted
    pub fn data(data: u8) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// The strobe tick that opens a frame
    pub fn start(data: u8) -> Self {
        Self {
            data,
            start: true,
            ..Default::default()
        }
    }

    /// An idle tick
    pub fn idle() -> Self {
        Self::default()
    }

    /// A reset tick
    pub fn reset() -> Self {
        Self {
            reset: true,
            ..Default::default()
        }
    }
}

/// Registered outputs, valid after the clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutput {
    /// The receiver will consume `data` on the next edge
    pub ready: bool,
    /// Output byte, meaningful only while `valid` is set
    pub out: u8,
    /// `out` carries a record byte this cycle
    pub valid: bool,
}

impl TickOutput {
    /// Output levels right after reset
    pub const RESET: TickOutput = TickOutput {
        ready: true,
        out: 0,
        valid: false,
    };
}

impl Default for TickOutput {
    fn default() -> Self {
        Self::RESET
    }
}

/// Whole-frame construction, wire encoding and offline decoding.
pub mod frame;

/// The clocked receive state machine.
pub mod receiver;

pub use frame::Frame;
pub use receiver::{FrameOutcome, FrameReceiver, ReceivedFrame, ReceiverConfig, ReceiverState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddress = "00:0a:95:9d:68:16".parse().unwrap();
        assert_eq!(mac.0, [0x00, 0x0a, 0x95, 0x9d, 0x68, 0x16]);
        assert_eq!(mac.to_string(), "00:0a:95:9d:68:16");

        let mac: MacAddress = "00-14-22-01-23-45".parse().unwrap();
        assert_eq!(mac.0, [0x00, 0x14, 0x22, 0x01, 0x23, 0x45]);

        let upper: MacAddress = "FF:FF:FF:FF:FF:FF".parse().unwrap();
        assert!(upper.is_broadcast());
    }

    #[test]
    fn test_mac_parse_errors() {
        assert!(matches!(
            "00:0a:95:9d:68".parse::<MacAddress>(),
            Err(FrameError::InvalidMac(_))
        ));
        assert!(matches!(
            "00:0a:95:9d:68:1".parse::<MacAddress>(),
            Err(FrameError::InvalidMac(_))
        ));
        assert!(matches!(
            "00:0a:95:9d:68:zz".parse::<MacAddress>(),
            Err(FrameError::InvalidMac(_))
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ReceiveError::Preamble { position: 3, found: 0 }.status(), 1);
        assert_eq!(ReceiveError::Sfd { found: 0xAA }.status(), 2);
        assert_eq!(ReceiveError::Length { length: 2000, max: 1500 }.status(), 5);
        assert_eq!(
            ReceiveError::Checksum {
                position: 2,
                expected: 0x5E,
                found: 0
            }
            .status(),
            7
        );
    }

    #[test]
    fn test_error_display() {
        let err = ReceiveError::Sfd { found: 0xAA };
        assert_eq!(err.to_string(), "start-frame delimiter was 0xAA");

        let err: FrameError = ReceiveError::Checksum {
            position: 2,
            expected: 0x5E,
            found: 0x00,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "FCS byte 2 was 0x00, computed LRC 0x5E"
        );
    }

    #[test]
    fn test_tick_constructors() {
        assert!(TickInput::start(PREAMBLE_BYTE).start);
        assert_eq!(TickInput::data(0x42).data, 0x42);
        assert!(!TickInput::data(0x42).start);
        assert!(TickInput::reset().reset);
        assert_eq!(TickOutput::default(), TickOutput::RESET);
    }
}
