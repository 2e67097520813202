//! Utility Functions Module
//!
//! This module provides helpers shared by the receiver model and the testbench.
//!
//! # Overview
//!
//! Utilities provided include:
//! - LRC (longitudinal redundancy check) calculation, one-shot and incremental
//! - Hex dumps for debugging output records
//! - Receiver statistics collection
//!
//! # Example
//!
//! ```
//! use ethrecv::util::compute_lrc;
//!
//! let data = b"Hello World!";
//! let lrc = compute_lrc(data);
//! let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
//! assert_eq!(sum.wrapping_add(lrc), 0);
//! ```

use std::fmt::Write as _;

/// Calculate the LRC of a buffer.
///
/// The LRC is the two's complement of the modulo-256 byte sum, so adding it to
/// the sum of the covered bytes always yields zero.
pub fn compute_lrc(data: &[u8]) -> u8 {
    let mut lrc = Lrc::new();
    lrc.update(data);
    lrc.value()
}

/// Incremental LRC accumulator
///
/// The receiver feeds covered bytes one clock at a time, so the sum is kept
/// running instead of buffering the whole frame body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lrc {
    sum: u8,
}

impl Lrc {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single byte
    pub fn push(&mut self, byte: u8) {
        self.sum = self.sum.wrapping_add(byte);
    }

    /// Add a slice of bytes
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.push(byte);
        }
    }

    /// Modulo-256 sum of everything pushed so far
    pub fn sum(&self) -> u8 {
        self.sum
    }

    /// Current check value
    pub fn value(&self) -> u8 {
        (self.sum ^ 0xFF).wrapping_add(1)
    }

    /// Clear the accumulator
    pub fn reset(&mut self) {
        self.sum = 0;
    }
}

/// Hex dump utility for debugging
pub fn hex_dump(data: &[u8], prefix: &str) -> String {
    let mut result = String::new();

    for (i, chunk) in data.chunks(16).enumerate() {
        result.push_str(prefix);
        let _ = write!(result, "{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                result.push(' ');
            }
            let _ = write!(result, "{:02X} ", byte);
        }

        // Padding
        for j in chunk.len()..16 {
            if j == 8 {
                result.push(' ');
            }
            result.push_str("   ");
        }

        result.push_str(" |");

        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                result.push(*byte as char);
            } else {
                result.push('.');
            }
        }

        result.push_str("|\n");
    }

    result
}

/// Statistics collection helpers
pub mod statistics {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    use crate::datalink::ReceiveError;

    /// Per-receiver frame counters
    ///
    /// Every frame that passes the start strobe ends in exactly one of the
    /// accepted, rejected or error buckets.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ReceiverStats {
        pub frames_started: u64,
        pub frames_accepted: u64,
        /// Frames dropped by the destination address filter
        pub frames_rejected: u64,
        pub preamble_errors: u64,
        pub sfd_errors: u64,
        pub length_errors: u64,
        pub checksum_errors: u64,
        /// Bytes consumed while a frame was in flight
        pub bytes_received: u64,
        /// Bytes driven with `valid` asserted
        pub bytes_emitted: u64,
    }

    impl ReceiverStats {
        /// Create new statistics
        pub fn new() -> Self {
            Self::default()
        }

        /// Record a start strobe seen in idle
        pub fn record_start(&mut self) {
            self.frames_started += 1;
        }

        /// Record a byte consumed by an in-flight frame
        pub fn record_byte(&mut self) {
            self.bytes_received += 1;
        }

        /// Record a frame delivered with status 0
        pub fn record_accepted(&mut self) {
            self.frames_accepted += 1;
        }

        /// Record a frame silently dropped by the address filter
        pub fn record_rejected(&mut self) {
            self.frames_rejected += 1;
        }

        /// Record a frame aborted by `error`
        pub fn record_error(&mut self, error: &ReceiveError) {
            match error {
                ReceiveError::Preamble { .. } => self.preamble_errors += 1,
                ReceiveError::Sfd { .. } => self.sfd_errors += 1,
                ReceiveError::Length { .. } => self.length_errors += 1,
                ReceiveError::Checksum { .. } => self.checksum_errors += 1,
            }
        }

        /// Record an output byte
        pub fn record_emitted(&mut self) {
            self.bytes_emitted += 1;
        }

        /// Total number of aborted frames
        pub fn error_count(&self) -> u64 {
            self.preamble_errors + self.sfd_errors + self.length_errors + self.checksum_errors
        }

        /// Number of frames that reached a terminal outcome
        pub fn frames_completed(&self) -> u64 {
            self.frames_accepted + self.frames_rejected + self.error_count()
        }

        /// Percentage of addressed frames that were delivered intact
        pub fn success_rate(&self) -> f64 {
            let addressed = (self.frames_accepted + self.error_count()) as f64;
            if addressed == 0.0 {
                return 100.0;
            }
            (self.frames_accepted as f64 / addressed) * 100.0
        }

        /// Reset all statistics
        pub fn reset(&mut self) {
            *self = Self::default();
        }
    }
}
