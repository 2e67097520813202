//! Clocked Frame Receiver
//!
//! [`FrameReceiver`] is a cycle-level model of a synchronous receiver that is
//! fed one byte per rising clock edge. It walks a strictly linear state
//! sequence for each frame:
//!
//! ```text
//! Idle -> Preamble -> Sfd -> MacDst -> MacSrc -> Length -> Payload -> Fcs -> Emit -> Idle
//! ```
//!
//! The only branches are the address-filter drop (walks the rest of the frame,
//! then returns to `Idle` without output) and the abort paths (jump to `Emit`
//! with a non-zero status byte).
//!
//! # Sampling discipline
//!
//! Apply the inputs, advance one edge with [`FrameReceiver::on_clock_rising`]
//! or [`FrameReceiver::tick`], then read the returned [`TickOutput`]. `ready`
//! in that output says whether the next edge will consume `data`.
//!
//! # Output record
//!
//! After a terminal outcome the receiver drives, one byte per edge with
//! `valid` set, `source (6) ++ payload (length) ++ status (1)`. Aborted frames
//! carry whatever had been captured before the fault followed by the status.

use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, info, log_enabled, trace, warn, Level};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::datalink::{
    MacAddress, ReceiveError, TickInput, TickOutput, DEFAULT_PREAMBLE_LEN, FCS_LEN, LENGTH_FIELD_LEN, MAC_LEN, PREAMBLE_BYTE, SFD_BYTE, STATUS_OK,
};
use crate::util::statistics::ReceiverStats;
use crate::util::{hex_dump, Lrc};

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReceiverConfig {
    /// Address this receiver answers to
    pub local_mac: MacAddress,
    /// Preamble bytes expected after the strobe byte
    pub preamble_len: usize,
    /// Expected preamble pattern
    pub preamble_byte: u8,
    /// Expected start-frame delimiter
    pub sfd_byte: u8,
    /// Optional cap on the declared length; larger frames abort with status 5.
    /// `None` accepts the full 16-bit range.
    pub max_payload_len: Option<u16>,
    /// Also accept frames sent to ff:ff:ff:ff:ff:ff
    pub accept_broadcast: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            local_mac: MacAddress([0x00, 0x0a, 0x95, 0x9d, 0x68, 0x16]),
            preamble_len: DEFAULT_PREAMBLE_LEN,
            preamble_byte: PREAMBLE_BYTE,
            sfd_byte: SFD_BYTE,
            max_payload_len: None,
            accept_broadcast: false,
        }
    }
}

impl ReceiverConfig {
    /// Whether a destination address passes the filter
    pub fn accepts(&self, destination: &MacAddress) -> bool {
        *destination == self.local_mac || (self.accept_broadcast && destination.is_broadcast())
    }
}

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverState {
    /// Waiting for a start strobe
    Idle,
    /// Checking preamble bytes
    Preamble,
    /// Expecting the start-frame delimiter
    Sfd,
    /// Collecting the destination address
    MacDst,
    /// Collecting the source address
    MacSrc,
    /// Collecting the two length bytes
    Length,
    /// Collecting payload bytes
    Payload,
    /// Checking the four FCS bytes
    Fcs,
    /// Driving the output record
    Emit,
}

impl ReceiverState {
    /// Numeric state index as reported in status bytes.
    ///
    /// `Emit` is not a numbered state; it reports 0 like `Idle`, which it
    /// returns to.
    pub fn index(&self) -> u8 {
        match self {
            ReceiverState::Idle | ReceiverState::Preamble | ReceiverState::Emit => 0,
            ReceiverState::Sfd => 1,
            ReceiverState::MacDst => 2,
            ReceiverState::MacSrc => 3,
            ReceiverState::Length => 4,
            ReceiverState::Payload => 5,
            ReceiverState::Fcs => 6,
        }
    }
}

/// A frame delivered with status 0
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReceivedFrame {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub payload: Bytes,
}

/// How the most recent frame ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Delivered intact
    Accepted(ReceivedFrame),
    /// Aborted; the status byte was emitted
    Aborted(ReceiveError),
    /// Dropped by the address filter; nothing was emitted
    Rejected { destination: MacAddress },
}

impl FrameOutcome {
    /// Status byte emitted for this outcome, `None` if nothing was emitted
    pub fn status(&self) -> Option<u8> {
        match self {
            FrameOutcome::Accepted(_) => Some(STATUS_OK),
            FrameOutcome::Aborted(err) => Some(err.status()),
            FrameOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, FrameOutcome::Accepted(_))
    }
}

/// Cycle-level frame receiver
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    config: ReceiverConfig,
    state: ReceiverState,
    /// Bytes consumed in the current state
    count: usize,
    destination: [u8; MAC_LEN],
    length_high: u8,
    length: u16,
    /// Frame is not addressed to us; walk it without capturing
    discarding: bool,
    preamble_fault: Option<ReceiveError>,
    fcs_fault: Option<ReceiveError>,
    lrc: Lrc,
    /// Source address and payload bytes as captured
    capture: BytesMut,
    /// Record being driven while in `Emit`
    record: Bytes,
    cursor: usize,
    output: TickOutput,
    last_outcome: Option<FrameOutcome>,
    stats: ReceiverStats,
}

impl FrameReceiver {
    /// Create a receiver in the reset state
    pub fn new(config: ReceiverConfig) -> Self {
        // one MTU-sized frame unless a smaller cap is configured
        let capacity = MAC_LEN + config.max_payload_len.map_or(1500, usize::from).min(1500) + 1;
        Self {
            config,
            state: ReceiverState::Idle,
            count: 0,
            destination: [0; MAC_LEN],
            length_high: 0,
            length: 0,
            discarding: false,
            preamble_fault: None,
            fcs_fault: None,
            lrc: Lrc::new(),
            capture: BytesMut::with_capacity(capacity),
            record: Bytes::new(),
            cursor: 0,
            output: TickOutput::RESET,
            last_outcome: None,
            stats: ReceiverStats::new(),
        }
    }

    /// Top-level reset: clear all buffers and return to `Idle`.
    ///
    /// Statistics are kept; use [`FrameReceiver::stats_mut`] to clear them.
    pub fn reset(&mut self) {
        trace!("reset in state {:?}", self.state);
        self.clear_frame();
        self.state = ReceiverState::Idle;
        self.record = Bytes::new();
        self.cursor = 0;
        self.output = TickOutput::RESET;
        self.last_outcome = None;
    }

    /// Advance one edge with the full input bundle, honouring `reset`
    pub fn tick(&mut self, input: TickInput) -> TickOutput {
        if input.reset {
            self.reset();
            return self.output;
        }
        self.on_clock_rising(input.data, input.start)
    }

    /// Advance one rising clock edge
    pub fn on_clock_rising(&mut self, data: u8, start: bool) -> TickOutput {
        if self.state != ReceiverState::Emit {
            self.output = TickOutput::RESET;
        }
        self.consume(data, start);
        self.output
    }

    fn consume(&mut self, data: u8, start: bool) {
        if !matches!(self.state, ReceiverState::Idle | ReceiverState::Emit) {
            self.stats.record_byte();
            if start {
                trace!("start strobe ignored in state {:?}", self.state);
            }
        }

        match self.state {
            ReceiverState::Idle => {
                if !start {
                    return;
                }
                self.clear_frame();
                self.stats.record_start();
                self.stats.record_byte();
                debug!("frame start strobe");
                if self.config.preamble_len == 0 {
                    self.enter(ReceiverState::Sfd);
                } else {
                    self.enter(ReceiverState::Preamble);
                }
            }
            ReceiverState::Preamble => {
                if data != self.config.preamble_byte && self.preamble_fault.is_none() {
                    self.preamble_fault = Some(ReceiveError::Preamble {
                        position: self.count,
                        found: data,
                    });
                }
                self.count += 1;
                if self.count == self.config.preamble_len {
                    match self.preamble_fault {
                        Some(err) => self.abort(err),
                        None => self.enter(ReceiverState::Sfd),
                    }
                }
            }
            ReceiverState::Sfd => {
                if data == self.config.sfd_byte {
                    self.enter(ReceiverState::MacDst);
                } else {
                    self.abort(ReceiveError::Sfd { found: data });
                }
            }
            ReceiverState::MacDst => {
                self.lrc.push(data);
                self.destination[self.count] = data;
                self.count += 1;
                if self.count == MAC_LEN {
                    let destination = MacAddress(self.destination);
                    if !self.config.accepts(&destination) {
                        info!(
                            "frame for {} not addressed to {}, discarding",
                            destination, self.config.local_mac
                        );
                        self.discarding = true;
                    }
                    self.enter(ReceiverState::MacSrc);
                }
            }
            ReceiverState::MacSrc => {
                self.lrc.push(data);
                if !self.discarding {
                    self.capture.put_u8(data);
                }
                self.count += 1;
                if self.count == MAC_LEN {
                    self.enter(ReceiverState::Length);
                }
            }
            ReceiverState::Length => {
                self.lrc.push(data);
                self.count += 1;
                if self.count < LENGTH_FIELD_LEN {
                    self.length_high = data;
                    return;
                }

                self.length = u16::from_be_bytes([self.length_high, data]);
                trace!("declared length {}", self.length);
                match self.config.max_payload_len {
                    Some(max) if !self.discarding && self.length > max => {
                        self.abort(ReceiveError::Length {
                            length: self.length,
                            max,
                        });
                    }
                    _ if self.length == 0 => self.enter(ReceiverState::Fcs),
                    _ => self.enter(ReceiverState::Payload),
                }
            }
            ReceiverState::Payload => {
                self.lrc.push(data);
                if !self.discarding {
                    self.capture.put_u8(data);
                }
                self.count += 1;
                if self.count == self.length as usize {
                    self.enter(ReceiverState::Fcs);
                }
            }
            ReceiverState::Fcs => {
                let expected = self.lrc.value();
                if data != expected && self.fcs_fault.is_none() {
                    self.fcs_fault = Some(ReceiveError::Checksum {
                        position: self.count,
                        expected,
                        found: data,
                    });
                }
                self.count += 1;
                if self.count == FCS_LEN {
                    if self.discarding {
                        self.reject();
                    } else if let Some(err) = self.fcs_fault {
                        self.abort(err);
                    } else {
                        self.accept();
                    }
                }
            }
            ReceiverState::Emit => {
                if start {
                    trace!("start strobe ignored while emitting");
                }
                self.drive_output();
            }
        }
    }

    fn enter(&mut self, state: ReceiverState) {
        trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
        self.count = 0;
    }

    fn accept(&mut self) {
        let mut source = [0u8; MAC_LEN];
        source.copy_from_slice(&self.capture[..MAC_LEN]);
        let frame = ReceivedFrame {
            destination: MacAddress(self.destination),
            source: MacAddress(source),
            payload: Bytes::copy_from_slice(&self.capture[MAC_LEN..]),
        };

        debug!(
            "accepted frame from {}, {} payload bytes",
            frame.source,
            frame.payload.len()
        );
        if log_enabled!(Level::Trace) {
            trace!("payload:\n{}", hex_dump(&frame.payload, "  "));
        }

        self.stats.record_accepted();
        self.last_outcome = Some(FrameOutcome::Accepted(frame));
        self.start_emit(STATUS_OK);
    }

    fn abort(&mut self, err: ReceiveError) {
        warn!("frame aborted in state {:?}: {}", self.state, err);
        self.stats.record_error(&err);
        self.last_outcome = Some(FrameOutcome::Aborted(err));
        self.start_emit(err.status());
    }

    fn reject(&mut self) {
        let destination = MacAddress(self.destination);
        debug!("dropped frame for {} after {} payload bytes", destination, self.length);
        self.stats.record_rejected();
        self.last_outcome = Some(FrameOutcome::Rejected { destination });
        self.clear_frame();
        self.enter(ReceiverState::Idle);
    }

    fn start_emit(&mut self, status: u8) {
        self.capture.put_u8(status);
        self.record = self.capture.split().freeze();
        self.cursor = 0;
        self.enter(ReceiverState::Emit);
        self.output.ready = false;
    }

    fn drive_output(&mut self) {
        let Some(&byte) = self.record.get(self.cursor) else {
            // Empty records are never built.
            self.enter(ReceiverState::Idle);
            self.output = TickOutput::RESET;
            return;
        };
        self.cursor += 1;
        self.stats.record_emitted();

        let done = self.cursor == self.record.len();
        if done {
            self.record = Bytes::new();
            self.cursor = 0;
            self.clear_frame();
            self.enter(ReceiverState::Idle);
        }

        self.output = TickOutput {
            ready: done,
            out: byte,
            valid: true,
        };
    }

    fn clear_frame(&mut self) {
        self.count = 0;
        self.destination = [0; MAC_LEN];
        self.length_high = 0;
        self.length = 0;
        self.discarding = false;
        self.preamble_fault = None;
        self.fcs_fault = None;
        self.lrc.reset();
        self.capture.clear();
    }

    /// Current state
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// `ready` as driven after the last edge
    pub fn ready(&self) -> bool {
        self.output.ready
    }

    /// `valid` as driven after the last edge
    pub fn valid(&self) -> bool {
        self.output.valid
    }

    /// `out` as driven after the last edge
    pub fn out(&self) -> u8 {
        self.output.out
    }

    /// All outputs as driven after the last edge
    pub fn output(&self) -> TickOutput {
        self.output
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ReceiverStats {
        &mut self.stats
    }

    /// Outcome of the most recently completed frame
    pub fn last_outcome(&self) -> Option<&FrameOutcome> {
        self.last_outcome.as_ref()
    }

    /// Take the most recent outcome, leaving `None`
    pub fn take_outcome(&mut self) -> Option<FrameOutcome> {
        self.last_outcome.take()
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new(ReceiverConfig::default())
    }
}
