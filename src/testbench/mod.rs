//! Driver/Monitor Testbench
//!
//! This module drives a device under test one clock tick at a time and checks
//! what it emits, the way a simulator testbench would: a [`Driver`] turns a
//! [`Frame`] (plus optional injected faults) into a tick stream, a [`Monitor`]
//! samples the outputs after every edge and reassembles output records, and an
//! [`Expectation`] states what those records must look like.
//!
//! # Example
//!
//! ```
//! use ethrecv::datalink::{Frame, FrameReceiver, MacAddress, ReceiverConfig};
//! use ethrecv::testbench::{Driver, Expectation, Fault, Testbench};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReceiverConfig::default();
//! let source: MacAddress = "00:14:22:01:23:45".parse()?;
//! let frame = Frame::new(config.local_mac, source, b"Hello World!".to_vec())?;
//!
//! let mut bench = Testbench::new(FrameReceiver::new(config.clone()));
//! let driver = Driver::new(config.preamble_len).with_fault(Fault::Fcs { index: 2, value: 0 });
//! bench.expect(&frame, &driver, &Expectation::Status(7))?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use log::{debug, info};
use thiserror::Error;

use crate::datalink::frame::wire_to_ticks;
use crate::datalink::{
    Frame, FrameReceiver, MacAddress, TickInput, TickOutput, FCS_LEN, HEADER_LEN, MAC_LEN,
    STATUS_OK,
};

/// Ticks the monitor keeps sampling after the driver is done
pub const DEFAULT_WINDOW: usize = 45;

/// Result type for testbench runs
pub type Result<T> = std::result::Result<T, TestbenchError>;

/// Testbench failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestbenchError {
    #[error("unexpected outputs after reset: {0:?}")]
    ResetMismatch(TickOutput),

    #[error("fault cannot be applied: {0}")]
    InvalidFault(String),

    #[error("expected {expected} output records, observed {found}")]
    RecordCount { expected: usize, found: usize },

    #[error("expected status 0x{expected:02X}, observed 0x{found:02X}")]
    StatusMismatch { expected: u8, found: u8 },

    #[error("expected source {expected}, observed {found:02X?}")]
    SourceMismatch { expected: MacAddress, found: Vec<u8> },

    #[error("expected payload {expected:02X?}, observed {found:02X?}")]
    PayloadMismatch { expected: Vec<u8>, found: Vec<u8> },

    #[error("input presented while ready was low at ticks {0:?}")]
    NotReady(Vec<usize>),
}

/// A clocked device the testbench can drive
pub trait Dut {
    /// Apply the top-level reset and return the outputs it leaves behind
    fn reset(&mut self) -> TickOutput;

    /// Advance one rising edge
    fn tick(&mut self, input: TickInput) -> TickOutput;
}

impl Dut for FrameReceiver {
    fn reset(&mut self) -> TickOutput {
        self.tick(TickInput::reset())
    }

    fn tick(&mut self, input: TickInput) -> TickOutput {
        FrameReceiver::tick(self, input)
    }
}

/// Fault injected into the wire image of an otherwise well-formed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Replace preamble byte `index` (0-based, after the strobe byte)
    Preamble { index: usize, value: u8 },
    /// Replace the start-frame delimiter
    Sfd(u8),
    /// Replace FCS byte `index` (0..4)
    Fcs { index: usize, value: u8 },
    /// Declare a different length without changing the payload
    Length(u16),
}

/// Produces the tick stream for a frame
#[derive(Debug, Clone, Default)]
pub struct Driver {
    preamble_len: usize,
    faults: Vec<Fault>,
}

impl Driver {
    pub fn new(preamble_len: usize) -> Self {
        Self {
            preamble_len,
            faults: Vec::new(),
        }
    }

    /// Add a fault to inject
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn preamble_len(&self) -> usize {
        self.preamble_len
    }

    /// Wire image with all faults applied
    pub fn wire(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut wire = frame.encode(self.preamble_len).to_vec();
        let sfd_at = 1 + self.preamble_len;
        let fcs_at = wire.len() - FCS_LEN;

        for fault in &self.faults {
            match *fault {
                Fault::Preamble { index, value } => {
                    if index >= self.preamble_len {
                        return Err(TestbenchError::InvalidFault(format!(
                            "preamble index {} out of range 0..{}",
                            index, self.preamble_len
                        )));
                    }
                    wire[1 + index] = value;
                }
                Fault::Sfd(value) => wire[sfd_at] = value,
                Fault::Fcs { index, value } => {
                    if index >= FCS_LEN {
                        return Err(TestbenchError::InvalidFault(format!(
                            "FCS index {} out of range 0..{}",
                            index, FCS_LEN
                        )));
                    }
                    wire[fcs_at + index] = value;
                }
                Fault::Length(length) => {
                    let at = sfd_at + 1 + HEADER_LEN - 2;
                    wire[at..at + 2].copy_from_slice(&length.to_be_bytes());
                }
            }
        }

        Ok(wire)
    }

    /// Tick stream with `start` on the first byte
    pub fn drive(&self, frame: &Frame) -> Result<Vec<TickInput>> {
        debug!(
            "driving frame {} -> {}, {} payload bytes, faults {:?}",
            frame.source,
            frame.destination,
            frame.payload.len(),
            self.faults
        );
        Ok(wire_to_ticks(&self.wire(frame)?))
    }
}

/// One contiguous run of `valid` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRecord {
    /// Tick at which `valid` first rose
    pub first_tick: usize,
    pub bytes: Vec<u8>,
}

impl ReceivedRecord {
    /// Trailing status byte
    pub fn status(&self) -> Option<u8> {
        self.bytes.last().copied()
    }

    /// Source address bytes, if the record is long enough to carry them
    pub fn source(&self) -> Option<&[u8]> {
        if self.bytes.len() > MAC_LEN {
            Some(&self.bytes[..MAC_LEN])
        } else {
            None
        }
    }

    /// Payload bytes between the source address and the status byte
    pub fn payload(&self) -> Option<&[u8]> {
        if self.bytes.len() > MAC_LEN {
            Some(&self.bytes[MAC_LEN..self.bytes.len() - 1])
        } else {
            None
        }
    }
}

/// Samples outputs after each edge and groups `valid` runs into records
#[derive(Debug, Default)]
pub struct Monitor {
    tick: usize,
    pending: Option<ReceivedRecord>,
    records: Vec<ReceivedRecord>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample one tick's outputs
    pub fn sample(&mut self, output: &TickOutput) {
        if output.valid {
            let tick = self.tick;
            self.pending
                .get_or_insert_with(|| ReceivedRecord {
                    first_tick: tick,
                    bytes: Vec::new(),
                })
                .bytes
                .push(output.out);
        } else if let Some(record) = self.pending.take() {
            debug!("monitor: record of {} bytes ended", record.bytes.len());
            self.records.push(record);
        }
        self.tick += 1;
    }

    /// Close any record still open and return everything observed
    pub fn finish(mut self) -> Vec<ReceivedRecord> {
        if let Some(record) = self.pending.take() {
            self.records.push(record);
        }
        self.records
    }

    pub fn records(&self) -> &[ReceivedRecord] {
        &self.records
    }
}

/// What the monitor must observe for one driven frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// One record `source ++ payload ++ 0x00`, with `ready` high during reception
    Delivered { source: MacAddress, payload: Vec<u8> },
    /// One record whose trailing status byte is the given value
    Status(u8),
    /// `valid` never rises
    Silent,
}

impl Expectation {
    /// What a receiver addressed by `frame` should deliver
    pub fn delivered(frame: &Frame) -> Self {
        Expectation::Delivered {
            source: frame.source,
            payload: frame.payload.to_vec(),
        }
    }

    /// Check a transcript against this expectation
    pub fn check(&self, transcript: &Transcript) -> Result<()> {
        let records = &transcript.records;
        let expected_count = match self {
            Expectation::Silent => 0,
            _ => 1,
        };
        if records.len() != expected_count {
            return Err(TestbenchError::RecordCount {
                expected: expected_count,
                found: records.len(),
            });
        }

        match self {
            Expectation::Silent => Ok(()),
            Expectation::Status(expected) => {
                let found = records[0].status().unwrap_or_default();
                if found != *expected {
                    return Err(TestbenchError::StatusMismatch {
                        expected: *expected,
                        found,
                    });
                }
                Ok(())
            }
            Expectation::Delivered { source, payload } => {
                let record = &records[0];
                let status = record.status().unwrap_or_default();
                if status != STATUS_OK {
                    return Err(TestbenchError::StatusMismatch {
                        expected: STATUS_OK,
                        found: status,
                    });
                }
                if record.source() != Some(&source.as_bytes()[..]) {
                    return Err(TestbenchError::SourceMismatch {
                        expected: *source,
                        found: record.source().unwrap_or_default().to_vec(),
                    });
                }
                if record.payload() != Some(&payload[..]) {
                    return Err(TestbenchError::PayloadMismatch {
                        expected: payload.clone(),
                        found: record.payload().unwrap_or_default().to_vec(),
                    });
                }
                if !transcript.ready_violations.is_empty() {
                    return Err(TestbenchError::NotReady(transcript.ready_violations.clone()));
                }
                Ok(())
            }
        }
    }
}

/// Everything observed during one run
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Outputs after every edge, driven ticks first, then the idle window
    pub outputs: Vec<TickOutput>,
    pub records: Vec<ReceivedRecord>,
    /// Driven ticks whose input was presented while `ready` was low
    pub ready_violations: Vec<usize>,
}

impl Transcript {
    /// Number of ticks with `valid` asserted
    pub fn valid_ticks(&self) -> usize {
        self.outputs.iter().filter(|o| o.valid).count()
    }
}

/// Drives a [`Dut`] and observes it through a [`Monitor`]
pub struct Testbench<D: Dut> {
    dut: D,
    window: usize,
    last_output: TickOutput,
}

impl<D: Dut> Testbench<D> {
    pub fn new(dut: D) -> Self {
        Self {
            dut,
            window: DEFAULT_WINDOW,
            last_output: TickOutput::RESET,
        }
    }

    /// Number of idle ticks sampled after the driver finishes
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn dut(&self) -> &D {
        &self.dut
    }

    pub fn dut_mut(&mut self) -> &mut D {
        &mut self.dut
    }

    pub fn into_dut(self) -> D {
        self.dut
    }

    /// Reset the DUT and check the reset output levels
    pub fn init(&mut self) -> Result<()> {
        info!("toggling reset and initializing inputs");
        let output = self.dut.reset();
        if output != TickOutput::RESET {
            return Err(TestbenchError::ResetMismatch(output));
        }
        self.last_output = output;
        Ok(())
    }

    /// Drive `ticks` without resetting, then sample the idle window
    pub fn drive(&mut self, ticks: &[TickInput]) -> Transcript {
        let mut monitor = Monitor::new();
        let mut transcript = Transcript::default();

        for (i, input) in ticks.iter().enumerate() {
            if !self.last_output.ready {
                transcript.ready_violations.push(i);
            }
            let output = self.dut.tick(*input);
            monitor.sample(&output);
            transcript.outputs.push(output);
            self.last_output = output;
        }

        for _ in 0..self.window {
            let output = self.dut.tick(TickInput::idle());
            monitor.sample(&output);
            transcript.outputs.push(output);
            self.last_output = output;
        }

        transcript.records = monitor.finish();
        transcript
    }

    /// Reset, drive one frame and sample the window
    pub fn run(&mut self, frame: &Frame, driver: &Driver) -> Result<Transcript> {
        self.init()?;
        let ticks = driver.drive(frame)?;
        Ok(self.drive(&ticks))
    }

    /// Reset, drive one frame and check the expectation
    pub fn expect(
        &mut self,
        frame: &Frame,
        driver: &Driver,
        expectation: &Expectation,
    ) -> Result<Transcript> {
        let transcript = self.run(frame, driver)?;
        expectation.check(&transcript)?;
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::{ReceiverConfig, DEFAULT_PREAMBLE_LEN};

    const MACSRC: MacAddress = MacAddress([0x00, 0x14, 0x22, 0x01, 0x23, 0x45]);

    fn frame_to(destination: MacAddress) -> Frame {
        Frame::new(destination, MACSRC, &b"Hello World!"[..]).unwrap()
    }

    fn bench() -> Testbench<FrameReceiver> {
        Testbench::new(FrameReceiver::new(ReceiverConfig::default()))
    }

    #[test]
    fn test_driver_applies_faults() {
        let frame = frame_to(ReceiverConfig::default().local_mac);
        let clean = Driver::new(DEFAULT_PREAMBLE_LEN).wire(&frame).unwrap();

        let wire = Driver::new(DEFAULT_PREAMBLE_LEN)
            .with_fault(Fault::Preamble { index: 0, value: 0x55 })
            .with_fault(Fault::Sfd(0x00))
            .with_fault(Fault::Fcs { index: 3, value: 0x01 })
            .with_fault(Fault::Length(0x0102))
            .wire(&frame)
            .unwrap();

        assert_eq!(wire.len(), clean.len());
        assert_eq!(wire[1], 0x55);
        assert_eq!(wire[7], 0x00);
        assert_eq!(&wire[20..22], &[0x01, 0x02]);
        assert_eq!(wire[wire.len() - 1], 0x01);
        assert_eq!(&wire[22..wire.len() - 1], &clean[22..clean.len() - 1]);
    }

    #[test]
    fn test_driver_rejects_out_of_range_faults() {
        let frame = frame_to(MACSRC);
        let driver = Driver::new(2).with_fault(Fault::Preamble { index: 2, value: 0 });
        assert!(matches!(
            driver.wire(&frame),
            Err(TestbenchError::InvalidFault(_))
        ));

        let driver = Driver::new(2).with_fault(Fault::Fcs { index: 4, value: 0 });
        assert!(matches!(
            driver.drive(&frame),
            Err(TestbenchError::InvalidFault(_))
        ));
    }

    #[test]
    fn test_monitor_groups_valid_runs() {
        let mut monitor = Monitor::new();
        let idle = TickOutput::RESET;
        let byte = |out| TickOutput {
            ready: false,
            out,
            valid: true,
        };

        monitor.sample(&idle);
        monitor.sample(&byte(1));
        monitor.sample(&byte(2));
        monitor.sample(&idle);
        monitor.sample(&byte(7));

        let records = monitor.finish();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].first_tick, 1);
        assert_eq!(records[0].bytes, vec![1, 2]);
        assert_eq!(records[1].status(), Some(7));
        assert_eq!(records[1].source(), None);
    }

    #[test]
    fn test_recv_pass() {
        let frame = frame_to(ReceiverConfig::default().local_mac);
        let transcript = bench()
            .expect(
                &frame,
                &Driver::new(DEFAULT_PREAMBLE_LEN),
                &Expectation::delivered(&frame),
            )
            .unwrap();
        assert_eq!(transcript.valid_ticks(), 6 + 12 + 1);
    }

    #[test]
    fn test_recv_fail() {
        let frame = frame_to(ReceiverConfig::default().local_mac);
        let driver = Driver::new(DEFAULT_PREAMBLE_LEN).with_fault(Fault::Fcs { index: 2, value: 0 });
        bench()
            .expect(&frame, &driver, &Expectation::Status(7))
            .unwrap();
    }

    #[test]
    fn test_recv_wrong() {
        let frame = frame_to(MACSRC);
        let transcript = bench()
            .with_window(15)
            .expect(&frame, &Driver::new(DEFAULT_PREAMBLE_LEN), &Expectation::Silent)
            .unwrap();
        assert_eq!(transcript.valid_ticks(), 0);
    }

    #[test]
    fn test_expectation_mismatches() {
        let frame = frame_to(ReceiverConfig::default().local_mac);
        let driver = Driver::new(DEFAULT_PREAMBLE_LEN).with_fault(Fault::Sfd(0x00));

        let err = bench()
            .expect(&frame, &driver, &Expectation::delivered(&frame))
            .unwrap_err();
        assert_eq!(
            err,
            TestbenchError::StatusMismatch {
                expected: 0,
                found: 2
            }
        );

        let err = bench()
            .expect(&frame, &driver, &Expectation::Silent)
            .unwrap_err();
        assert_eq!(
            err,
            TestbenchError::RecordCount {
                expected: 0,
                found: 1
            }
        );

        let other = Frame::new(frame.destination, MacAddress::BROADCAST, &b"Hello World!"[..]).unwrap();
        let err = bench()
            .expect(
                &other,
                &Driver::new(DEFAULT_PREAMBLE_LEN),
                &Expectation::delivered(&frame),
            )
            .unwrap_err();
        assert!(matches!(err, TestbenchError::SourceMismatch { .. }));
    }

    #[test]
    fn test_short_window_misses_output() {
        let frame = frame_to(ReceiverConfig::default().local_mac);
        let transcript = bench()
            .with_window(5)
            .run(&frame, &Driver::new(DEFAULT_PREAMBLE_LEN))
            .unwrap();
        // the monitor closes the truncated record at the end of the window
        assert_eq!(transcript.records.len(), 1);
        assert_eq!(transcript.records[0].bytes.len(), 5);
    }
}
