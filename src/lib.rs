#![doc = include_str!("../README.md")]

pub mod datalink;
pub mod testbench;
pub mod util;

// Re-export main types without glob imports to avoid conflicts
pub use datalink::{
    Frame, FrameError, FrameOutcome, FrameReceiver, MacAddress, ReceiveError, ReceivedFrame,
    ReceiverConfig, ReceiverState, TickInput, TickOutput,
};
pub use testbench::{Driver, Dut, Expectation, Fault, Monitor, Testbench, TestbenchError};
pub use util::compute_lrc;
