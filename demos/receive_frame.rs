//! Frame Receiver Demo
//!
//! Replays the classic testbench scenarios against the receiver model: a good
//! frame, a corrupted FCS, and a frame for another station.
//!
//! Run with `RUST_LOG=debug` to see the receiver's state transitions.

use ethrecv::datalink::DEFAULT_PREAMBLE_LEN;
use ethrecv::util::hex_dump;
use ethrecv::{Driver, Expectation, Fault, Frame, FrameReceiver, MacAddress, ReceiverConfig, Testbench};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Frame Receiver Demo");
    println!("===================\n");

    let local: MacAddress = "00:0a:95:9d:68:16".parse()?;
    let remote: MacAddress = "00:14:22:01:23:45".parse()?;
    let config = ReceiverConfig {
        local_mac: local,
        ..Default::default()
    };

    let good = Frame::new(local, remote, b"Hello World!".to_vec())?;
    let foreign = Frame::new(remote, remote, b"Hello World!".to_vec())?;
    println!("Wire image of the good frame:");
    print!("{}", hex_dump(&good.encode(DEFAULT_PREAMBLE_LEN), "  "));
    println!();

    let scenarios = [
        (
            "good frame",
            &good,
            Driver::new(DEFAULT_PREAMBLE_LEN),
            Expectation::delivered(&good),
        ),
        (
            "corrupted FCS",
            &good,
            Driver::new(DEFAULT_PREAMBLE_LEN).with_fault(Fault::Fcs { index: 2, value: 0 }),
            Expectation::Status(7),
        ),
        (
            "wrong preamble",
            &good,
            Driver::new(DEFAULT_PREAMBLE_LEN).with_fault(Fault::Preamble { index: 1, value: 0 }),
            Expectation::Status(1),
        ),
        (
            "foreign destination",
            &foreign,
            Driver::new(DEFAULT_PREAMBLE_LEN),
            Expectation::Silent,
        ),
    ];

    let mut bench = Testbench::new(FrameReceiver::new(config));
    for (name, frame, driver, expectation) in &scenarios {
        let transcript = bench.expect(frame, driver, expectation)?;
        println!("{}: {} valid ticks", name, transcript.valid_ticks());
        for record in &transcript.records {
            print!("{}", hex_dump(&record.bytes, "    "));
        }
        println!("    outcome: {:?}", bench.dut().last_outcome());
    }

    let stats = bench.dut().stats();
    println!("\nStatistics:");
    println!("  started:  {}", stats.frames_started);
    println!("  accepted: {}", stats.frames_accepted);
    println!("  rejected: {}", stats.frames_rejected);
    println!("  errors:   {}", stats.error_count());
    println!("  success rate: {:.1}%", stats.success_rate());

    Ok(())
}
