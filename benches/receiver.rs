use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ethrecv::datalink::DEFAULT_PREAMBLE_LEN;
use ethrecv::{compute_lrc, Frame, FrameReceiver, MacAddress, ReceiverConfig};

fn lrc_benchmark(c: &mut Criterion) {
    let data = vec![0x5Au8; 1500];
    c.bench_function("compute_lrc_1500", |b| b.iter(|| compute_lrc(black_box(&data))));
}

fn receive_benchmark(c: &mut Criterion) {
    let config = ReceiverConfig::default();
    let frame = Frame::new(
        config.local_mac,
        MacAddress([0x00, 0x14, 0x22, 0x01, 0x23, 0x45]),
        vec![0x42u8; 1500],
    )
    .unwrap();
    let ticks = frame.to_ticks(DEFAULT_PREAMBLE_LEN);
    let mut receiver = FrameReceiver::new(config);

    c.bench_function("receive_frame_1500", |b| {
        b.iter(|| {
            let mut emitted = 0usize;
            for input in &ticks {
                receiver.tick(*input);
            }
            while receiver.on_clock_rising(0, false).valid {
                emitted += 1;
            }
            black_box(emitted)
        })
    });
}

criterion_group!(benches, lrc_benchmark, receive_benchmark);
criterion_main!(benches);
