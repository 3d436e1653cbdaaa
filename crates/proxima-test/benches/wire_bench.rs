//! Benchmarks for the cluster wire format

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use proxima_core::{BeaconId, DistanceEvent, NodeName};
use proxima_wire::{FixedHeader, Frame};

fn event() -> DistanceEvent {
    DistanceEvent::new(
        NodeName::new("living-room"),
        BeaconId::new("e2c56db5-dffb-48d2-b060-d0f5a71096e0-1-2"),
        "Keys",
        2.4,
    )
    .with_sequence(1_700_000_000_000_000)
}

fn bench_header_parse(c: &mut Criterion) {
    let bytes = Frame::from_event("proxima.distance", &event())
        .unwrap()
        .serialize()
        .unwrap();

    c.bench_function("header_parse", |b| {
        b.iter(|| FixedHeader::parse(black_box(&bytes)))
    });
}

fn bench_frame_serialize(c: &mut Criterion) {
    let event = event();

    c.bench_function("frame_serialize", |b| {
        b.iter(|| {
            let frame = Frame::from_event("proxima.distance", black_box(&event)).unwrap();
            black_box(frame.serialize().unwrap())
        })
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let bytes = Frame::from_event("proxima.distance", &event())
        .unwrap()
        .serialize()
        .unwrap();

    c.bench_function("frame_decode_event", |b| {
        b.iter(|| {
            let frame = Frame::parse(black_box(&bytes)).unwrap();
            black_box(frame.event().unwrap())
        })
    });
}

criterion_group!(benches, bench_header_parse, bench_frame_serialize, bench_frame_decode);
criterion_main!(benches);
