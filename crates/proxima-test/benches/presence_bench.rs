//! Benchmarks for presence aggregation

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use proxima_core::{BeaconId, DistanceEvent, NodeName, Timestamp};
use proxima_presence::PresenceAggregator;

fn events(identities: usize, nodes: usize) -> Vec<DistanceEvent> {
    let mut out = Vec::with_capacity(identities * nodes);
    for i in 0..identities {
        for n in 0..nodes {
            out.push(DistanceEvent::new(
                NodeName::new(format!("node-{}", n)),
                BeaconId::new(format!("beacon-{}", i)),
                "Beacon",
                1.0 + n as f64,
            ));
        }
    }
    out
}

fn bench_apply(c: &mut Criterion) {
    let mut agg = PresenceAggregator::new(Duration::from_secs(60));
    let batch = events(1, 8);

    c.bench_function("aggregator_apply_8_nodes", |b| {
        b.iter(|| {
            for event in &batch {
                black_box(agg.apply(black_box(event), Timestamp::ZERO));
            }
        })
    });
}

fn bench_sweep(c: &mut Criterion) {
    let mut agg = PresenceAggregator::new(Duration::from_secs(60));
    for event in events(1000, 4) {
        agg.apply(&event, Timestamp::ZERO);
    }

    // Nothing expires: measures the scan over 1000 identities
    c.bench_function("aggregator_sweep_1000_live", |b| {
        b.iter(|| black_box(agg.sweep(Timestamp::from_secs(30))))
    });
}

criterion_group!(benches, bench_apply, bench_sweep);
criterion_main!(benches);
