//! # Dispatch Benchmark
//!
//! Measures publish-to-handler cost in both delivery modes and the contact
//! producer's per-tick cost.
//!
//! Run with: `cargo bench --package ripple`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple::{wire, Aabb, DispatchConfig, EventBus, SimulationLoop, SubscriptionHandle};
use ripple_core::{EntityArena, EntityRef};
use ripple_shared::{CollisionPayload, Vec3};

/// Events per deferred batch.
const BATCH: usize = 1_000;

fn sample() -> CollisionPayload {
    CollisionPayload::new(
        EntityRef::new(1, 0),
        Vec3::new(1.0, 0.0, 0.0),
        EntityRef::new(2, 0),
        Vec3::new(1.0, 0.0, 1.0),
    )
}

struct Fixture {
    bus: EventBus,
    counter: Arc<AtomicU64>,
    handles: Vec<SubscriptionHandle>,
}

fn bus_with_subscribers(config: DispatchConfig, subscribers: usize) -> Fixture {
    let registry = Arc::new(wire::engine_registry().unwrap_or_else(|e| panic!("{e}")));
    let bus = EventBus::with_config(registry, config);
    let counter = Arc::new(AtomicU64::new(0));
    let handles = (0..subscribers)
        .map(|_| {
            let counter = Arc::clone(&counter);
            bus.subscribe(move |c: &CollisionPayload| {
                counter.fetch_add(u64::from(c.entity_a.index()), Ordering::Relaxed);
            })
            .unwrap_or_else(|e| panic!("{e}"))
        })
        .collect();
    Fixture {
        bus,
        counter,
        handles,
    }
}

/// Benchmark: immediate publish, varying fan-out.
fn bench_immediate_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("immediate_publish");

    for subscribers in [1, 8, 64] {
        let fixture = bus_with_subscribers(DispatchConfig::default(), subscribers);
        assert_eq!(fixture.handles.len(), subscribers);
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            b.iter(|| fixture.bus.publish(black_box(sample())));
        });
        black_box(fixture.counter.load(Ordering::Relaxed));
    }

    group.finish();
}

/// Benchmark: deferred publish of a batch followed by one drain.
fn bench_deferred_batch(c: &mut Criterion) {
    let config = DispatchConfig::deferred().with_queue_capacity(BATCH);
    let fixture = bus_with_subscribers(config, 4);
    assert_eq!(fixture.handles.len(), 4);

    c.bench_function("deferred_publish_drain_1k", |b| {
        b.iter(|| {
            for _ in 0..BATCH {
                fixture
                    .bus
                    .publish(black_box(sample()))
                    .unwrap_or_else(|e| panic!("{e}"));
            }
            fixture.bus.drain()
        });
    });
    black_box(fixture.counter.load(Ordering::Relaxed));
}

/// Benchmark: one simulation tick over a row of touching bodies.
fn bench_simulation_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_step");

    for bodies in [16, 128] {
        let fixture = bus_with_subscribers(DispatchConfig::default(), 1);
        assert_eq!(fixture.handles.len(), 1);
        let mut sim = SimulationLoop::new(EntityArena::new(bodies), fixture.bus);
        for i in 0..bodies {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f32 * 0.9;
            sim.spawn_body(Aabb::from_center(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5)));
        }

        group.bench_with_input(BenchmarkId::from_parameter(bodies), &bodies, |b, _| {
            b.iter(|| sim.step());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_immediate_publish,
    bench_deferred_batch,
    bench_simulation_step
);
criterion_main!(benches);
