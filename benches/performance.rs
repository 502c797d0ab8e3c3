//! Performance benchmarks for the event pipeline.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use conveyor::{
    Destination, Event, Predicate, Queue, QueueConfig, RecordStore, Result, Topic,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Destination that swallows events.
struct Sink;

impl Destination for Sink {
    fn name(&self) -> &str {
        "sink"
    }

    fn deliver(&self, _event: Event) -> Result<()> {
        Ok(())
    }
}

fn created_event(key: &str) -> Event {
    Event::new("ObjectCreated:Put")
        .with_attr("eventName", "ObjectCreated:Put")
        .with_attr("objectKey", key)
}

/// Benchmark publish fan-out with varying subscription counts
fn bench_topic_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_fan_out");

    for subscriptions in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscriptions", subscriptions),
            &subscriptions,
            |b, &count| {
                let topic = Topic::new("bench");
                for _ in 0..count {
                    topic.subscribe(
                        Predicate::match_all().attr_prefix("eventName", "ObjectCreated"),
                        Arc::new(Sink),
                    );
                }
                let event = created_event("cat.png");

                b.iter(|| {
                    black_box(topic.publish(black_box(&event)));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark predicate evaluation against non-matching subscriptions
fn bench_selective_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("selective_routing");

    for subscriptions in [10, 100] {
        group.bench_with_input(
            BenchmarkId::new("non_matching", subscriptions),
            &subscriptions,
            |b, &count| {
                let topic = Topic::new("bench");
                for i in 0..count {
                    topic.subscribe(
                        Predicate::match_all().attr_exact("objectKey", format!("{i}.png")),
                        Arc::new(Sink),
                    );
                }
                let event = created_event("never-matches.png");

                b.iter(|| {
                    black_box(topic.publish(black_box(&event)));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the enqueue/receive/acknowledge cycle
fn bench_queue_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_cycle");

    for batch_size in [1usize, 5, 25] {
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &batch_size,
            |b, &batch| {
                let queue = Queue::new(QueueConfig {
                    name: "bench".to_string(),
                    visibility_timeout: Duration::from_secs(60),
                    redrive: None,
                });

                b.iter(|| {
                    for i in 0..batch {
                        queue.enqueue(created_event(&format!("{i}.png"))).unwrap();
                    }
                    for message in queue.receive_batch(batch, Duration::ZERO) {
                        queue.acknowledge(message.id).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark store mutation with change-feed subscribers attached
fn bench_store_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_mutation");

    for subscribers in [0, 4] {
        group.bench_with_input(
            BenchmarkId::new("feed_subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let store = RecordStore::new();
                let handles: Vec<_> = (0..count)
                    .map(|_| store.subscribe_changes_with_buffer(1_000_000))
                    .collect();

                let mut attributes = HashMap::new();
                attributes.insert("ImageName".to_string(), "cat.png".to_string());

                b.iter(|| {
                    store.put(black_box("cat.png"), attributes.clone());
                });

                drop(handles);
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_topic_fan_out,
    bench_selective_routing,
    bench_queue_cycle,
    bench_store_mutation
);
criterion_main!(benches);
