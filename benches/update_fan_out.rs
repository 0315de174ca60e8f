//! Benchmarks for update fan-out
//!
//! This benchmark measures:
//! - Server event parsing into typed updates
//! - Demultiplexer publish cost with several filtered subscribers
//! - Draining a typed stream

use ai_lib_realtime::types::events::TextDelta;
use ai_lib_realtime::{ConversationUpdate, UpdateDemultiplexer, UpdateKind};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::{FutureExt, StreamExt};
use serde_json::json;

const BATCH: usize = 256;

fn sample_events() -> Vec<serde_json::Value> {
    vec![
        json!({"type": "response.created", "response": {"id": "resp_1"}}),
        json!({"type": "response.text.delta", "item_id": "item_1", "delta": "Hello"}),
        json!({"type": "response.audio.delta", "response_id": "resp_1", "item_id": "item_1", "content_index": 0, "delta": "AAAAAAAAAAA="}),
        json!({"type": "response.output_item.done", "item": {"id": "item_2", "type": "function_call", "call_id": "call_1", "name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}}),
        json!({"type": "response.done", "response": {"id": "resp_1", "usage": {"total_tokens": 42}}}),
    ]
}

fn bench_event_parsing(c: &mut Criterion) {
    let events = sample_events();
    let mut group = c.benchmark_group("event_parsing");
    group.throughput(Throughput::Elements(events.len() as u64));
    group.bench_function("from_server_event", |b| {
        b.iter(|| {
            for event in &events {
                black_box(ConversationUpdate::from_server_event(event.clone()).unwrap());
            }
        })
    });
    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let updates: Vec<ConversationUpdate> = sample_events()
        .into_iter()
        .map(|e| ConversationUpdate::from_server_event(e).unwrap())
        .collect();

    let mut group = c.benchmark_group("demux_publish");
    group.throughput(Throughput::Elements(updates.len() as u64));
    for subscribers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &n| {
                let demux = UpdateDemultiplexer::new();
                let mut streams: Vec<_> = (0..n)
                    .map(|i| {
                        let kind = UpdateKind::ALL[i % UpdateKind::ALL.len()];
                        demux.subscribe(kind)
                    })
                    .collect();
                b.iter(|| {
                    for update in &updates {
                        black_box(demux.publish(update.clone()));
                    }
                    // Keep queues from growing across iterations.
                    for stream in &mut streams {
                        while let Some(Some(_)) = stream.next().now_or_never() {}
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_typed_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("typed_stream");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("drain_text_deltas", |b| {
        b.to_async(&runtime).iter(|| async {
            let demux = UpdateDemultiplexer::new();
            let stream = demux.stream::<TextDelta>();
            for i in 0..BATCH {
                demux.publish(
                    TextDelta {
                        item_id: "item".into(),
                        delta: i.to_string(),
                        raw: serde_json::Value::Null,
                    }
                    .into(),
                );
            }
            demux.close();
            black_box(stream.count().await)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_event_parsing, bench_publish, bench_typed_drain);
criterion_main!(benches);
