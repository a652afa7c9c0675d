//! Validation benchmarks
//!
//! Measures the per-record cost on the ingest hot path: schema validation,
//! ordering key lookup and payload encoding.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;
use telemetry_gateway::publish::PublishEnvelope;
use telemetry_gateway::record::{self, TelemetryRecord};
use telemetry_gateway::OrderingKeyResolver;

fn make_reading(n: usize) -> Value {
    json!({
        "timestamp": "2024-01-01T00:00:00.250+00:00",
        "equipment_id": format!("EQ-{n:04}"),
        "sensor_id": "TBN_017_VIB",
        "value": n as f64 * 0.5,
        "unit": "mm/s"
    })
}

fn bench_single_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    group.throughput(Throughput::Elements(1000));

    let readings: Vec<Value> = (0..1000).map(make_reading).collect();

    group.bench_function("from_value", |b| {
        b.iter(|| {
            for reading in &readings {
                let _ = black_box(TelemetryRecord::from_value(reading));
            }
        })
    });

    // Naive timestamp takes the slow path through the fallback parser
    let naive: Vec<Value> = readings
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r["timestamp"] = json!("2024-01-01T00:00:00");
            r
        })
        .collect();

    group.bench_function("from_value_rejected", |b| {
        b.iter(|| {
            for reading in &naive {
                let _ = black_box(TelemetryRecord::from_value(reading));
            }
        })
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    for size in [10, 100, 1000] {
        let batch = Value::Array((0..size).map(make_reading).collect());
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("validate_batch_{size}"), |b| {
            b.iter(|| black_box(record::validate_batch(&batch)))
        });
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    group.throughput(Throughput::Elements(1000));

    let records: Vec<TelemetryRecord> = (0..1000)
        .filter_map(|n| TelemetryRecord::from_value(&make_reading(n)).ok())
        .collect();
    let keyed = OrderingKeyResolver::new(Some("equipment_id".into()));
    let unkeyed = OrderingKeyResolver::disabled();

    group.bench_function("keyed", |b| {
        b.iter(|| {
            for record in &records {
                let _ = black_box(PublishEnvelope::from_record(record, &keyed));
            }
        })
    });

    group.bench_function("unkeyed", |b| {
        b.iter(|| {
            for record in &records {
                let _ = black_box(PublishEnvelope::from_record(record, &unkeyed));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_single_record, bench_batch, bench_envelope);
criterion_main!(benches);
