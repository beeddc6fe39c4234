//! Benchmarks for series loading, slicing and anomaly injection

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fleetsim_core::metrics::{MetricSample, METRIC_FIELDS, TIMESTAMP_COLUMN};
use fleetsim_core::{AnomalyInjector, MetricSeries};
use std::time::Duration;

fn create_csv(rows: usize) -> String {
    let mut text = std::iter::once(TIMESTAMP_COLUMN)
        .chain(METRIC_FIELDS.iter().map(|f| f.name))
        .collect::<Vec<_>>()
        .join(",");
    for i in 0..rows {
        let sample = MetricSample {
            timestamp: i as i64 * 10,
            load_1m: (i % 7) as f64 * 0.3,
            cpu_user: (i % 100) as f64 / 100.0,
            sys_mem_total: 16_384,
            server_up: 1,
            ..Default::default()
        };
        let mut cols = vec![sample.timestamp.to_string()];
        cols.extend(sample.fields().map(|(_, value)| value.to_string()));
        text.push('\n');
        text.push_str(&cols.join(","));
    }
    text
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("series_load");

    for rows in [1_000, 10_000, 100_000].iter() {
        let csv = create_csv(*rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &csv, |b, csv| {
            b.iter(|| MetricSeries::from_reader("bench", black_box(csv.as_bytes())).unwrap());
        });
    }

    group.finish();
}

fn bench_slice(c: &mut Criterion) {
    let series = MetricSeries::from_reader("bench", create_csv(100_000).as_bytes()).unwrap();

    c.bench_function("slice_between_1d", |b| {
        b.iter(|| {
            let mut series = series.clone();
            series
                .slice_between(
                    black_box(Duration::from_secs(3_600)),
                    black_box(Duration::from_secs(86_400)),
                )
                .unwrap();
            series
        });
    });
}

fn bench_inject(c: &mut Criterion) {
    let injector = AnomalyInjector::default();
    let series = MetricSeries::from_reader("bench", create_csv(100_000).as_bytes()).unwrap();

    let mut group = c.benchmark_group("anomaly_inject");
    for name in ["a1", "a2"] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut series = series.clone();
                injector.inject(&mut series, black_box(name)).unwrap();
                series
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_load, bench_slice, bench_inject);
criterion_main!(benches);
