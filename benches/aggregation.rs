//! Extraction and aggregation benchmarks
//!
//! Both run once per phase/combination, so they must stay negligible next
//! to the child processes they post-process.
//!
//! Run with: cargo bench --bench aggregation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cachebench::aggregate::{aggregate, RepeatedSeries};
use cachebench::series::extract_series;

const SIZES: [usize; 3] = [100, 1_000, 10_000];

#[allow(clippy::cast_precision_loss)]
fn synthetic_output(invocations: usize) -> String {
    let mut text = String::from("Runner starting\n");
    for i in 0..invocations {
        if i % 50 == 0 {
            text.push_str("[gc] pause\n");
        }
        text.push_str(&format!("{}\n", 100.0 + (i % 17) as f64 * 1.5));
    }
    text.push_str("done\n");
    text
}

fn bench_extract_series(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_series");
    for size in SIZES {
        let text = synthetic_output(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| extract_series(black_box(text)));
        });
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_two_variants_five_repeats");
    for size in SIZES {
        let series = extract_series(&synthetic_output(size));
        let collected = vec![
            ("baseline".to_string(), RepeatedSeries::new(vec![series.clone(); 5])),
            ("replay".to_string(), RepeatedSeries::new(vec![series; 5])),
        ];
        group.bench_with_input(BenchmarkId::from_parameter(size), &collected, |b, collected| {
            b.iter(|| aggregate("bench", black_box(collected)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract_series, bench_aggregate);
criterion_main!(benches);
