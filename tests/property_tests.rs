//! Property-based tests for series extraction and aggregation
//!
//! - Extraction keeps exactly the measurement lines, in order
//! - Aggregation truncates to the shortest repeat and averages per index
//! - Run with ProptestConfig::with_cases(100)

use cachebench::aggregate::{aggregate, RepeatedSeries, VariantSummary};
use cachebench::series::extract_series;
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Lines that must never be read as measurements
fn arb_noise_line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        Just("Warming up".to_string()),
        Just("-- iteration done --".to_string()),
        Just("[gc] pause".to_string()),
        "[a-zA-Z ]{1,20}",
    ]
}

/// One non-empty series, values in a latency-like range
fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0u32..1_000_000, 1..=max_len)
        .prop_map(|values| values.into_iter().map(f64::from).collect())
}

/// Several repeats of possibly different lengths
fn arb_repeats() -> impl Strategy<Value = Vec<Vec<f64>>> {
    proptest::collection::vec(arb_series(40), 1..6)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: N measurement lines mixed with M noise lines yield N values in order
    #[test]
    fn prop_extraction_keeps_measurements_in_order(
        values in arb_series(50),
        noise in proptest::collection::vec(arb_noise_line(), 0..30),
        seed in 0usize..1000
    ) {
        let mut lines: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
        for (i, line) in noise.into_iter().enumerate() {
            let at = (seed + i * 7) % (lines.len() + 1);
            lines.insert(at, line);
        }
        let text = lines.join("\n");

        prop_assert_eq!(extract_series(&text), values);
    }

    /// Property: every repeat is truncated to the shortest one
    #[test]
    fn prop_common_length_is_shortest_repeat(
        baseline in arb_repeats(),
        replay in arb_repeats()
    ) {
        let shortest = baseline.iter().chain(&replay).map(Vec::len).min().unwrap();
        let repeats = baseline.len();
        let replay_repeats = replay.len();
        let collected = vec![
            ("baseline".to_string(), RepeatedSeries::new(baseline)),
            ("replay".to_string(), RepeatedSeries::new(replay)),
        ];

        let aggregation = aggregate("w", &collected).unwrap();

        prop_assert_eq!(aggregation.common_length, shortest);
        prop_assert_eq!(aggregation.averaged.len(), shortest);
        prop_assert_eq!(aggregation.raw.len(), (repeats + replay_repeats) * shortest);
        for (i, row) in aggregation.averaged.iter().enumerate() {
            prop_assert_eq!(row.invocation as usize, i + 1);
            prop_assert_eq!(row.means.len(), 2);
        }
    }

    /// Property: each mean lies between the min and max of its column
    #[test]
    fn prop_mean_bounded_by_repeats(runs in arb_repeats()) {
        let collected = vec![("baseline".to_string(), RepeatedSeries::new(runs.clone()))];
        let aggregation = aggregate("w", &collected).unwrap();

        for (i, row) in aggregation.averaged.iter().enumerate() {
            let column: Vec<f64> = runs.iter().map(|r| r[i]).collect();
            let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = row.mean("baseline").unwrap();
            prop_assert!(mean >= lo - 1e-6 && mean <= hi + 1e-6, "mean {} outside [{}, {}]", mean, lo, hi);
        }
    }

    /// Property: p95 is a sample, median and p95 lie within the series range
    #[test]
    fn prop_summary_within_range(series in arb_series(200)) {
        let summary = VariantSummary::from_series("v", &series).unwrap();
        let lo = series.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        prop_assert_eq!(summary.count, series.len());
        prop_assert_eq!(summary.first, series[0]);
        prop_assert!(series.contains(&summary.p95));
        prop_assert!(summary.median >= lo && summary.median <= hi);
        prop_assert!(summary.mean >= lo - 1e-6 && summary.mean <= hi + 1e-6);
    }
}
