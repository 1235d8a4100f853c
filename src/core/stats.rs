use super::types::{ConfidenceBand, SimulationPath, SimulationStatistics, TerminalPercentiles};

/// Nearest-rank percentile over an ascending slice: the value at
/// `floor(n * k / 100)`, clamped to the last index. No interpolation.
pub fn percentile(sorted: &[f64], k: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * k / 100.0).floor().max(0.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn sort_ascending(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

pub fn success_rate(success_count: u32, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    success_count as f64 / total as f64 * 100.0
}

pub fn summarize(paths: &[SimulationPath]) -> SimulationStatistics {
    let success_count = paths.iter().filter(|p| p.success).count() as u32;

    let mut terminal: Vec<f64> = paths.iter().map(|p| p.terminal_value).collect();
    let mean_terminal_value = if terminal.is_empty() {
        0.0
    } else {
        terminal.iter().sum::<f64>() / terminal.len() as f64
    };
    sort_ascending(&mut terminal);

    SimulationStatistics {
        success_count,
        success_rate: success_rate(success_count, paths.len()),
        mean_terminal_value,
        percentiles: TerminalPercentiles {
            p10: percentile(&terminal, 10.0),
            p25: percentile(&terminal, 25.0),
            p50: percentile(&terminal, 50.0),
            p75: percentile(&terminal, 75.0),
            p90: percentile(&terminal, 90.0),
        },
        confidence_bands: confidence_bands(paths),
    }
}

/// Per-year 10/50/90 bands, each year sorted independently across paths.
pub fn confidence_bands(paths: &[SimulationPath]) -> Vec<ConfidenceBand> {
    let years = paths.iter().map(|p| p.values.len()).max().unwrap_or(0);
    let mut column = Vec::with_capacity(paths.len());
    let mut bands = Vec::with_capacity(years);

    for year in 0..years {
        column.clear();
        column.extend(paths.iter().filter_map(|p| p.values.get(year).copied()));
        sort_ascending(&mut column);
        bands.push(ConfidenceBand {
            year: year as u32,
            p10: percentile(&column, 10.0),
            p50: percentile(&column, 50.0),
            p90: percentile(&column, 90.0),
        });
    }

    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn path(values: Vec<f64>) -> SimulationPath {
        let terminal_value = values.last().copied().unwrap_or(0.0);
        SimulationPath {
            values,
            terminal_value,
            success: terminal_value > 0.0,
        }
    }

    #[test]
    fn percentile_uses_nearest_rank_without_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 25.0), 2.0);
        assert_eq!(percentile(&values, 10.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 90.0), 4.0);
    }

    #[test]
    fn percentile_clamps_at_one_hundred() {
        let values = [5.0, 6.0, 7.0];
        assert_eq!(percentile(&values, 100.0), 7.0);
        assert_eq!(percentile(&[9.0], 100.0), 9.0);
        assert_eq!(percentile(&[9.0], 0.0), 9.0);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn summarize_counts_strictly_positive_terminals() {
        let paths = vec![
            path(vec![10.0, 0.0]),
            path(vec![10.0, 0.0, 0.0]),
            path(vec![10.0, 1.0]),
            path(vec![10.0, 30.0]),
        ];
        let stats = summarize(&paths);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.mean_terminal_value, 31.0 / 4.0);
        assert_eq!(stats.percentiles.p10, 0.0);
        assert_eq!(stats.percentiles.p50, 1.0);
        assert_eq!(stats.percentiles.p90, 30.0);
    }

    #[test]
    fn bands_sort_each_year_independently() {
        let paths = vec![
            path(vec![100.0, 300.0, 10.0]),
            path(vec![100.0, 100.0, 30.0]),
            path(vec![100.0, 200.0, 20.0]),
        ];
        let bands = confidence_bands(&paths);
        assert_eq!(bands.len(), 3);
        assert_eq!(
            bands[1],
            ConfidenceBand {
                year: 1,
                p10: 100.0,
                p50: 200.0,
                p90: 300.0,
            }
        );
        assert_eq!(bands[2].p10, 10.0);
        assert_eq!(bands[2].p50, 20.0);
        assert_eq!(bands[2].p90, 30.0);
    }

    #[test]
    fn summarize_empty_set_is_all_zero() {
        let stats = summarize(&[]);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.mean_terminal_value, 0.0);
        assert!(stats.confidence_bands.is_empty());
    }

    proptest! {
        #[test]
        fn success_rate_matches_count_identity(
            terminals in proptest::collection::vec(0.0f64..1_000.0, 1..200),
            zero_mask in proptest::collection::vec(proptest::bool::ANY, 200),
        ) {
            let paths: Vec<SimulationPath> = terminals
                .iter()
                .zip(&zero_mask)
                .map(|(v, zero)| path(vec![1.0, if *zero { 0.0 } else { *v }]))
                .collect();
            let stats = summarize(&paths);
            let expected = paths.iter().filter(|p| p.terminal_value > 0.0).count() as u32;

            prop_assert_eq!(stats.success_count, expected);
            prop_assert_eq!(
                stats.success_rate,
                expected as f64 / paths.len() as f64 * 100.0
            );
            prop_assert!(stats.percentiles.p10 <= stats.percentiles.p25);
            prop_assert!(stats.percentiles.p25 <= stats.percentiles.p50);
            prop_assert!(stats.percentiles.p50 <= stats.percentiles.p75);
            prop_assert!(stats.percentiles.p75 <= stats.percentiles.p90);
        }

        #[test]
        fn percentile_returns_a_member(
            mut values in proptest::collection::vec(-1e6f64..1e6, 1..100),
            k in 0.0f64..=100.0,
        ) {
            sort_ascending(&mut values);
            let p = percentile(&values, k);
            prop_assert!(values.contains(&p));
            let idx = ((values.len() as f64 * k / 100.0).floor() as usize).min(values.len() - 1);
            prop_assert_eq!(p, values[idx]);
        }
    }
}
