use super::error::{Result, SimulationError};
use super::types::{Allocation, AssetTable, BlendedReturn, CorrelationMatrix, VolatilityModel};

const CORRELATION_EPS: f64 = 1e-9;

pub fn validate_asset_table(table: &AssetTable) -> Result<()> {
    if table.is_empty() {
        return Err(SimulationError::InvalidAssetTable(
            "at least one asset class is required".to_string(),
        ));
    }

    for (idx, asset) in table.assets().iter().enumerate() {
        if asset.name.trim().is_empty() {
            return Err(SimulationError::InvalidAssetTable(format!(
                "asset #{idx} has an empty name"
            )));
        }
        if table.position(&asset.name) != Some(idx) {
            return Err(SimulationError::InvalidAssetTable(format!(
                "duplicate asset class '{}'",
                asset.name
            )));
        }
        if !asset.expected_return.is_finite() {
            return Err(SimulationError::InvalidAssetTable(format!(
                "'{}' expected return must be finite",
                asset.name
            )));
        }
        if !asset.volatility.is_finite() || asset.volatility < 0.0 {
            return Err(SimulationError::InvalidAssetTable(format!(
                "'{}' volatility must be finite and >= 0",
                asset.name
            )));
        }
    }

    Ok(())
}

/// Weights in table order, rescaled to sum to 100. A zero total falls back to
/// an equal split across every asset class in the table.
pub fn normalize_allocation(table: &AssetTable, allocation: &Allocation) -> Result<Vec<f64>> {
    let mut weights = vec![0.0; table.len()];

    for (name, &weight) in allocation {
        let idx = table.position(name).ok_or_else(|| {
            SimulationError::InvalidAllocation(format!("unknown asset class '{name}'"))
        })?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(SimulationError::InvalidAllocation(format!(
                "weight for '{name}' must be finite and >= 0"
            )));
        }
        weights[idx] = weight;
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        let equal = 100.0 / table.len() as f64;
        return Ok(vec![equal; table.len()]);
    }

    Ok(weights.into_iter().map(|w| w / total * 100.0).collect())
}

pub fn blend(
    table: &AssetTable,
    allocation: &Allocation,
    volatility_model: &VolatilityModel,
) -> Result<BlendedReturn> {
    validate_asset_table(table)?;
    let fractions: Vec<f64> = normalize_allocation(table, allocation)?
        .into_iter()
        .map(|w| w / 100.0)
        .collect();

    let expected_return: f64 = table
        .assets()
        .iter()
        .zip(&fractions)
        .map(|(asset, f)| f * asset.expected_return)
        .sum();

    let volatility = match volatility_model {
        VolatilityModel::Uncorrelated => table
            .assets()
            .iter()
            .zip(&fractions)
            .map(|(asset, f)| (f * asset.volatility).powi(2))
            .sum::<f64>()
            .sqrt(),
        VolatilityModel::Correlated(matrix) => {
            validate_correlation(matrix, table.len())?;
            correlated_volatility(table, &fractions, matrix)
        }
    };

    Ok(BlendedReturn {
        expected_return,
        volatility,
    })
}

fn correlated_volatility(table: &AssetTable, fractions: &[f64], matrix: &CorrelationMatrix) -> f64 {
    let scaled: Vec<f64> = table
        .assets()
        .iter()
        .zip(fractions)
        .map(|(asset, f)| f * asset.volatility)
        .collect();

    let mut variance = 0.0_f64;
    for (i, si) in scaled.iter().enumerate() {
        for (j, sj) in scaled.iter().enumerate() {
            variance += si * sj * matrix.get(i, j);
        }
    }
    // Rounding can leave a tiny negative variance for near-perfect hedges.
    variance.max(0.0).sqrt()
}

pub fn validate_correlation(matrix: &CorrelationMatrix, n: usize) -> Result<()> {
    let rows = matrix.rows();
    if rows.len() != n || rows.iter().any(|row| row.len() != n) {
        return Err(SimulationError::InvalidCorrelation(format!(
            "expected a {n}x{n} matrix"
        )));
    }

    for i in 0..n {
        if (rows[i][i] - 1.0).abs() > CORRELATION_EPS {
            return Err(SimulationError::InvalidCorrelation(format!(
                "diagonal entry {i} must be 1"
            )));
        }
        for j in 0..n {
            let rho = rows[i][j];
            if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
                return Err(SimulationError::InvalidCorrelation(format!(
                    "entry ({i}, {j}) must be within [-1, 1]"
                )));
            }
            if (rho - rows[j][i]).abs() > CORRELATION_EPS {
                return Err(SimulationError::InvalidCorrelation(format!(
                    "entries ({i}, {j}) and ({j}, {i}) differ"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AssetAssumption;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn allocation(pairs: &[(&str, f64)]) -> Allocation {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn standard_allocation() -> Allocation {
        allocation(&[("stocks", 60.0), ("bonds", 25.0), ("cash", 5.0), ("gold", 10.0)])
    }

    #[test]
    fn zero_sum_allocation_falls_back_to_equal_split() {
        let table = AssetTable::default();
        let weights =
            normalize_allocation(&table, &allocation(&[("stocks", 0.0)])).expect("valid");
        assert_eq!(weights, vec![25.0; 4]);

        let empty = normalize_allocation(&table, &Allocation::new()).expect("valid");
        assert_eq!(empty, vec![25.0; 4]);
    }

    #[test]
    fn equal_split_tracks_table_size() {
        let table = AssetTable::new(vec![
            AssetAssumption::new("a", 1.0, 0.0),
            AssetAssumption::new("b", 2.0, 0.0),
            AssetAssumption::new("c", 3.0, 0.0),
        ]);
        let blended = blend(&table, &Allocation::new(), &VolatilityModel::Uncorrelated)
            .expect("valid");
        assert_approx(blended.expected_return, 2.0);
        assert_approx(blended.volatility, 0.0);
    }

    #[test]
    fn weights_are_rescaled_to_one_hundred() {
        let table = AssetTable::default();
        let alloc = allocation(&[("stocks", 3.0), ("bonds", 1.0)]);
        let weights = normalize_allocation(&table, &alloc).expect("valid");
        assert_approx(weights[0], 75.0);
        assert_approx(weights[1], 25.0);
        assert_approx(weights[2], 0.0);
        assert_approx(weights[3], 0.0);
    }

    #[test]
    fn standard_mix_blends_to_expected_figures() {
        let blended = blend(
            &AssetTable::default(),
            &standard_allocation(),
            &VolatilityModel::Uncorrelated,
        )
        .expect("valid");
        assert_approx(blended.expected_return, 8.4);
        let expected_vol =
            (19.8_f64.powi(2) + 2.0_f64.powi(2) + 0.05_f64.powi(2) + 1.6_f64.powi(2)).sqrt();
        assert_approx(blended.volatility, expected_vol);
    }

    #[test]
    fn rejects_unknown_and_negative_weights() {
        let table = AssetTable::default();
        let err = normalize_allocation(&table, &allocation(&[("crypto", 10.0)]))
            .expect_err("unknown class");
        assert!(err.to_string().contains("crypto"));

        let err = normalize_allocation(&table, &allocation(&[("stocks", -1.0)]))
            .expect_err("negative weight");
        assert!(matches!(err, SimulationError::InvalidAllocation(_)));
    }

    #[test]
    fn rejects_bad_asset_tables() {
        let dup = AssetTable::new(vec![
            AssetAssumption::new("stocks", 1.0, 1.0),
            AssetAssumption::new("stocks", 2.0, 1.0),
        ]);
        assert!(matches!(
            validate_asset_table(&dup),
            Err(SimulationError::InvalidAssetTable(_))
        ));
        assert!(validate_asset_table(&AssetTable::new(Vec::new())).is_err());
        let negative_vol = AssetTable::new(vec![AssetAssumption::new("x", 1.0, -2.0)]);
        assert!(validate_asset_table(&negative_vol).is_err());
    }

    #[test]
    fn identity_correlation_matches_uncorrelated_mode() {
        let table = AssetTable::default();
        let alloc = standard_allocation();
        let plain = blend(&table, &alloc, &VolatilityModel::Uncorrelated).expect("valid");
        let identity = blend(
            &table,
            &alloc,
            &VolatilityModel::Correlated(CorrelationMatrix::identity(4)),
        )
        .expect("valid");
        assert_approx(identity.volatility, plain.volatility);
        assert_approx(identity.expected_return, plain.expected_return);
    }

    #[test]
    fn perfect_correlation_sums_weighted_volatilities() {
        let table = AssetTable::new(vec![
            AssetAssumption::new("a", 8.0, 20.0),
            AssetAssumption::new("b", 4.0, 10.0),
        ]);
        let alloc = allocation(&[("a", 50.0), ("b", 50.0)]);
        let matrix = CorrelationMatrix::new(vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
        let blended = blend(&table, &alloc, &VolatilityModel::Correlated(matrix)).expect("valid");
        assert_approx(blended.volatility, 15.0);
    }

    #[test]
    fn rejects_malformed_correlation_matrices() {
        let asymmetric = CorrelationMatrix::new(vec![vec![1.0, 0.3], vec![0.2, 1.0]]);
        assert!(validate_correlation(&asymmetric, 2).is_err());
        let wrong_size = CorrelationMatrix::identity(3);
        assert!(validate_correlation(&wrong_size, 2).is_err());
        let bad_diag = CorrelationMatrix::new(vec![vec![0.5, 0.0], vec![0.0, 1.0]]);
        assert!(validate_correlation(&bad_diag, 2).is_err());
        let out_of_range = CorrelationMatrix::new(vec![vec![1.0, 1.5], vec![1.5, 1.0]]);
        assert!(validate_correlation(&out_of_range, 2).is_err());
    }

    proptest! {
        #[test]
        fn normalized_weights_sum_to_one_hundred(
            stocks in 0.0f64..1_000.0,
            bonds in 0.0f64..1_000.0,
            cash in 0.0f64..1_000.0,
            gold in 0.0f64..1_000.0,
        ) {
            let alloc = allocation(&[
                ("stocks", stocks),
                ("bonds", bonds),
                ("cash", cash),
                ("gold", gold),
            ]);
            let weights = normalize_allocation(&AssetTable::default(), &alloc).expect("valid");
            let total: f64 = weights.iter().sum();
            prop_assert!((total - 100.0).abs() < 1e-6);
            prop_assert!(weights.iter().all(|w| *w >= 0.0));
        }

        #[test]
        fn blended_return_stays_within_asset_range(
            stocks in 0.0f64..100.0,
            bonds in 0.0f64..100.0,
            cash in 0.0f64..100.0,
            gold in 0.0f64..100.0,
        ) {
            let alloc = allocation(&[
                ("stocks", stocks),
                ("bonds", bonds),
                ("cash", cash),
                ("gold", gold),
            ]);
            let blended = blend(&AssetTable::default(), &alloc, &VolatilityModel::Uncorrelated)
                .expect("valid");
            prop_assert!(blended.expected_return >= 2.5 - 1e-9);
            prop_assert!(blended.expected_return <= 10.5 + 1e-9);
            prop_assert!(blended.volatility >= 0.0);
            prop_assert!(blended.volatility <= 33.0 + 1e-9);
        }
    }
}
