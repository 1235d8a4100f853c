use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAssumption {
    pub name: String,
    /// Expected annual return in percent.
    pub expected_return: f64,
    /// Standard deviation of the annual return in percent.
    pub volatility: f64,
}

impl AssetAssumption {
    pub fn new(name: impl Into<String>, expected_return: f64, volatility: f64) -> Self {
        Self {
            name: name.into(),
            expected_return,
            volatility,
        }
    }
}

/// The fixed set of asset classes a run blends over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetTable {
    assets: Vec<AssetAssumption>,
}

impl AssetTable {
    pub fn new(assets: Vec<AssetAssumption>) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &[AssetAssumption] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.assets.iter().position(|a| a.name == name)
    }
}

/// Volatilities are set wide enough that the zero-correlation blend still
/// carries equity-like risk (a 60/25/5/10 mix lands near 8.4% / 20%).
impl Default for AssetTable {
    fn default() -> Self {
        Self::new(vec![
            AssetAssumption::new("stocks", 10.5, 33.0),
            AssetAssumption::new("bonds", 5.5, 8.0),
            AssetAssumption::new("cash", 2.5, 1.0),
            AssetAssumption::new("gold", 6.0, 16.0),
        ])
    }
}

/// Raw weights keyed by asset-class name. Need not sum to 100.
pub type Allocation = BTreeMap<String, f64>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DepletionPolicy {
    /// A balance clamped to zero can be restarted by a later contribution.
    #[default]
    Recoverable,
    /// Once a balance reaches zero it stays at zero for the rest of the path.
    Exhausted,
}

/// Pairwise correlation coefficients between asset classes, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    rows: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn identity(n: usize) -> Self {
        let rows = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum VolatilityModel {
    /// Blended volatility assumes zero correlation between asset classes.
    #[default]
    Uncorrelated,
    /// Blended volatility from a full correlation matrix.
    Correlated(CorrelationMatrix),
}

#[derive(Debug, Clone)]
pub struct SimulationParameters {
    pub portfolio_value: f64,
    pub annual_contribution: f64,
    pub years_until_retirement: u32,
    pub years_in_retirement: u32,
    pub annual_spending: f64,
    pub num_simulations: u32,
    pub seed: Option<u64>,
    pub depletion_policy: DepletionPolicy,
}

impl SimulationParameters {
    pub fn horizon_years(&self) -> u32 {
        self.years_until_retirement.saturating_add(self.years_in_retirement)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendedReturn {
    pub expected_return: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPath {
    pub values: Vec<f64>,
    pub terminal_value: f64,
    pub success: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceBand {
    pub year: u32,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalPercentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatistics {
    pub success_count: u32,
    pub success_rate: f64,
    pub mean_terminal_value: f64,
    pub percentiles: TerminalPercentiles,
    pub confidence_bands: Vec<ConfidenceBand>,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub blended: BlendedReturn,
    pub seed: u64,
    pub paths: Vec<SimulationPath>,
    pub statistics: SimulationStatistics,
}
