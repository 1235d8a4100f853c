mod engine;
mod error;
mod portfolio;
mod sampler;
mod stats;
mod types;

pub use engine::{
    CancelToken, MAX_AMOUNT, MAX_HORIZON_YEARS, MAX_SIMULATIONS, run_simulation,
    run_simulation_with_cancel, simulate_path, validate_parameters,
};
pub use error::{Result, SimulationError};
pub use portfolio::{blend, normalize_allocation, validate_asset_table, validate_correlation};
pub use sampler::AnnualReturnSampler;
pub use stats::{confidence_bands, percentile, success_rate, summarize};
pub use types::{
    Allocation, AssetAssumption, AssetTable, BlendedReturn, ConfidenceBand, CorrelationMatrix,
    DepletionPolicy, SimulationParameters, SimulationPath, SimulationResult, SimulationStatistics,
    TerminalPercentiles, VolatilityModel,
};
