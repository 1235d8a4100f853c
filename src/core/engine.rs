use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, warn};

use super::error::{Result, SimulationError};
use super::portfolio::blend;
use super::sampler::{AnnualReturnSampler, derive_path_seed};
use super::stats::summarize;
use super::types::{
    Allocation, AssetTable, DepletionPolicy, SimulationParameters, SimulationPath,
    SimulationResult, VolatilityModel,
};

pub const MAX_SIMULATIONS: u32 = 100_000;
pub const MAX_HORIZON_YEARS: u32 = 200;
/// Upper bound on any money input; keeps compounded balances well inside f64.
pub const MAX_AMOUNT: f64 = 1e15;

/// Shared flag checked between paths. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub fn validate_parameters(params: &SimulationParameters) -> Result<()> {
    let amounts = [
        ("portfolioValue", params.portfolio_value),
        ("annualContribution", params.annual_contribution),
        ("annualSpending", params.annual_spending),
    ];
    for (field, value) in amounts {
        if !value.is_finite() {
            return Err(SimulationError::invalid(field, "must be a finite number"));
        }
        if value < 0.0 {
            return Err(SimulationError::invalid(field, "must be >= 0"));
        }
        if value > MAX_AMOUNT {
            return Err(SimulationError::invalid(
                field,
                format!("must be <= {MAX_AMOUNT:e}"),
            ));
        }
    }

    if params.num_simulations == 0 {
        return Err(SimulationError::invalid("numSimulations", "must be > 0"));
    }
    if params.num_simulations > MAX_SIMULATIONS {
        return Err(SimulationError::invalid(
            "numSimulations",
            format!("must be <= {MAX_SIMULATIONS}"),
        ));
    }

    let horizon = params
        .years_until_retirement
        .checked_add(params.years_in_retirement)
        .unwrap_or(u32::MAX);
    if horizon > MAX_HORIZON_YEARS {
        return Err(SimulationError::invalid(
            "yearsUntilRetirement + yearsInRetirement",
            format!("must be <= {MAX_HORIZON_YEARS}"),
        ));
    }

    Ok(())
}

pub fn run_simulation(
    params: &SimulationParameters,
    table: &AssetTable,
    allocation: &Allocation,
    volatility_model: &VolatilityModel,
) -> Result<SimulationResult> {
    run_simulation_with_cancel(
        params,
        table,
        allocation,
        volatility_model,
        &CancelToken::new(),
    )
}

pub fn run_simulation_with_cancel(
    params: &SimulationParameters,
    table: &AssetTable,
    allocation: &Allocation,
    volatility_model: &VolatilityModel,
    cancel: &CancelToken,
) -> Result<SimulationResult> {
    validate_parameters(params)?;
    let blended = blend(table, allocation, volatility_model)?;
    debug!(
        expected_return = blended.expected_return,
        volatility = blended.volatility,
        "blended portfolio return"
    );

    let sampler = AnnualReturnSampler::new(blended.expected_return, blended.volatility)?;
    let seed = params.seed.unwrap_or_else(rand::random);
    let started = Instant::now();

    let paths = match simulate_paths(params, &sampler, seed, cancel) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(seed, "simulation stopped: {err}");
            return Err(err);
        }
    };
    let statistics = summarize(&paths);

    info!(
        simulations = params.num_simulations,
        seed,
        success_rate = statistics.success_rate,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "simulation complete"
    );

    Ok(SimulationResult {
        blended,
        seed,
        paths,
        statistics,
    })
}

#[cfg(feature = "parallel")]
fn simulate_paths(
    params: &SimulationParameters,
    sampler: &AnnualReturnSampler,
    seed: u64,
    cancel: &CancelToken,
) -> Result<Vec<SimulationPath>> {
    (0..params.num_simulations)
        .into_par_iter()
        .map(|path_index| simulate_indexed_path(params, sampler, seed, path_index, cancel))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn simulate_paths(
    params: &SimulationParameters,
    sampler: &AnnualReturnSampler,
    seed: u64,
    cancel: &CancelToken,
) -> Result<Vec<SimulationPath>> {
    (0..params.num_simulations)
        .map(|path_index| simulate_indexed_path(params, sampler, seed, path_index, cancel))
        .collect()
}

fn simulate_indexed_path(
    params: &SimulationParameters,
    sampler: &AnnualReturnSampler,
    seed: u64,
    path_index: u32,
    cancel: &CancelToken,
) -> Result<SimulationPath> {
    if cancel.is_cancelled() {
        return Err(SimulationError::Cancelled);
    }
    let mut rng = StdRng::seed_from_u64(derive_path_seed(seed, path_index));
    let path = simulate_path(params, sampler, &mut rng);
    ensure_finite(&path)?;
    Ok(path)
}

/// Heavy-tailed user tables can still compound a balance past `f64::MAX`.
fn ensure_finite(path: &SimulationPath) -> Result<()> {
    match path.values.iter().position(|v| !v.is_finite()) {
        Some(year) => Err(SimulationError::NonFiniteBalance { year: year as u32 }),
        None => Ok(()),
    }
}

/// One trajectory. Each year applies the sampled return first, then the
/// contribution (accumulation years) or withdrawal, then clamps at zero.
pub fn simulate_path<R: Rng + ?Sized>(
    params: &SimulationParameters,
    sampler: &AnnualReturnSampler,
    rng: &mut R,
) -> SimulationPath {
    simulate_with_returns(params, || sampler.sample(rng))
}

fn simulate_with_returns(
    params: &SimulationParameters,
    mut next_return: impl FnMut() -> f64,
) -> SimulationPath {
    let horizon = params.horizon_years();
    let mut values = Vec::with_capacity(horizon as usize + 1);
    let mut balance = params.portfolio_value;
    let mut exhausted = false;
    values.push(balance);

    for year in 1..=horizon {
        balance *= 1.0 + next_return() / 100.0;
        if year <= params.years_until_retirement {
            balance += params.annual_contribution;
        } else {
            balance -= params.annual_spending;
        }
        if balance <= 0.0 || exhausted {
            balance = 0.0;
        }
        if params.depletion_policy == DepletionPolicy::Exhausted && balance == 0.0 {
            exhausted = true;
        }
        values.push(balance);
    }

    SimulationPath {
        terminal_value: balance,
        success: balance > 0.0,
        values,
    }
}
