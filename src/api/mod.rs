use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::core::{
    Allocation, AssetAssumption, AssetTable, CancelToken, ConfidenceBand, CorrelationMatrix,
    DepletionPolicy, SimulationError, SimulationParameters, SimulationPath, SimulationResult,
    TerminalPercentiles, VolatilityModel, run_simulation_with_cancel,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliDepletionPolicy {
    Recoverable,
    Exhausted,
}

impl From<CliDepletionPolicy> for DepletionPolicy {
    fn from(value: CliDepletionPolicy) -> Self {
        match value {
            CliDepletionPolicy::Recoverable => DepletionPolicy::Recoverable,
            CliDepletionPolicy::Exhausted => DepletionPolicy::Exhausted,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiDepletionPolicy {
    #[serde(alias = "recover")]
    Recoverable,
    #[serde(alias = "permanent", alias = "exhaust")]
    Exhausted,
}

impl From<ApiDepletionPolicy> for CliDepletionPolicy {
    fn from(value: ApiDepletionPolicy) -> Self {
        match value {
            ApiDepletionPolicy::Recoverable => CliDepletionPolicy::Recoverable,
            ApiDepletionPolicy::Exhausted => CliDepletionPolicy::Exhausted,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    portfolio_value: Option<f64>,
    annual_contribution: Option<f64>,
    years_until_retirement: Option<u32>,
    years_in_retirement: Option<u32>,
    annual_spending: Option<f64>,
    #[serde(alias = "simulations")]
    num_simulations: Option<u32>,
    seed: Option<u64>,
    depletion_policy: Option<ApiDepletionPolicy>,
    include_paths: Option<bool>,
    allocation: Option<Allocation>,
    stocks: Option<f64>,
    bonds: Option<f64>,
    cash: Option<f64>,
    gold: Option<f64>,
    assets: Option<Vec<AssetAssumption>>,
    correlations: Option<Vec<Vec<f64>>>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nestegg",
    bin_name = "nestegg simulate",
    about = "Monte Carlo retirement projection (blended asset returns, accumulation then withdrawal)"
)]
struct Cli {
    #[arg(long, default_value_t = 500_000.0)]
    portfolio_value: f64,
    #[arg(long, default_value_t = 20_000.0)]
    annual_contribution: f64,
    #[arg(long, default_value_t = 10)]
    years_until_retirement: u32,
    #[arg(long, default_value_t = 30)]
    years_in_retirement: u32,
    #[arg(long, default_value_t = 50_000.0)]
    annual_spending: f64,
    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(long, help = "Fixed seed for a reproducible run; random when omitted")]
    seed: Option<u64>,
    #[arg(
        long = "allocation",
        value_name = "NAME=WEIGHT",
        value_parser = parse_weight,
        help = "Asset weight, repeatable; defaults to stocks=60 bonds=25 cash=5 gold=10"
    )]
    allocation: Vec<(String, f64)>,
    #[arg(
        long = "asset",
        value_name = "NAME:MEAN:VOL",
        value_parser = parse_asset,
        help = "Replace the asset table, repeatable; mean and volatility in percent"
    )]
    assets: Vec<AssetAssumption>,
    #[arg(long, value_enum, default_value_t = CliDepletionPolicy::Recoverable)]
    depletion_policy: CliDepletionPolicy,
    #[arg(long, help = "Omit per-path trajectories from the output")]
    no_paths: bool,
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
    let (name, weight) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=WEIGHT, got '{raw}'"))?;
    let weight = weight
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid weight in '{raw}': {e}"))?;
    Ok((name.trim().to_string(), weight))
}

fn parse_asset(raw: &str) -> Result<AssetAssumption, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [name, mean, vol] = parts.as_slice() else {
        return Err(format!("expected NAME:MEAN:VOL, got '{raw}'"));
    };
    let mean = mean
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid mean in '{raw}': {e}"))?;
    let vol = vol
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid volatility in '{raw}': {e}"))?;
    Ok(AssetAssumption::new(name.trim(), mean, vol))
}

#[derive(Debug)]
struct ApiRequest {
    params: SimulationParameters,
    table: AssetTable,
    allocation: Allocation,
    volatility_model: VolatilityModel,
    include_paths: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    blended_return: f64,
    blended_volatility: f64,
    seed: u64,
    num_simulations: u32,
    years_until_retirement: u32,
    years_in_retirement: u32,
    success_count: u32,
    success_rate: f64,
    mean_terminal_value: f64,
    percentiles: TerminalPercentiles,
    confidence_bands: Vec<ConfidenceBand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paths: Option<Vec<SimulationPath>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Cancels the attached run when the owning request future is dropped.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn default_allocation() -> Allocation {
    [("stocks", 60.0), ("bonds", 25.0), ("cash", 5.0), ("gold", 10.0)]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect()
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    let custom_table = !cli.assets.is_empty();
    let table = if custom_table {
        AssetTable::new(cli.assets)
    } else {
        AssetTable::default()
    };

    let mut allocation = Allocation::new();
    for (name, weight) in cli.allocation {
        if allocation.insert(name.clone(), weight).is_some() {
            return Err(format!("--allocation lists '{name}' more than once"));
        }
    }
    if allocation.is_empty() && !custom_table {
        allocation = default_allocation();
    }

    Ok(ApiRequest {
        params: SimulationParameters {
            portfolio_value: cli.portfolio_value,
            annual_contribution: cli.annual_contribution,
            years_until_retirement: cli.years_until_retirement,
            years_in_retirement: cli.years_in_retirement,
            annual_spending: cli.annual_spending,
            num_simulations: cli.simulations,
            seed: cli.seed,
            depletion_policy: cli.depletion_policy.into(),
        },
        table,
        allocation,
        volatility_model: VolatilityModel::Uncorrelated,
        include_paths: !cli.no_paths,
    })
}

fn execute_request(
    request: &ApiRequest,
    cancel: &CancelToken,
) -> Result<SimulateResponse, SimulationError> {
    let result = run_simulation_with_cancel(
        &request.params,
        &request.table,
        &request.allocation,
        &request.volatility_model,
        cancel,
    )?;
    Ok(build_simulate_response(
        &request.params,
        result,
        request.include_paths,
    ))
}

fn build_simulate_response(
    params: &SimulationParameters,
    result: SimulationResult,
    include_paths: bool,
) -> SimulateResponse {
    let stats = result.statistics;
    SimulateResponse {
        blended_return: result.blended.expected_return,
        blended_volatility: result.blended.volatility,
        seed: result.seed,
        num_simulations: params.num_simulations,
        years_until_retirement: params.years_until_retirement,
        years_in_retirement: params.years_in_retirement,
        success_count: stats.success_count,
        success_rate: stats.success_rate,
        mean_terminal_value: stats.mean_terminal_value,
        percentiles: stats.percentiles,
        confidence_bands: stats.confidence_bands,
        paths: include_paths.then_some(result.paths),
    }
}

/// Runs the `simulate` subcommand and prints the JSON response to stdout.
pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let request = build_request(cli)?;
    let response =
        execute_request(&request, &CancelToken::new()).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&response)
        .map_err(|e| format!("failed to encode response: {e}"))?;
    println!("{json}");
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/assets", get(assets_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("projection API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn assets_handler() -> Response {
    json_response(StatusCode::OK, AssetTable::default())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(%msg, "rejected simulation request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let guard = CancelOnDrop(CancelToken::new());
    let cancel = guard.0.clone();
    let outcome = tokio::task::spawn_blocking(move || execute_request(&request, &cancel)).await;
    drop(guard);

    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(err)) => {
            warn!(error = %err, "simulation rejected");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err) => {
            error!(error = %err, "simulation worker failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.portfolio_value {
        cli.portfolio_value = v;
    }
    if let Some(v) = payload.annual_contribution {
        cli.annual_contribution = v;
    }
    if let Some(v) = payload.years_until_retirement {
        cli.years_until_retirement = v;
    }
    if let Some(v) = payload.years_in_retirement {
        cli.years_in_retirement = v;
    }
    if let Some(v) = payload.annual_spending {
        cli.annual_spending = v;
    }
    if let Some(v) = payload.num_simulations {
        cli.simulations = v;
    }
    if payload.seed.is_some() {
        cli.seed = payload.seed;
    }
    if let Some(v) = payload.depletion_policy {
        cli.depletion_policy = v.into();
    }
    if let Some(v) = payload.include_paths {
        cli.no_paths = !v;
    }
    if let Some(assets) = payload.assets {
        cli.assets = assets;
    }

    let explicit_allocation = payload.allocation.is_some();
    let mut allocation: Vec<(String, f64)> = payload
        .allocation
        .map(|map| map.into_iter().collect())
        .unwrap_or_default();
    let shorthand = [
        ("stocks", payload.stocks),
        ("bonds", payload.bonds),
        ("cash", payload.cash),
        ("gold", payload.gold),
    ];
    for (name, weight) in shorthand {
        if let Some(weight) = weight {
            allocation.retain(|(existing, _)| existing != name);
            allocation.push((name.to_string(), weight));
        }
    }
    let allocation_was_empty = allocation.is_empty();
    cli.allocation = allocation;

    let mut request = build_request(cli)?;
    if explicit_allocation && allocation_was_empty {
        // An explicitly empty mapping is a zero-sum allocation, not a request
        // for the default mix.
        request.allocation = Allocation::new();
    }
    if let Some(rows) = payload.correlations {
        request.volatility_model = VolatilityModel::Correlated(CorrelationMatrix::new(rows));
    }

    Ok(request)
}

fn default_cli_for_api() -> Cli {
    Cli {
        portfolio_value: 500_000.0,
        annual_contribution: 20_000.0,
        years_until_retirement: 10,
        years_in_retirement: 30,
        annual_spending: 50_000.0,
        simulations: 1_000,
        seed: None,
        allocation: Vec::new(),
        assets: Vec::new(),
        depletion_policy: CliDepletionPolicy::Recoverable,
        no_paths: false,
    }
}
