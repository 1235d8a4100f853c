use thiserror::Error;

/// Errors raised by the projection engine. All of them are input-contract
/// violations or an explicit cancellation; the engine performs no I/O.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("{field} {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: String,
    },

    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("invalid asset table: {0}")]
    InvalidAssetTable(String),

    #[error("invalid correlation matrix: {0}")]
    InvalidCorrelation(String),

    #[error("invalid return distribution (mean {mean}, std dev {std_dev})")]
    InvalidDistribution { mean: f64, std_dev: f64 },

    #[error("balance left the finite range in year {year}")]
    NonFiniteBalance { year: u32 },

    #[error("simulation cancelled")]
    Cancelled,
}

impl SimulationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
