use thiserror::Error;

use crate::quantity::power::Kilowatts;

/// Fatal planning outcomes.
///
/// None of these are retried: the caller should treat any of them as «no action taken».
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("insufficient battery data: {0}")]
    InsufficientData(String),

    #[error("no generation forecast is available from any source")]
    NoForecast,

    #[error("no valid consumption history and no consumption override")]
    NoConsumptionData,

    #[error("charge power limit {0} is too low to charge the battery")]
    InvalidCurrent(Kilowatts),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid charge window: {0}")]
    WindowConflict(String),
}
