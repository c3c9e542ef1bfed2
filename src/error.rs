use std::time::Duration;

use rusoto_ce::{GetCostAndUsageError, GetCostForecastError};
use rusoto_core::RusotoError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CostNotifierError {
    #[error("cost data source unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("no cost data for the period: {0}")]
    DataUnavailable(String),
    #[error("invalid cost report: {0}")]
    InvalidReport(String),
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("job did not finish within {0:?}")]
    Timeout(Duration),
}

/// Coarse classification of a failure, as it appears in logs and in `JobResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UpstreamUnavailable,
    DataUnavailable,
    InvalidReport,
    DeliveryFailed,
    Timeout,
}

impl CostNotifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CostNotifierError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            CostNotifierError::DataUnavailable(_) => ErrorKind::DataUnavailable,
            CostNotifierError::InvalidReport(_) => ErrorKind::InvalidReport,
            CostNotifierError::DeliveryFailed(_) => ErrorKind::DeliveryFailed,
            CostNotifierError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<RusotoError<GetCostAndUsageError>> for CostNotifierError {
    fn from(e: RusotoError<GetCostAndUsageError>) -> CostNotifierError {
        match e {
            RusotoError::Service(GetCostAndUsageError::DataUnavailable(message)) => {
                CostNotifierError::DataUnavailable(message)
            }
            other => CostNotifierError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<RusotoError<GetCostForecastError>> for CostNotifierError {
    fn from(e: RusotoError<GetCostForecastError>) -> CostNotifierError {
        match e {
            RusotoError::Service(GetCostForecastError::DataUnavailable(message)) => {
                CostNotifierError::DataUnavailable(message)
            }
            other => CostNotifierError::UpstreamUnavailable(other.to_string()),
        }
    }
}

// The request URL is the webhook secret, so it is stripped before the message is kept.
impl From<reqwest::Error> for CostNotifierError {
    fn from(e: reqwest::Error) -> CostNotifierError {
        CostNotifierError::DeliveryFailed(e.without_url().to_string())
    }
}
