use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::cost_explorer_client::CostMetric;
use crate::notification::WebhookUrl;

pub const WEBHOOK_URL_KEY: &str = "NOTIFICATION_WEBHOOK_URL";
const JOB_TIMEOUT_KEY: &str = "JOB_TIMEOUT_SECS";
const WEBHOOK_TIMEOUT_KEY: &str = "WEBHOOK_TIMEOUT_SECS";
const UTC_OFFSET_KEY: &str = "REPORT_UTC_OFFSET_HOURS";
const COST_METRIC_KEY: &str = "COST_METRIC";
const TOP_SERVICES_KEY: &str = "TOP_SERVICES";
const LOG_FORMAT_KEY: &str = "LOG_FORMAT";

const DEFAULT_JOB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TOP_SERVICES: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub webhook_url: WebhookUrl,
    pub job_timeout: Duration,
    pub webhook_timeout: Duration,
    pub utc_offset: FixedOffset,
    pub cost_metric: CostMetric,
    pub top_services: usize,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let raw_url = get(WEBHOOK_URL_KEY).ok_or(ConfigError::Missing(WEBHOOK_URL_KEY))?;
        let webhook_url = WebhookUrl::parse(&raw_url).map_err(|reason| ConfigError::Invalid {
            key: WEBHOOK_URL_KEY,
            reason,
        })?;

        let job_timeout = Duration::from_secs(parse_or(
            get(JOB_TIMEOUT_KEY),
            JOB_TIMEOUT_KEY,
            DEFAULT_JOB_TIMEOUT_SECS,
        )?);
        let webhook_timeout = Duration::from_secs(parse_or(
            get(WEBHOOK_TIMEOUT_KEY),
            WEBHOOK_TIMEOUT_KEY,
            DEFAULT_WEBHOOK_TIMEOUT_SECS,
        )?);
        if job_timeout.as_secs() == 0 || webhook_timeout.as_secs() == 0 {
            return Err(ConfigError::Invalid {
                key: if job_timeout.as_secs() == 0 {
                    JOB_TIMEOUT_KEY
                } else {
                    WEBHOOK_TIMEOUT_KEY
                },
                reason: "must be at least one second".to_string(),
            });
        }

        // West of UTC the local date can fall before the UTC date, and Cost Explorer
        // rejects forecasts that start in the past.
        let offset_hours: i32 = parse_or(get(UTC_OFFSET_KEY), UTC_OFFSET_KEY, 0)?;
        let utc_offset = Some(offset_hours)
            .filter(|hours| (0..=14).contains(hours))
            .and_then(|hours| FixedOffset::east_opt(hours * 3600))
            .ok_or_else(|| ConfigError::Invalid {
                key: UTC_OFFSET_KEY,
                reason: format!("{} is outside 0..=14", offset_hours),
            })?;

        let cost_metric = match get(COST_METRIC_KEY) {
            Some(raw) => CostMetric::from_str(raw.trim()).map_err(|reason| ConfigError::Invalid {
                key: COST_METRIC_KEY,
                reason,
            })?,
            None => CostMetric::default(),
        };

        let top_services = parse_or(get(TOP_SERVICES_KEY), TOP_SERVICES_KEY, DEFAULT_TOP_SERVICES)?;

        let log_format = match get(LOG_FORMAT_KEY).as_deref().map(str::trim) {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: LOG_FORMAT_KEY,
                    reason: format!("expected json or pretty, got {:?}", other),
                })
            }
        };

        Ok(Config {
            webhook_url,
            job_timeout,
            webhook_timeout,
            utc_offset,
            cost_metric,
            top_services,
            log_format,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
