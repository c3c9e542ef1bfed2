mod config;
mod cost_explorer_client;
mod cost_report;
mod error;
mod job_runner;
mod notification;
mod report_formatter;
mod time_range;

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use chrono::{DateTime, FixedOffset, Utc};
use lambda_runtime::{handler_fn, Context, Error};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};
use crate::cost_explorer_client::CostExplorerSource;
use crate::job_runner::{JobResult, JobRunner};
use crate::notification::WebhookSender;
use crate::report_formatter::ReportFormatter;

type CostReportJob = JobRunner<CostExplorerSource, WebhookSender>;

/// Time kept back from the Lambda deadline for logging and returning the result.
const DEADLINE_MARGIN: Duration = Duration::from_millis(500);

#[derive(Clone, Copy)]
struct Schedule {
    utc_offset: FixedOffset,
    job_timeout: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(config.log_format);

    let sender = WebhookSender::new(config.webhook_timeout).context("building webhook client")?;
    let runner: Arc<CostReportJob> = Arc::new(JobRunner::new(
        CostExplorerSource::new(config.cost_metric),
        ReportFormatter::new(config.webhook_url.clone(), config.top_services),
        sender,
    ));
    let schedule = Schedule {
        utc_offset: config.utc_offset,
        job_timeout: config.job_timeout,
    };
    info!(
        metric = %config.cost_metric,
        top_services = config.top_services,
        utc_offset = %config.utc_offset,
        "cost notifier ready"
    );

    lambda_runtime::run(handler_fn(move |event: Value, context: Context| {
        let runner = Arc::clone(&runner);
        async move { report_handler(&runner, schedule, event, context).await }
    }))
    .await
    .map_err(|e| anyhow!(e))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cost_notifier=info"));
    match format {
        // CloudWatch adds the ingestion time itself.
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init(),
    }
}

/// Always answers `Ok`: a failed run is reported in the result instead of failing the
/// invocation, which would make Lambda re-deliver the event and send twice.
async fn report_handler(
    runner: &CostReportJob,
    schedule: Schedule,
    event: Value,
    context: Context,
) -> Result<JobResult, Error> {
    let now = Utc::now();
    let instant = trigger_instant(&event).unwrap_or(now);
    let reference_date = time_range::reference_date(instant, schedule.utc_offset);
    let deadline = effective_deadline(schedule.job_timeout, context.deadline, now);
    info!(
        request_id = %context.request_id,
        %reference_date,
        deadline_ms = deadline.as_millis() as u64,
        "invocation started"
    );

    Ok(runner.run(reference_date, deadline).await)
}

/// Scheduled EventBridge events carry the scheduled instant in `time`.
fn trigger_instant(event: &Value) -> Option<DateTime<Utc>> {
    event
        .get("time")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|instant| instant.with_timezone(&Utc))
}

fn effective_deadline(configured: Duration, context_deadline_ms: u64, now: DateTime<Utc>) -> Duration {
    if context_deadline_ms == 0 {
        return configured;
    }
    let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let remaining = Duration::from_millis(context_deadline_ms.saturating_sub(now_ms))
        .checked_sub(DEADLINE_MARGIN)
        .unwrap_or_default();
    configured.min(remaining)
}
