use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{error, info, info_span, Instrument};

use crate::cost_explorer_client::CostSource;
use crate::error::{CostNotifierError, ErrorKind};
use crate::notification::NotificationChannel;
use crate::report_formatter::ReportFormatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Fetching,
    Formatting,
    Sending,
    Done,
    Failed,
}

impl JobState {
    fn can_enter(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Done, _) | (JobState::Failed, _) => false,
            (_, JobState::Failed) => true,
            (JobState::Idle, JobState::Fetching)
            | (JobState::Fetching, JobState::Formatting)
            | (JobState::Formatting, JobState::Sending)
            | (JobState::Sending, JobState::Done) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub failed_step: Option<JobState>,
    pub reference_date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub states: Vec<JobState>,
}

// Outlives the step future, so a timed-out run still knows its step.
struct StateTrail {
    states: Mutex<Vec<JobState>>,
}

impl StateTrail {
    fn new() -> Self {
        StateTrail {
            states: Mutex::new(vec![JobState::Idle]),
        }
    }

    fn enter(&self, next: JobState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let current = states.last().copied().unwrap_or(JobState::Idle);
        debug_assert!(
            current.can_enter(next),
            "illegal transition {:?} -> {:?}",
            current,
            next
        );
        states.push(next);
    }

    fn current(&self) -> JobState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(JobState::Idle)
    }

    fn into_states(self) -> Vec<JobState> {
        self.states
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct JobRunner<S, N> {
    source: S,
    formatter: ReportFormatter,
    channel: N,
}

impl<S, N> JobRunner<S, N>
where
    S: CostSource,
    N: NotificationChannel,
{
    pub fn new(source: S, formatter: ReportFormatter, channel: N) -> Self {
        JobRunner {
            source,
            formatter,
            channel,
        }
    }

    pub async fn run(&self, reference_date: NaiveDate, deadline: Duration) -> JobResult {
        let trail = StateTrail::new();
        let span = info_span!("cost_report_job", %reference_date);

        let outcome = match timeout(deadline, self.steps(reference_date, &trail))
            .instrument(span.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(CostNotifierError::Timeout(deadline)),
        };

        let _entered = span.enter();
        let (error_kind, failed_step) = match outcome {
            Ok(()) => {
                trail.enter(JobState::Done);
                (None, None)
            }
            Err(error) => {
                let step = trail.current();
                trail.enter(JobState::Failed);
                error!(error_kind = ?error.kind(), step = ?step, %error, "job failed");
                (Some(error.kind()), Some(step))
            }
        };

        let result = JobResult {
            success: error_kind.is_none(),
            error_kind,
            failed_step,
            reference_date,
            timestamp: Utc::now(),
            states: trail.into_states(),
        };
        info!(
            success = result.success,
            error_kind = ?result.error_kind,
            failed_step = ?result.failed_step,
            timestamp = %result.timestamp,
            "job finished"
        );
        result
    }

    async fn steps(
        &self,
        reference_date: NaiveDate,
        trail: &StateTrail,
    ) -> Result<(), CostNotifierError> {
        trail.enter(JobState::Fetching);
        let report = self.source.fetch(reference_date).await?;

        trail.enter(JobState::Formatting);
        let message = self.formatter.format(&report)?;

        trail.enter(JobState::Sending);
        self.channel.send(&message).await
    }
}
