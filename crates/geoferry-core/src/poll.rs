//! The one shared protocol: a wall-clock-bounded poll with a fixed sleep
//! interval. No backoff, no retry; a remote failure or an out-of-protocol
//! state ends the run.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::{PipelineError, Result};
use geoferry_raster::{OperationStatus, TaskState, TaskStatus};
use geoferry_warehouse::{JobState, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollConfig {
    pub const fn from_secs(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            interval: Duration::from_secs(interval_secs),
        }
    }
}

/// Probe until the remote job reaches a terminal state or the timeout
/// elapses. The elapsed check happens before each probe, matching the
/// remote services' own accounting.
pub async fn wait_until_done<F>(
    step: &'static str,
    config: &PollConfig,
    mut probe: impl FnMut() -> F,
) -> Result<()>
where
    F: Future<Output = Result<PollStatus>>,
{
    let started = Instant::now();

    loop {
        if started.elapsed() > config.timeout {
            return Err(PipelineError::Timeout {
                step,
                seconds: config.timeout.as_secs(),
            });
        }

        match probe().await? {
            PollStatus::Done => return Ok(()),
            PollStatus::Pending => sleep(config.interval).await,
        }
    }
}

/// Map a warehouse job status onto the poll protocol.
pub fn classify_job(status: JobStatus, step: &'static str) -> Result<PollStatus> {
    match status.state {
        JobState::Done => match status.error {
            Some(message) => Err(PipelineError::Remote { step, message }),
            None => Ok(PollStatus::Done),
        },
        JobState::Pending | JobState::Running => Ok(PollStatus::Pending),
        JobState::Other(state) => Err(PipelineError::UnexpectedState { step, state }),
    }
}

/// Map an ingestion operation status onto the poll protocol. An error body
/// only counts once the operation reports itself done.
pub fn classify_operation(status: OperationStatus, step: &'static str) -> Result<PollStatus> {
    if !status.done {
        return Ok(PollStatus::Pending);
    }
    match status.error {
        Some(message) => Err(PipelineError::Remote { step, message }),
        None => Ok(PollStatus::Done),
    }
}

/// Map an export task status onto the poll protocol.
pub fn classify_task(status: TaskStatus, step: &'static str) -> Result<PollStatus> {
    match status.state {
        TaskState::Pending | TaskState::Running => Ok(PollStatus::Pending),
        TaskState::Completed => Ok(PollStatus::Done),
        TaskState::Failed => Err(PipelineError::Remote {
            step,
            message: status
                .error_message
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
        TaskState::Other(state) => Err(PipelineError::UnexpectedState { step, state }),
    }
}
