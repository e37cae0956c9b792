//! Deadline enforcement around a single transcode.
//!
//! The supervisor starts the transcode, waits for it up to the deadline,
//! and on overrun sends a termination request. If the process is still
//! alive after the grace period it is killed outright.

use std::time::Duration;

use tracing::{debug, warn};

use mcomp_media::{TranscodeRequest, Transcoder};

/// Lifecycle of one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running,
    Completed,
    DeadlineExceeded,
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisedOutcome {
    /// Exited successfully before the deadline
    Completed,
    /// Failed to start or exited with an error before the deadline
    Failed(String),
    /// Stopped after the deadline; `forced_kill` when termination was ignored
    TimedOut { forced_kill: bool },
}

/// Runs a transcode under a deadline.
#[derive(Debug)]
pub struct TimeoutSupervisor {
    deadline: Duration,
    grace: Duration,
    state: SupervisorState,
}

impl TimeoutSupervisor {
    pub fn new(deadline: Duration, grace: Duration) -> Self {
        Self {
            deadline,
            grace,
            state: SupervisorState::NotStarted,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Start `request` on `transcoder` and wait for it under the deadline.
    pub async fn run(
        &mut self,
        transcoder: &dyn Transcoder,
        request: &TranscodeRequest,
    ) -> SupervisedOutcome {
        let mut process = match transcoder.start(request).await {
            Ok(process) => process,
            Err(e) => {
                self.state = SupervisorState::Completed;
                return SupervisedOutcome::Failed(format!("failed to start: {}", e));
            }
        };
        self.state = SupervisorState::Running;

        match tokio::time::timeout(self.deadline, process.wait()).await {
            Ok(Ok(())) => {
                self.state = SupervisorState::Completed;
                return SupervisedOutcome::Completed;
            }
            Ok(Err(e)) => {
                self.state = SupervisorState::Completed;
                return SupervisedOutcome::Failed(e.to_string());
            }
            Err(_) => {
                self.state = SupervisorState::DeadlineExceeded;
            }
        }

        warn!(
            input = %request.input.display(),
            deadline_secs = self.deadline.as_secs_f64(),
            "Transcode exceeded deadline, terminating"
        );

        if let Err(e) = process.terminate() {
            warn!("Termination request failed: {}", e);
        } else {
            match tokio::time::timeout(self.grace, process.wait()).await {
                Ok(_) => {
                    debug!("Transcode stopped after termination request");
                    return SupervisedOutcome::TimedOut { forced_kill: false };
                }
                Err(_) => {
                    warn!(
                        grace_secs = self.grace.as_secs_f64(),
                        "Transcode ignored termination, killing"
                    );
                }
            }
        }

        if let Err(e) = process.kill().await {
            warn!("Forced kill failed: {}", e);
        }
        SupervisedOutcome::TimedOut { forced_kill: true }
    }
}
