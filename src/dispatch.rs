use crate::cooldown::{CooldownDecision, CooldownLedger, Identity};
use crate::error::{Result, VitalcastError};
use crate::events::{Broadcaster, OverlayEvent};
use crate::health::{HealthState, HealthStateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of a command dispatch, as returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
    Cooldown,
    Error,
}

impl DispatchOutcome {
    fn success<S: Into<String>>(message: S) -> Self {
        Self {
            status: DispatchStatus::Success,
            message: message.into(),
        }
    }

    fn cooldown<S: Into<String>>(message: S) -> Self {
        Self {
            status: DispatchStatus::Cooldown,
            message: message.into(),
        }
    }

    fn error() -> Self {
        Self {
            status: DispatchStatus::Error,
            message: "An error occurred while processing your command.".to_string(),
        }
    }
}

/// Orchestrates a single command request: health-state override, cooldown
/// check, timer update and broadcast.
///
/// Per identity the flow is a small state machine: no record, then
/// cooldown-active after each granted command, then eligible once the timer
/// elapses. A CRITICAL health state bypasses the machine entirely without
/// advancing it. Every failure is caught at this boundary and mapped to an
/// `error` outcome; internals are logged, never exposed.
pub struct CommandDispatcher {
    health: Arc<HealthStateStore>,
    ledger: CooldownLedger,
    broadcaster: Arc<dyn Broadcaster>,
    op_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        health: Arc<HealthStateStore>,
        ledger: CooldownLedger,
        broadcaster: Arc<dyn Broadcaster>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            health,
            ledger,
            broadcaster,
            op_timeout,
        }
    }

    /// Dispatch a command on behalf of a user
    pub async fn dispatch(&self, command: &str, user_name: &str) -> DispatchOutcome {
        self.dispatch_at(command, user_name, Utc::now()).await
    }

    /// Dispatch with an explicit clock, the testable entry point
    pub async fn dispatch_at(
        &self,
        command: &str,
        user_name: &str,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let request_id = Uuid::new_v4();

        let command = command.trim();
        if command.is_empty() {
            debug!(%request_id, "Rejected dispatch with empty command");
            return DispatchOutcome::error();
        }
        let Some(identity) = Identity::parse(user_name) else {
            debug!(%request_id, "Rejected dispatch with blank user name");
            return DispatchOutcome::error();
        };

        match self.try_dispatch(request_id, command, &identity, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    %request_id,
                    identity = identity.key(),
                    "Command dispatch failed: {}", e
                );
                DispatchOutcome::error()
            }
        }
    }

    async fn try_dispatch(
        &self,
        request_id: Uuid,
        command: &str,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let health_state = self.health.get();

        // CRITICAL overrides the cooldown gate entirely, and must not touch
        // the ledger: the user's own timer keeps whatever value it had.
        if health_state == HealthState::Critical {
            info!(
                %request_id,
                identity = identity.key(),
                command,
                "Health is CRITICAL, bypassing cooldown"
            );
            self.publish_command(command).await;
            return Ok(DispatchOutcome::success(format!(
                "Command {} executed successfully due to critical health.",
                command
            )));
        }

        // Check-and-stamp in one step; stamping before the broadcast means a
        // crash after publish can never leave the timer unset.
        let decision = timeout(
            self.op_timeout,
            self.ledger.begin_request(identity, now),
        )
        .await
        .map_err(|_| VitalcastError::Timeout {
            operation: "cooldown check",
        })??;

        match decision {
            CooldownDecision::OnCooldown { retry_after, .. } => {
                info!(
                    %request_id,
                    identity = identity.key(),
                    retry_after_ms = retry_after.num_milliseconds(),
                    "Command rejected: user on cooldown"
                );
                Ok(DispatchOutcome::cooldown(
                    "You are on cooldown. Please wait before issuing another command.",
                ))
            }
            CooldownDecision::Eligible(record) => {
                info!(
                    %request_id,
                    identity = identity.key(),
                    user_id = record.user_id,
                    command,
                    "Command accepted"
                );
                self.publish_command(command).await;
                Ok(DispatchOutcome::success(format!(
                    "Command {} executed successfully.",
                    command
                )))
            }
        }
    }

    /// Best-effort fan-out: a failed or slow broadcast is logged, but the
    /// command still counts as issued.
    async fn publish_command(&self, command: &str) {
        let event = OverlayEvent::CommandIssued {
            command: command.to_string(),
        };
        match timeout(self.op_timeout, self.broadcaster.publish(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Command broadcast failed: {}", e),
            Err(_) => warn!("Command broadcast timed out"),
        }
    }
}
