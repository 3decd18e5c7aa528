//! Worker reclamation probe.
//!
//! Fills the server's worker slots with sequential sessions, releases them and
//! checks that a fresh client is admitted again after a grace period.

use tracing::{info, warn};

use crate::client::{ClientSession, HandshakeClient};
use crate::config::ReclaimConfig;
use crate::scenario::{Scenario, ScenarioResult};

/// What the probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Per-attempt handshake success, in attempt order.
    pub attempts: Vec<bool>,
    /// Status line of the final probe, if any response arrived.
    pub probe_status: Option<String>,
    /// Whether the final probe was upgraded.
    pub reclaimed: bool,
    /// Error that prevented the final probe from completing.
    pub probe_error: Option<String>,
}

impl ReclaimReport {
    /// Saturation attempts that upgraded.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.attempts.iter().filter(|ok| **ok).count()
    }

    /// Collapse into the scenario verdict.
    #[must_use]
    pub fn into_result(self) -> ScenarioResult {
        let probe = match (&self.probe_status, &self.probe_error) {
            (_, Some(error)) => error.clone(),
            (Some(status), None) => status.clone(),
            (None, None) => "(no response)".to_string(),
        };
        ScenarioResult::from_check(
            Scenario::Reclaim.name(),
            self.reclaimed,
            format!("{}/{} opened, probe: {probe}", self.opened(), self.attempts.len()),
        )
    }
}

/// Saturate, release, probe.
#[derive(Debug)]
pub struct ReclamationProbe {
    client: HandshakeClient,
    config: ReclaimConfig,
}

impl ReclamationProbe {
    /// Create a probe.
    #[must_use]
    pub fn new(client: HandshakeClient, config: ReclaimConfig) -> Self {
        Self { client, config }
    }

    /// Run the probe and report success iff the final handshake upgraded.
    pub async fn run(&self) -> ScenarioResult {
        self.observe().await.into_result()
    }

    /// Run the probe and return the raw observations.
    ///
    /// Saturation failures are logged and do not abort the probe.
    pub async fn observe(&self) -> ReclaimReport {
        let mut held: Vec<ClientSession> = Vec::with_capacity(self.config.saturating_count);
        let mut attempts = Vec::with_capacity(self.config.saturating_count);

        for index in 0..self.config.saturating_count {
            match self.client.connect_and_handshake(index).await {
                Ok(session) if session.is_upgraded() => {
                    attempts.push(true);
                    held.push(session);
                }
                Ok(mut session) => {
                    warn!(
                        attempt = index,
                        status = session.response().status_line().as_deref().unwrap_or("-"),
                        "saturation attempt not upgraded"
                    );
                    session.close().await;
                    attempts.push(false);
                }
                Err(e) => {
                    warn!(attempt = index, error = %e, "saturation attempt failed");
                    attempts.push(false);
                }
            }
        }

        info!(opened = held.len(), attempted = attempts.len(), "closing saturating sessions");
        for session in &mut held {
            session.close().await;
        }
        drop(held);

        tokio::time::sleep(self.config.grace_period).await;

        let probe_index = self.config.saturating_count;
        match self.client.connect_and_handshake(probe_index).await {
            Ok(mut session) => {
                let reclaimed = session.is_upgraded();
                let probe_status = session.response().status_line();
                info!(reclaimed, status = probe_status.as_deref().unwrap_or("-"), "probe answered");
                session.close().await;
                ReclaimReport {
                    attempts,
                    probe_status,
                    reclaimed,
                    probe_error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "probe failed");
                ReclaimReport {
                    attempts,
                    probe_status: None,
                    reclaimed: false,
                    probe_error: Some(e.to_string()),
                }
            }
        }
    }
}
