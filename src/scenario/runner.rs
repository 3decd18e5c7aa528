use std::sync::Arc;

use tracing::{error, info, warn};

use crate::client::HandshakeClient;
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::reclaim::ReclamationProbe;
use crate::scenario::{Scenario, ScenarioResult, handshake_raw, handshake_timeout, ws_client};
use crate::shutdown::ShutdownOrchestrator;
use crate::stress::StressDriver;

/// Name accepted on the command line for "every scenario".
pub const ALL: &str = "all";

/// Exit code reported when any scenario failed.
pub const FAILURE_EXIT_CODE: u8 = 2;

/// Results of a run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One entry per executed (or rejected) scenario.
    pub results: Vec<ScenarioResult>,
    /// A fatal error stopped the run early.
    pub aborted: bool,
}

impl RunReport {
    /// Whether every scenario passed and the run was not aborted.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.aborted && self.results.iter().all(ScenarioResult::success)
    }

    /// Process exit code: 0 if everything passed, otherwise 2.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.all_passed() { 0 } else { FAILURE_EXIT_CODE }
    }

    /// `- name: OK|FAIL` lines.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::from("Summary:\n");
        for result in &self.results {
            out.push_str(&result.to_string());
            out.push('\n');
        }
        if self.aborted {
            out.push_str("(run aborted)\n");
        }
        out
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Runs named scenarios one after another.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: Arc<HarnessConfig>,
}

impl ScenarioRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the given scenario names. No names, or `all`, expands to every
    /// scenario in order. Unknown names yield failed results and the run
    /// continues.
    pub async fn run_named<S: AsRef<str>>(&self, names: &[S]) -> RunReport {
        let plan = expand(names);
        let mut report = RunReport::default();
        let total = plan.len();

        for (position, step) in plan.into_iter().enumerate() {
            let scenario = match step {
                Ok(scenario) => scenario,
                Err(name) => {
                    warn!(%name, "unknown scenario");
                    report
                        .results
                        .push(ScenarioResult::fail(name, "unknown scenario"));
                    continue;
                }
            };

            info!("=== {scenario} ===");
            match self.run_isolated(scenario).await {
                Ok(result) => {
                    info!("{result}");
                    report.results.push(result);
                }
                Err(e) if e.is_fatal() => {
                    error!(%scenario, error = %e, "fatal error, aborting run");
                    report
                        .results
                        .push(ScenarioResult::fail(scenario.name(), e.to_string()));
                    report.aborted = true;
                    break;
                }
                Err(e) => {
                    warn!(%scenario, error = %e, "scenario failed");
                    report
                        .results
                        .push(ScenarioResult::fail(scenario.name(), e.to_string()));
                }
            }

            if position + 1 < total && !self.config.scenario_pause.is_zero() {
                tokio::time::sleep(self.config.scenario_pause).await;
            }
        }

        report
    }

    /// Run one scenario inside its own task. A panic in the task becomes a
    /// failed result.
    ///
    /// # Errors
    ///
    /// Whatever the scenario itself returned.
    pub async fn run_isolated(&self, scenario: Scenario) -> Result<ScenarioResult> {
        let config = Arc::clone(&self.config);
        match tokio::spawn(execute(config, scenario)).await {
            Ok(result) => result,
            Err(join) => Ok(ScenarioResult::fail(
                scenario.name(),
                format!("scenario task failed: {join}"),
            )),
        }
    }
}

fn expand<S: AsRef<str>>(names: &[S]) -> Vec<std::result::Result<Scenario, String>> {
    if names.is_empty() {
        return Scenario::ALL.into_iter().map(Ok).collect();
    }
    let mut plan = Vec::new();
    for name in names {
        let name = name.as_ref();
        if name == ALL {
            plan.extend(Scenario::ALL.into_iter().map(Ok));
        } else {
            plan.push(name.parse::<Scenario>().map_err(|_| name.to_string()));
        }
    }
    plan
}

async fn execute(config: Arc<HarnessConfig>, scenario: Scenario) -> Result<ScenarioResult> {
    let client = HandshakeClient::new(config.target.clone(), config.timeouts.clone())
        .with_limits(config.limits.clone());

    match scenario {
        Scenario::HandshakeRaw => handshake_raw(&client, config.verify_accept).await,
        Scenario::HandshakeTimeout => handshake_timeout(&client).await,
        Scenario::WsClient => Ok(ws_client(&client, config.verify_accept).await),
        Scenario::Stress => {
            let report = StressDriver::new(client, config.stress.clone()).run().await;
            Ok(report.into_result())
        }
        Scenario::Reclaim => Ok(ReclamationProbe::new(client, config.reclaim.clone())
            .run()
            .await),
        Scenario::Graceful => {
            ShutdownOrchestrator::new(client, config.shutdown.clone())
                .with_verify_accept(config.verify_accept)
                .run()
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_expand_all() {
        let plan = expand::<&str>(&[]);
        assert_eq!(plan.len(), Scenario::ALL.len());
        assert_eq!(expand(&["all"]), plan);
    }

    #[test]
    fn test_expand_keeps_unknown() {
        let plan = expand(&["stress", "nope"]);
        assert_eq!(plan, vec![Ok(Scenario::Stress), Err("nope".to_string())]);
    }

    #[test]
    fn test_exit_codes() {
        let mut report = RunReport {
            results: vec![ScenarioResult::pass("a")],
            aborted: false,
        };
        assert_eq!(report.exit_code(), 0);

        report.results.push(ScenarioResult::fail("b", "x"));
        assert_eq!(report.exit_code(), FAILURE_EXIT_CODE);

        let aborted = RunReport {
            results: vec![ScenarioResult::pass("a")],
            aborted: true,
        };
        assert_eq!(aborted.exit_code(), FAILURE_EXIT_CODE);
    }

    #[test]
    fn test_summary_lines() {
        let report = RunReport {
            results: vec![
                ScenarioResult::pass("handshake_raw"),
                ScenarioResult::fail("stress", "3 of 16 failed"),
            ],
            aborted: false,
        };
        let summary = report.summary();
        assert!(summary.contains("- handshake_raw: OK\n"));
        assert!(summary.contains("- stress: FAIL (3 of 16 failed)\n"));
    }

    #[tokio::test]
    async fn test_unknown_scenario_fails_without_network() {
        let runner = ScenarioRunner::new(
            HarnessConfig::new().with_scenario_pause(Duration::ZERO),
        );
        let report = runner.run_named(&["bogus"]).await;
        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].success());
        assert_eq!(report.results[0].diagnostic(), Some("unknown scenario"));
        assert_eq!(report.exit_code(), FAILURE_EXIT_CODE);
    }
}
