//! Concurrent stress driver.
//!
//! Opens many sessions at once, keeps the upgraded ones busy with keepalive
//! frames for a while, then closes them all. Each client runs in its own task;
//! the driver only owns the registry of open sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::{HandshakeClient, SharedSession};
use crate::config::StressConfig;
use crate::scenario::{Scenario, ScenarioResult};

/// Payload of a keepalive frame.
pub const KEEPALIVE_PAYLOAD: &[u8] = b"\n";

/// Sockets opened by stress clients, closed together by the driver.
#[derive(Debug, Default)]
pub struct SocketRegistry {
    sessions: Mutex<Vec<SharedSession>>,
}

impl SocketRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session until [`close_all`](Self::close_all).
    pub async fn register(&self, session: SharedSession) {
        self.sessions.lock().await.push(session);
    }

    /// Number of sessions currently tracked.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Close and forget every tracked session.
    ///
    /// Returns how many sockets this call closed. A second call closes nothing.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<SharedSession> = std::mem::take(&mut *self.sessions.lock().await);
        let mut closed = 0;
        for session in drained {
            if session.lock().await.close().await {
                closed += 1;
            }
        }
        closed
    }
}

/// Outcome of a stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressReport {
    /// Per-client results, ordered by client index.
    pub outcomes: Vec<ScenarioResult>,
    /// Sockets registered by upgraded clients.
    pub opened: usize,
    /// Sockets closed by the driver.
    pub closed: usize,
}

impl StressReport {
    /// Clients that completed the handshake.
    #[must_use]
    pub fn upgraded(&self) -> usize {
        self.outcomes.iter().filter(|r| r.success()).count()
    }

    /// Collapse into the scenario verdict: success when every client upgraded.
    #[must_use]
    pub fn into_result(self) -> ScenarioResult {
        let total = self.outcomes.len();
        let upgraded = self.upgraded();
        let mut diagnostic = format!(
            "{upgraded}/{total} upgraded, {} opened, {} closed",
            self.opened, self.closed
        );

        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter(|r| !r.success())
            .map(|r| match r.diagnostic() {
                Some(why) => format!("{} ({why})", r.name()),
                None => r.name().to_string(),
            })
            .collect();
        if !failed.is_empty() {
            diagnostic.push_str("; failed: ");
            diagnostic.push_str(&failed.join(", "));
        }

        ScenarioResult::from_check(Scenario::Stress.name(), upgraded == total, diagnostic)
    }
}

/// Drives `client_count` concurrent sessions against one target.
#[derive(Debug)]
pub struct StressDriver {
    client: HandshakeClient,
    config: StressConfig,
    registry: Arc<SocketRegistry>,
}

impl StressDriver {
    /// Create a driver.
    #[must_use]
    pub fn new(client: HandshakeClient, config: StressConfig) -> Self {
        Self {
            client,
            config,
            registry: Arc::new(SocketRegistry::new()),
        }
    }

    /// Registry of sockets opened by this driver.
    #[must_use]
    pub fn registry(&self) -> &Arc<SocketRegistry> {
        &self.registry
    }

    /// Run the stress scenario to completion.
    ///
    /// Returns after every client task has finished, the observation window
    /// has passed and every registered socket has been closed.
    pub async fn run(&self) -> StressReport {
        let count = self.config.client_count;
        let mut tasks = JoinSet::new();

        for index in 0..count {
            if index > 0 && !self.config.stagger_interval.is_zero() {
                tokio::time::sleep(self.config.stagger_interval).await;
            }
            tasks.spawn(run_client(
                index,
                self.client.clone(),
                Arc::clone(&self.registry),
                self.config.keepalive_rounds,
                self.config.keepalive_interval,
            ));
        }

        let mut slots: Vec<Option<ScenarioResult>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => warn!(error = %e, "stress client task failed"),
            }
        }
        let outcomes: Vec<ScenarioResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| ScenarioResult::fail(client_name(index), "client task aborted"))
            })
            .collect();

        let opened = self.registry.len().await;
        info!(clients = count, opened, "all clients joined");

        tokio::time::sleep(self.config.observation_window).await;

        let closed = self.registry.close_all().await;
        info!(closed, "closed stress sockets");

        StressReport {
            outcomes,
            opened,
            closed,
        }
    }
}

fn client_name(index: usize) -> String {
    format!("client-{index}")
}

async fn run_client(
    index: usize,
    client: HandshakeClient,
    registry: Arc<SocketRegistry>,
    rounds: usize,
    interval: Duration,
) -> (usize, ScenarioResult) {
    let name = client_name(index);
    let mut session = match client.connect_and_handshake(index).await {
        Ok(session) => session,
        Err(e) => {
            warn!(client = index, error = %e, "handshake failed");
            return (index, ScenarioResult::fail(name, e.to_string()));
        }
    };

    if !session.is_upgraded() {
        let status = session
            .response()
            .status_line()
            .unwrap_or_else(|| "(no response)".into());
        session.close().await;
        return (index, ScenarioResult::fail(name, status));
    }

    let shared = session.into_shared();
    registry.register(Arc::clone(&shared)).await;
    // Detached: stops on its own once the registry closes the socket.
    tokio::spawn(keepalive(shared, rounds, interval, client.timeouts().frame));

    (index, ScenarioResult::pass(name))
}

async fn keepalive(session: SharedSession, rounds: usize, interval: Duration, limit: Duration) {
    for round in 0..rounds {
        {
            let mut session = session.lock().await;
            if session.is_closed() {
                return;
            }
            if let Err(e) = session.send_text(KEEPALIVE_PAYLOAD, limit).await {
                debug!(client = session.index(), round, error = %e, "keepalive stopped");
                return;
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientSession;
    use crate::config::Limits;
    use crate::protocol::RawHttpResponse;
    use bytes::Bytes;
    use std::time::Instant;
    use tokio::net::{TcpListener, TcpStream};

    async fn open_session(listener: &TcpListener, index: usize) -> (SharedSession, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let session = ClientSession::new(
            index,
            client.unwrap(),
            RawHttpResponse::new(&b"HTTP/1.1 101 Switching Protocols\r\n\r\n"[..]),
            Bytes::new(),
            Instant::now(),
            Limits::default(),
        );
        (session.into_shared(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_registry_closes_each_socket_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = SocketRegistry::new();
        let mut peers = Vec::new();
        for index in 0..3 {
            let (session, peer) = open_session(&listener, index).await;
            registry.register(session).await;
            peers.push(peer);
        }
        assert_eq!(registry.len().await, 3);

        assert_eq!(registry.close_all().await, 3);
        assert!(registry.is_empty().await);
        assert_eq!(registry.close_all().await, 0);
    }

    #[tokio::test]
    async fn test_registry_skips_already_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = SocketRegistry::new();
        let (session, _peer) = open_session(&listener, 0).await;
        assert!(session.lock().await.close().await);
        registry.register(session).await;
        assert_eq!(registry.close_all().await, 0);
    }

    #[tokio::test]
    async fn test_keepalive_stops_on_closed_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (session, _peer) = open_session(&listener, 0).await;
        session.lock().await.close().await;
        // Must return promptly instead of sleeping through its rounds.
        tokio::time::timeout(
            Duration::from_secs(1),
            keepalive(session, 100, Duration::from_secs(10), Duration::from_secs(1)),
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_report_verdict() {
        let report = StressReport {
            outcomes: vec![
                ScenarioResult::pass("client-0"),
                ScenarioResult::fail("client-1", "HTTP/1.1 503 Service Unavailable"),
            ],
            opened: 1,
            closed: 1,
        };
        assert_eq!(report.upgraded(), 1);
        let result = report.into_result();
        assert!(!result.success());
        let diagnostic = result.diagnostic().unwrap();
        assert!(diagnostic.starts_with("1/2 upgraded"));
        assert!(diagnostic.contains("client-1 (HTTP/1.1 503 Service Unavailable)"));
    }

    #[test]
    fn test_report_all_upgraded() {
        let report = StressReport {
            outcomes: vec![ScenarioResult::pass("client-0"), ScenarioResult::pass("client-1")],
            opened: 2,
            closed: 2,
        };
        assert!(report.into_result().success());
    }
}
