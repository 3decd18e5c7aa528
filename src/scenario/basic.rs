//! Single-connection scenarios.

use tracing::{info, warn};

use crate::client::{ClientSession, HandshakeClient};
use crate::error::{Error, Result};
use crate::protocol::{Frame, RawHttpResponse};
use crate::scenario::{Scenario, ScenarioResult};

/// Command sent by the round-trip scenario.
pub const PROBE_COMMAND: &[u8] = b"ls\n";

/// Handshake response and first frame of a command round trip.
#[derive(Debug)]
pub struct CommandEcho {
    /// Handshake response.
    pub response: RawHttpResponse,
    /// First frame the server sent after the command.
    pub frame: Frame,
}

fn check_upgrade(response: &RawHttpResponse, key: &str, verify_accept: bool) -> Result<()> {
    if verify_accept {
        response.verify_accept(key)
    } else if response.is_upgrade() {
        Ok(())
    } else {
        Err(Error::InvalidHandshake(format!(
            "no upgrade: {}",
            response.status_line().unwrap_or_else(|| "(no response)".into())
        )))
    }
}

/// Handshake, send `command` as a masked text frame and read one frame back.
///
/// The session is closed before returning.
///
/// # Errors
///
/// Connection, handshake, send and frame errors, in the order they occur.
pub async fn command_round_trip(
    client: &HandshakeClient,
    index: usize,
    command: &[u8],
    verify_accept: bool,
) -> Result<CommandEcho> {
    let mut session = client.connect_and_handshake(index).await?;
    let echo = exchange(&mut session, client, command, verify_accept).await;
    session.close().await;
    echo
}

async fn exchange(
    session: &mut ClientSession,
    client: &HandshakeClient,
    command: &[u8],
    verify_accept: bool,
) -> Result<CommandEcho> {
    check_upgrade(session.response(), &client.target().key, verify_accept)?;
    let limit = client.timeouts().frame;
    session.send_text(command, limit).await?;
    let frame = session.read_frame(limit).await?;
    Ok(CommandEcho {
        response: session.response().clone(),
        frame,
    })
}

/// Plain handshake: the server must answer `101 Switching Protocols`.
///
/// # Errors
///
/// Connection failures.
pub async fn handshake_raw(client: &HandshakeClient, verify_accept: bool) -> Result<ScenarioResult> {
    let name = Scenario::HandshakeRaw.name();
    let mut session = client.connect_and_handshake(0).await?;
    info!("HTTP response:\n{}", session.response().text());

    let verdict = check_upgrade(session.response(), &client.target().key, verify_accept);
    let status = session
        .response()
        .status_line()
        .unwrap_or_else(|| "(no response)".into());
    session.close().await;

    Ok(match verdict {
        Ok(()) => ScenarioResult::pass(name).with_diagnostic(status),
        Err(e) => ScenarioResult::fail(name, e.to_string()),
    })
}

/// Handshake followed by one short, bounded read. A timed-out read is an
/// acceptable observation, not a failure.
///
/// # Errors
///
/// Connection failures.
pub async fn handshake_timeout(client: &HandshakeClient) -> Result<ScenarioResult> {
    let name = Scenario::HandshakeTimeout.name();
    let response = client.single_read().await?;
    let diagnostic = if response.is_empty() {
        info!("(read timed out)");
        "read timed out".to_string()
    } else {
        info!("{}", response.text());
        format!(
            "{} bytes, {}",
            response.len(),
            response.status_line().unwrap_or_default()
        )
    };
    Ok(ScenarioResult::pass(name).with_diagnostic(diagnostic))
}

/// Handshake, masked `ls\n`, one frame back carrying terminal output.
///
/// Failures of the exchange become a failed result.
pub async fn ws_client(client: &HandshakeClient, verify_accept: bool) -> ScenarioResult {
    let name = Scenario::WsClient.name();
    match command_round_trip(client, 0, PROBE_COMMAND, verify_accept).await {
        Ok(echo) => {
            let opcode = echo.frame.opcode;
            let len = echo.frame.payload().len();
            info!(%opcode, len, "Received frame");
            ScenarioResult::from_check(
                name,
                opcode.carries_output() && len > 0,
                format!("opcode {opcode}, {len} bytes"),
            )
        }
        Err(e) => {
            warn!(error = %e, "ws_client failed");
            ScenarioResult::fail(name, e.to_string())
        }
    }
}
