//! Test harness utilities for scenario testing.
//!
//! Provides an in-process mock terminal server that speaks just enough of the
//! Upgrade handshake and framing to stand in for a real one.

#![allow(dead_code)]

mod server;

pub use server::{ServerStats, TestServer, TestServerBuilder};

use std::net::SocketAddr;
use std::time::Duration;

use wsprobe::config::{HarnessConfig, ReclaimConfig, StressConfig, Target, Timeouts};

/// Timeouts short enough to keep tests fast.
pub fn fast_timeouts() -> Timeouts {
    Timeouts::new(
        Duration::from_secs(2),
        Duration::from_millis(500),
        Duration::from_millis(500),
        Duration::from_millis(200),
    )
}

/// Harness configuration pointed at `addr`, with compressed delays.
pub fn config_for(addr: SocketAddr) -> HarnessConfig {
    HarnessConfig::new()
        .with_target(Target::from_addr(addr))
        .with_timeouts(fast_timeouts())
        .with_stress(
            StressConfig::default()
                .with_clients(6)
                .with_keepalive(3, Duration::from_millis(20))
                .with_stagger(Duration::from_millis(5))
                .with_observation_window(Duration::from_millis(100)),
        )
        .with_reclaim(ReclaimConfig::new(4, Duration::from_millis(200)))
        .with_scenario_pause(Duration::ZERO)
}
