//! Configuration system.
//!
//! Loads network/session tuning from JSON. Every field has a default so a
//! partial file (or none at all) is valid; command-line flags override it.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Well-known server address, e.g. `127.0.0.1:12345`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Seconds between reconciliation passes.
    pub sync_interval_secs: f32,
    /// Unanswered sync requests after which a player is dropped.
    pub max_pending_syncs: u32,
    /// A reported position closer than this to the authoritative one is accepted.
    pub sync_tolerance: f32,
    /// How many times each input edge is sent.
    pub input_redundancy: u32,
    /// Display label for the local player (client only).
    pub player_name: Option<String>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:12345".to_string(),
            tick_hz: 60,
            sync_interval_secs: 1.0,
            max_pending_syncs: 5,
            sync_tolerance: 10.0,
            input_redundancy: 3,
            player_name: None,
        }
    }
}

impl NetConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Seconds per simulation tick.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(self.tick_dt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = NetConfig::from_json_str(r#"{ "tick_hz": 30, "player_name": "ada" }"#).unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.player_name.as_deref(), Some("ada"));
        assert_eq!(cfg.max_pending_syncs, 5);
        assert_eq!(cfg.sync_tolerance, 10.0);
        assert_eq!(cfg.input_redundancy, 3);
    }

    #[test]
    fn zero_tick_rate_does_not_divide_by_zero() {
        let cfg = NetConfig {
            tick_hz: 0,
            ..Default::default()
        };
        assert_eq!(cfg.tick_dt(), 1.0);
    }
}
