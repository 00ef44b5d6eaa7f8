//! Process configuration, loaded once at startup from a JSON file given
//! on argv.
//!
//! Grounded on the teacher's `Config` (serde-derived struct, `Context`-
//! wrapped load errors); directory/keyring resolution has no counterpart
//! here since there are no user credentials to persist.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::source::parse_descriptor;
use crate::ts::PACKET_SIZE;

/// Top-level process configuration: the listen address, admission
/// limits, and the set of streams to serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Process-wide hard cap on concurrently admitted subscribers. `0` =
    /// unlimited.
    #[serde(default)]
    pub hard_connection_limit: usize,
    /// Process-wide soft cap; crossing it emits a [`crate::events::LimitEvent`]
    /// and is reported via `/statistics`. `0` = disabled.
    #[serde(default)]
    pub soft_connection_limit: usize,
    /// The streams this process serves, one HTTP path each.
    pub streams: Vec<StreamConfig>,
}

/// Configuration for a single fan-out stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Client-visible path, e.g. `"/live"`.
    pub path: String,
    /// Candidate upstream source URLs. Shuffled once at stream start and
    /// tried in that fixed order on every (re)connect.
    pub remotes: Vec<String>,
    /// Depth, in packets, of the puller-to-broker channel.
    #[serde(default = "default_input_buffer")]
    pub input_buffer: usize,
    /// Depth, in packets, of each subscriber's output queue.
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,
    /// Dial/TLS/header-wait timeout when opening a candidate source.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Maximum silence from an already-open source before it is torn
    /// down and the next candidate tried.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Delay before retrying the candidate list after exhausting it.
    /// `0` disables reconnection entirely.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// UDP/unixgram/unixpacket socket receive buffer, in packets.
    #[serde(default)]
    pub udp_buffer_size: Option<usize>,
    /// Expected datagram payload size; defaults to 188 (one TS packet)
    /// when unset.
    #[serde(default)]
    pub udp_packet_size: Option<usize>,
    /// Multicast-join interface address (IPv4) or index (IPv6).
    #[serde(default)]
    pub multicast_interface: Option<String>,
}

fn default_input_buffer() -> usize {
    512
}

fn default_output_buffer() -> usize {
    512
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_reconnect_delay_secs() -> u64 {
    2
}

impl StreamConfig {
    /// Datagram payload size to expect, honoring `udp_packet_size` when set.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.udp_packet_size.unwrap_or(PACKET_SIZE)
    }
}

impl ProcessConfig {
    /// Load and validate configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate().context("validating config")?;
        Ok(config)
    }

    /// Check every stream has at least one parseable remote and that no
    /// two streams share a client-visible path.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_paths = std::collections::HashSet::new();
        for stream in &self.streams {
            if !seen_paths.insert(stream.path.clone()) {
                return Err(ConfigError::DuplicatePath(stream.path.clone()));
            }
            if stream.remotes.is_empty() {
                return Err(ConfigError::EmptyRemoteList(stream.path.clone()));
            }
            for remote in &stream.remotes {
                parse_descriptor(remote).map_err(|source| ConfigError::InvalidSource {
                    path: stream.path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}
