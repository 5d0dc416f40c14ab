// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Node configuration
//!
//! Every field has a default, so an empty TOML document is a valid configuration for a single
//! node cluster.
//!
//! ```toml
//! server_id = "node-1"
//! address = "10.0.0.1"
//! port = 7000
//! tags = ["Player", "Room"]
//! rpc_timeout_ms = 5000
//! retry_backoff = "exponential"
//! retry_backoff_ms = 50
//!
//! [[members]]
//! server_id = "node-2"
//! address = "10.0.0.2"
//! port = 7000
//! tags = ["*"]
//! ```
//!

use crate::{
    Error,
    retry::{RetryBackoff, RetryStrategy},
    rpc::{
        DEFAULT_COMPRESS_THRESHOLD, DEFAULT_MAGIC, DEFAULT_MAX_FRAME_SIZE,
    },
};

use serde::{Deserialize, Serialize};

use std::{path::Path, time::Duration};

/// A cluster member known from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub server_id: String,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

/// Configuration of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique id of this node in the cluster.
    pub server_id: String,
    pub address: String,
    pub port: u16,
    /// Actor types this node hosts. `*` hosts every type.
    pub tags: Vec<String>,
    /// Frame marker of the wire protocol.
    pub magic: String,
    pub max_frame_size: usize,
    /// Payloads above this size are compressed.
    pub compress_threshold: usize,
    pub rpc_timeout_ms: u64,
    /// Attempts of a proxy call when the placement keeps changing.
    pub rpc_attempts: usize,
    pub retry_backoff: RetryBackoff,
    pub retry_backoff_ms: u64,
    pub placement_ttl_secs: u64,
    pub placement_cache_size: usize,
    pub gc_interval_secs: u64,
    /// Upper bound of one GC pass.
    pub gc_budget_secs: u64,
    pub weight_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub lease_refresh_secs: u64,
    pub membership_refresh_secs: u64,
    /// Reentrant requests allowed to run at once per actor.
    pub reentrant_capacity: usize,
    /// Shard of the id generators.
    pub sequence_seed: u64,
    /// Static members, used by [`crate::StaticDiscovery`].
    pub members: Vec<MemberConfig>,
}

fn default_address() -> String {
    "127.0.0.1".to_owned()
}

fn default_tags() -> Vec<String> {
    vec!["*".to_owned()]
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_id: "node-1".to_owned(),
            address: default_address(),
            port: 0,
            tags: default_tags(),
            magic: String::from_utf8_lossy(DEFAULT_MAGIC).into_owned(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            rpc_timeout_ms: 5_000,
            rpc_attempts: 3,
            retry_backoff: RetryBackoff::None,
            retry_backoff_ms: 0,
            placement_ttl_secs: 120,
            placement_cache_size: 2048,
            gc_interval_secs: 60,
            gc_budget_secs: 100,
            weight_interval_secs: 10,
            heartbeat_interval_secs: 10,
            lease_refresh_secs: 40,
            membership_refresh_secs: 3,
            reentrant_capacity: 64,
            sequence_seed: 0,
            members: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Default configuration with the given server id.
    pub fn with_server_id(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_owned(),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("can not read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks the values a node can not run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.server_id.is_empty() {
            return Err(Error::Config("server_id is empty".to_owned()));
        }
        if self.magic.is_empty() {
            return Err(Error::Config("magic is empty".to_owned()));
        }
        if self.rpc_attempts == 0 {
            return Err(Error::Config("rpc_attempts must be at least 1".to_owned()));
        }
        if self.placement_cache_size == 0 {
            return Err(Error::Config(
                "placement_cache_size must be at least 1".to_owned(),
            ));
        }
        let durations = [
            ("placement_ttl_secs", self.placement_ttl_secs),
            ("gc_interval_secs", self.gc_interval_secs),
            ("weight_interval_secs", self.weight_interval_secs),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("lease_refresh_secs", self.lease_refresh_secs),
            ("membership_refresh_secs", self.membership_refresh_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::Config(format!("{} must be at least 1", name)));
        }
        if let Some(member) = self.members.iter().find(|m| m.server_id.is_empty()) {
            return Err(Error::Config(format!(
                "member at {}:{} has an empty server_id",
                member.address, member.port
            )));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn placement_ttl(&self) -> Duration {
        Duration::from_secs(self.placement_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn gc_budget(&self) -> Duration {
        Duration::from_secs(self.gc_budget_secs)
    }

    pub fn weight_interval(&self) -> Duration {
        Duration::from_secs(self.weight_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn lease_refresh(&self) -> Duration {
        Duration::from_secs(self.lease_refresh_secs)
    }

    pub fn membership_refresh(&self) -> Duration {
        Duration::from_secs(self.membership_refresh_secs)
    }

    /// Retry strategy for one proxy call: `rpc_attempts - 1` retries.
    pub fn retry_strategy(&self) -> Box<dyn RetryStrategy> {
        self.retry_backoff.strategy(
            self.rpc_attempts.saturating_sub(1),
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}
