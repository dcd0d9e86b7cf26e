//! Configuration parsing and validation.
//!
//! Trellis configuration is loaded from TOML files supplied by the process
//! that constructs the RPC channels. Sections mirror the components:
//! `[admission]` for flow control, `[auth]` for credential refresh, and
//! `[scan]` for streaming reads. All limits are validated at load time so
//! components can assume well-formed values at construction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Flow control limits for outstanding writes.
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Credential caching and refresh retry parameters.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Streaming read buffering and timeouts.
    #[serde(default)]
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            auth: AuthConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

/// Flow control configuration for the admission controller and throttle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum aggregate serialized size of outstanding operations.
    #[serde(default = "default_max_outstanding_bytes")]
    pub max_outstanding_bytes: u64,

    /// Maximum number of concurrently outstanding operations.
    #[serde(default = "default_max_inflight_ops")]
    pub max_inflight_ops: usize,

    /// Poll interval while a registration is blocked on capacity.
    /// Bounds worst-case registration latency, not correctness.
    #[serde(default = "default_register_poll_ms")]
    pub register_poll_ms: u64,

    /// How long `await_completion` may go without observing any completion
    /// before incrementing the stall diagnostic counter.
    #[serde(default = "default_stall_warning_ms")]
    pub stall_warning_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_outstanding_bytes: default_max_outstanding_bytes(),
            max_inflight_ops: default_max_inflight_ops(),
            register_poll_ms: default_register_poll_ms(),
            stall_warning_ms: default_stall_warning_ms(),
        }
    }
}

impl AdmissionConfig {
    pub fn register_poll(&self) -> Duration {
        Duration::from_millis(self.register_poll_ms)
    }

    pub fn stall_warning_interval(&self) -> Duration {
        Duration::from_millis(self.stall_warning_ms)
    }
}

/// Credential cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How far before token expiry the header counts as stale (async
    /// refresh territory).
    #[serde(default = "default_stale_offset_ms")]
    pub stale_offset_ms: u64,

    /// How far before token expiry the header counts as expired (callers
    /// block for a refresh). Must be smaller than `stale_offset_ms` so a
    /// stale window always precedes expiry.
    #[serde(default = "default_expire_offset_ms")]
    pub expire_offset_ms: u64,

    /// Initial delay between failed refresh attempts.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Total elapsed-time budget for refresh retries before the failure is
    /// cached as terminal.
    #[serde(default = "default_backoff_max_elapsed_ms")]
    pub backoff_max_elapsed_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            stale_offset_ms: default_stale_offset_ms(),
            expire_offset_ms: default_expire_offset_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max_elapsed_ms: default_backoff_max_elapsed_ms(),
        }
    }
}

/// Streaming read configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum wait for the next buffered response before the read fails
    /// with a scan timeout.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Maximum number of buffered queue entries; bounds reader memory and
    /// is the initial request credit toward the transport.
    #[serde(default = "default_capacity_cap")]
    pub capacity_cap: usize,

    /// Number of additional responses requested from the transport each
    /// time the outstanding request count falls to this threshold.
    #[serde(default = "default_pull_batch_size")]
    pub pull_batch_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            capacity_cap: default_capacity_cap(),
            pull_batch_size: default_pull_batch_size(),
        }
    }
}

impl ScanConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn default_max_outstanding_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_max_inflight_ops() -> usize {
    50
}

fn default_register_poll_ms() -> u64 {
    5
}

fn default_stall_warning_ms() -> u64 {
    300_000
}

fn default_stale_offset_ms() -> u64 {
    75_000
}

fn default_expire_offset_ms() -> u64 {
    45_000
}

fn default_backoff_initial_ms() -> u64 {
    5
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max_elapsed_ms() -> u64 {
    60_000
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_capacity_cap() -> usize {
    32
}

fn default_pull_batch_size() -> usize {
    16
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_admission()?;
        self.validate_auth()?;
        self.validate_scan()?;
        Ok(())
    }

    fn validate_admission(&self) -> Result<()> {
        if self.admission.max_outstanding_bytes == 0 {
            anyhow::bail!("admission.max_outstanding_bytes must be > 0");
        }
        if self.admission.max_inflight_ops == 0 {
            anyhow::bail!("admission.max_inflight_ops must be > 0");
        }
        if self.admission.register_poll_ms == 0 {
            anyhow::bail!("admission.register_poll_ms must be > 0");
        }
        if self.admission.stall_warning_ms == 0 {
            anyhow::bail!("admission.stall_warning_ms must be > 0");
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<()> {
        // The stale instant must precede the expire instant for any
        // finite-lived token.
        if self.auth.stale_offset_ms <= self.auth.expire_offset_ms {
            anyhow::bail!(
                "auth.stale_offset_ms ({}) must be > auth.expire_offset_ms ({})",
                self.auth.stale_offset_ms,
                self.auth.expire_offset_ms
            );
        }
        if self.auth.backoff_initial_ms == 0 {
            anyhow::bail!("auth.backoff_initial_ms must be > 0");
        }
        if self.auth.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "auth.backoff_multiplier must be >= 1.0, got: {}",
                self.auth.backoff_multiplier
            );
        }
        if self.auth.backoff_max_elapsed_ms == 0 {
            anyhow::bail!("auth.backoff_max_elapsed_ms must be > 0");
        }
        Ok(())
    }

    fn validate_scan(&self) -> Result<()> {
        if self.scan.read_timeout_ms == 0 {
            anyhow::bail!("scan.read_timeout_ms must be > 0");
        }
        if self.scan.capacity_cap == 0 {
            anyhow::bail!("scan.capacity_cap must be > 0");
        }
        if self.scan.pull_batch_size == 0 {
            anyhow::bail!("scan.pull_batch_size must be > 0");
        }
        if self.scan.pull_batch_size > self.scan.capacity_cap {
            anyhow::bail!(
                "scan.pull_batch_size ({}) must not exceed scan.capacity_cap ({})",
                self.scan.pull_batch_size,
                self.scan.capacity_cap
            );
        }
        Ok(())
    }
}
