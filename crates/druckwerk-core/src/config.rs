// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// System configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DruckwerkError, Result};

/// Process-wide settings. Durations are whole milliseconds on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Name reported in `printer-info` and logs.
    pub server_name: String,
    /// Address the IPP listener binds to.
    pub bind_address: String,
    /// Port for the IPP listener (default 8631).
    pub port: u16,
    /// Directory for spooled documents.
    pub spool_dir: PathBuf,
    /// Wait between device-open attempts while the device is unavailable.
    pub device_retry_interval_ms: u64,
    /// Poll interval while another job holds the device.
    pub device_wait_interval_ms: u64,
    /// Client connections idle longer than this are closed.
    pub idle_timeout_ms: u64,
    /// Upper bound on draining processing jobs at shutdown.
    pub shutdown_timeout_ms: u64,
    /// Largest accepted HTTP request body.
    pub max_request_bytes: usize,
    pub max_image_width: u32,
    pub max_image_height: u32,
    /// Largest decoded image buffer.
    pub max_image_bytes: usize,
    /// Completed jobs kept per printer for status queries.
    pub max_completed_jobs: usize,
}

impl SystemConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.display(), port = config.port, "configuration loaded");
        Ok(config)
    }

    /// Reject values that would stall the scheduler or the listener.
    pub fn validate(&self) -> Result<()> {
        if self.device_retry_interval_ms == 0 || self.device_wait_interval_ms == 0 {
            return Err(DruckwerkError::Config(
                "device intervals must be greater than zero".into(),
            ));
        }
        if self.max_request_bytes == 0 {
            return Err(DruckwerkError::Config(
                "max_request_bytes must be greater than zero".into(),
            ));
        }
        if self.max_image_width == 0 || self.max_image_height == 0 {
            return Err(DruckwerkError::Config(
                "maximum image dimensions must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn device_retry_interval(&self) -> Duration {
        Duration::from_millis(self.device_retry_interval_ms)
    }

    pub fn device_wait_interval(&self) -> Duration {
        Duration::from_millis(self.device_wait_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            server_name: "Druckwerk".into(),
            bind_address: "0.0.0.0".into(),
            port: 8631,
            spool_dir: std::env::temp_dir().join("druckwerk-spool"),
            device_retry_interval_ms: 5_000,
            device_wait_interval_ms: 250,
            idle_timeout_ms: 30_000,
            shutdown_timeout_ms: 10_000,
            max_request_bytes: 256 * 1024 * 1024,
            max_image_width: 16_384,
            max_image_height: 16_384,
            max_image_bytes: 256 * 1024 * 1024,
            max_completed_jobs: 100,
        }
    }
}
