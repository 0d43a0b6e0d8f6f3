// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{Result, SupervisorError};

/// Settings shared by all modes. Usually read from a JSON file, e.g.
///
/// ```json
/// { "max_workers": 8, "worker_spawn_stagger": "2s", "log_path": "/var/log/jobs.log" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Sleep between two probes while idle
    #[serde(with = "humantime_serde")]
    pub listener_poll_interval: Duration,
    /// Sleep between two units inside a worker. Zero disables it.
    #[serde(with = "humantime_serde")]
    pub worker_poll_interval: Duration,
    pub max_workers: u32,
    /// Workers spawned right away when work shows up
    pub initial_worker_burst: u32,
    /// Sleep after each spawn and after each tick with a saturated pool
    #[serde(with = "humantime_serde")]
    pub worker_spawn_stagger: Duration,
    pub health_check_enabled: bool,
    #[serde(with = "humantime_serde")]
    pub single_poll_interval: Duration,
    /// Grace period on top of `single_poll_interval` before a lease is considered abandoned
    #[serde(with = "humantime_serde")]
    pub single_lease_timeout: Duration,
    pub log_path: Option<PathBuf>,
    pub lease_dir: Option<PathBuf>,
    /// Logical name of the single consumer, defaults to the executable name
    pub identity: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener_poll_interval: Duration::from_secs(3),
            worker_poll_interval: Duration::ZERO,
            max_workers: 5,
            initial_worker_burst: 1,
            worker_spawn_stagger: Duration::from_secs(10),
            health_check_enabled: true,
            single_poll_interval: Duration::from_secs(1),
            single_lease_timeout: Duration::from_secs(15),
            log_path: None,
            lease_dir: None,
            identity: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SupervisorError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|reason| SupervisorError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        config.check_lease_range()?;
        Ok(config)
    }

    // lease expiry dates must stay representable
    fn check_lease_range(&self) -> std::result::Result<(), String> {
        let validity = self
            .single_poll_interval
            .saturating_add(self.single_lease_timeout);
        time::Duration::try_from(validity)
            .ok()
            .and_then(|validity| OffsetDateTime::now_utc().checked_add(validity))
            .map(|_| ())
            .ok_or_else(|| {
                format!(
                    "single_poll_interval + single_lease_timeout ({:?}) is out of range",
                    validity
                )
            })
    }

    /// Coerces the pool settings: `max_workers >= 1` and
    /// `1 <= initial_worker_burst <= max_workers`.
    pub fn normalized(mut self) -> Self {
        self.max_workers = self.max_workers.max(1);
        self.initial_worker_burst = self.initial_worker_burst.clamp(1, self.max_workers);
        self
    }

    pub fn identity(&self) -> String {
        if let Some(identity) = &self.identity {
            return identity.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "workvisor".to_string())
    }

    pub fn lease_dir(&self) -> PathBuf {
        self.lease_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
