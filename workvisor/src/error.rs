// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("missing capability: the `{action}` action needs a `{capability}` callback")]
    MissingCapability {
        action: &'static str,
        capability: &'static str,
    },
    #[error("log file is not writable: `{path}`: {source}")]
    LogPath { path: PathBuf, source: io::Error },
    #[error("invalid configuration `{path}`: {reason}")]
    Config { path: PathBuf, reason: String },
    #[error("invalid setting `{name}`: {reason}")]
    Setting { name: &'static str, reason: String },
    #[error("{feature} is not supported on this platform")]
    UnsupportedPlatform { feature: &'static str },
    #[error("already running as pid {pid}: {cmdline}")]
    DuplicateInstance { pid: i32, cmdline: String },
    #[error("already running as pid {owner}, lock `{path}` is valid until {expires_at}")]
    AlreadyRunning {
        path: PathBuf,
        owner: u32,
        expires_at: OffsetDateTime,
    },
    #[error("failed to spawn `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("lease `{path}`: {reason}")]
    Lease { path: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl SupervisorError {
    /// Process exit status for a fatal error.
    ///
    /// Misconfiguration exits with 2 (like a usage error), everything else with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::MissingCapability { .. }
            | SupervisorError::LogPath { .. }
            | SupervisorError::Config { .. }
            | SupervisorError::Setting { .. }
            | SupervisorError::UnsupportedPlatform { .. } => 2,
            _ => 1,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            SupervisorError::DuplicateInstance { .. } | SupervisorError::AlreadyRunning { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
