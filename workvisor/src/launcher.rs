// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Stdio};

use log::{debug, warn};

use crate::command::{Action, CommandBuilder};
use crate::error::{Result, SupervisorError};
use crate::logging::open_log_file;

/// Starts worker processes for pool slots.
pub trait WorkerLauncher {
    /// Starts a worker for `slot` and returns its pid.
    fn launch(&mut self, slot: u32) -> Result<u32>;

    /// Collects workers started by this launcher that already exited and
    /// returns their pids. Called once per tick.
    fn reap(&mut self) -> Vec<u32> {
        Vec::new()
    }
}

/// Spawns `work <slot>` through a [`CommandBuilder`].
///
/// Workers outlive their dispatch session, so the handles are kept until
/// [`WorkerLauncher::reap`] sees them exit. Other children of the host
/// process are left alone.
pub struct ProcessLauncher {
    builder: Box<dyn CommandBuilder>,
    log_path: Option<PathBuf>,
    children: HashMap<u32, Child>,
}

impl ProcessLauncher {
    pub fn new(builder: Box<dyn CommandBuilder>, log_path: Option<PathBuf>) -> Self {
        Self {
            builder,
            log_path,
            children: HashMap::new(),
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&mut self, slot: u32) -> Result<u32> {
        let invocation = self.builder.build(Action::Work, Some(slot));
        let mut cmd = invocation.to_command();
        cmd.stdin(Stdio::null());

        // workers print to stdout, which ends up in the shared log file
        if let Some(path) = &self.log_path {
            let file = open_log_file(path)?;
            cmd.stderr(file.try_clone()?);
            cmd.stdout(file);
        }

        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: invocation.signature(),
            source,
        })?;
        let pid = child.id();
        debug!("spawned `{}` as pid {}", invocation.signature(), pid);
        self.children.insert(pid, child);
        Ok(pid)
    }

    fn reap(&mut self) -> Vec<u32> {
        let mut exited = Vec::new();
        self.children.retain(|pid, child| match child.try_wait() {
            Ok(Some(status)) => {
                debug!("reaped worker pid {} ({})", pid, status);
                exited.push(*pid);
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!("failed to poll worker pid {}: {}", pid, err);
                true
            }
        });
        exited
    }
}
