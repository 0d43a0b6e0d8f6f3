// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Idempotent launching of long running actions.
//!
//! Meant to be called from cron or a similar scheduler every few minutes:
//! the action is only started if no process with the same command line runs
//! yet, and the launcher exits right after spawning it.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;

use log::debug;
use nix::unistd::setsid;
use proc_tools::{ProcessEntry, RawPid};
use regex::Regex;

use crate::command::{Action, CommandBuilder, Invocation};
use crate::error::{Result, SupervisorError};
use crate::logging::open_log_file;

/// Slot used when a worker is launched by hand.
pub const LAUNCHED_WORKER_SLOT: u32 = 1;

/// Matches `signature` as a whole sequence of arguments inside a command line.
pub fn signature_pattern(signature: &str) -> Regex {
    let pattern = format!(r"(?:^|\s){}(?:\s|$)", regex::escape(signature));
    Regex::new(&pattern).expect("an escaped signature is always a valid pattern")
}

pub fn find_running<'a>(
    signature: &str,
    table: &'a [ProcessEntry],
    exclude: RawPid,
) -> Option<&'a ProcessEntry> {
    let pattern = signature_pattern(signature);
    table
        .iter()
        .filter(|entry| entry.pid != exclude)
        .find(|entry| pattern.is_match(&entry.command_line()))
}

pub struct LaunchGuard<'a> {
    builder: &'a dyn CommandBuilder,
    log_path: Option<&'a Path>,
}

impl<'a> LaunchGuard<'a> {
    pub fn new(builder: &'a dyn CommandBuilder, log_path: Option<&'a Path>) -> Self {
        Self { builder, log_path }
    }

    pub fn invocation(&self, action: Action) -> Invocation {
        let slot = match action {
            Action::Listen => None,
            Action::Work => Some(LAUNCHED_WORKER_SLOT),
        };
        self.builder.build(action, slot)
    }

    /// Starts `action` in the background unless it already runs. Returns the new pid.
    pub fn launch(&self, action: Action) -> Result<u32> {
        if !cfg!(target_os = "linux") {
            return Err(SupervisorError::UnsupportedPlatform {
                feature: "process table scanning",
            });
        }

        let invocation = self.invocation(action);
        let signature = invocation.signature();
        let table = proc_tools::list_processes()?;
        let own_pid = std::process::id() as RawPid;
        if let Some(running) = find_running(&signature, &table, own_pid) {
            return Err(SupervisorError::DuplicateInstance {
                pid: running.pid,
                cmdline: running.command_line(),
            });
        }

        self.spawn_detached(&invocation)
    }

    fn spawn_detached(&self, invocation: &Invocation) -> Result<u32> {
        let mut cmd = invocation.to_command();
        cmd.stdin(Stdio::null()).stdout(Stdio::null());
        // the target logs on its own; only keep what it prints before its logger is up
        match self.log_path {
            Some(path) => cmd.stderr(open_log_file(path)?),
            None => cmd.stderr(Stdio::null()),
        };
        // SAFETY: setsid is async-signal-safe and nothing else runs between fork and exec
        unsafe {
            cmd.pre_exec(|| setsid().map(|_| ()).map_err(std::io::Error::from));
        }

        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: invocation.signature(),
            source,
        })?;
        debug!("launched `{}` as pid {}", invocation.signature(), child.id());
        Ok(child.id())
    }
}
