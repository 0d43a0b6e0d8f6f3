// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::ValueEnum;

/// Long running actions that are started as separate processes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Listen,
    Work,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Listen => "listen",
            Action::Work => "work",
        }
    }
}

/// A fully formed process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// The command line as it shows up in the process table.
    pub fn signature(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Builds the command line that runs `action` (with `slot` for workers).
pub trait CommandBuilder {
    fn build(&self, action: Action, slot: Option<u32>) -> Invocation;
}

/// Re-invokes the running executable, e.g. `/usr/bin/app --config c.json work 3`.
#[derive(Debug, Clone)]
pub struct CurrentExe {
    program: PathBuf,
    global_args: Vec<String>,
}

impl CurrentExe {
    pub fn new(global_args: Vec<String>) -> std::io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            global_args,
        })
    }

    pub fn with_program(program: impl Into<PathBuf>, global_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            global_args,
        }
    }

    /// Forwards `--config` and `--log-path` so children see the same settings.
    pub fn forwarding(config: Option<&PathBuf>, log_path: Option<&PathBuf>) -> std::io::Result<Self> {
        let mut global_args = Vec::new();
        if let Some(config) = config {
            global_args.push("--config".to_string());
            global_args.push(absolute(config).to_string_lossy().into_owned());
        }
        if let Some(log_path) = log_path {
            global_args.push("--log-path".to_string());
            global_args.push(absolute(log_path).to_string_lossy().into_owned());
        }
        Self::new(global_args)
    }
}

// Children are detached and may run with a different working directory.
fn absolute(path: &Path) -> OsString {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .into_os_string()
}

impl CommandBuilder for CurrentExe {
    fn build(&self, action: Action, slot: Option<u32>) -> Invocation {
        let mut args = self.global_args.clone();
        args.push(action.as_str().to_string());
        if let Some(slot) = slot {
            args.push(slot.to_string());
        }
        Invocation {
            program: self.program.clone(),
            args,
        }
    }
}
