// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Low level helpers around processes: liveness probes and a `/proc` based
//! process table scan.

use std::fs;
use std::io;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

pub type RawPid = libc::pid_t;

const PROC_ROOT: &str = "/proc";

/// Scheduling state as reported in the third field of `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    Zombie,
    Dead,
    Other(char),
}

impl ProcState {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => ProcState::Running,
            'S' => ProcState::Sleeping,
            'D' => ProcState::DiskSleep,
            'T' | 't' => ProcState::Stopped,
            'Z' => ProcState::Zombie,
            'X' | 'x' => ProcState::Dead,
            other => ProcState::Other(other),
        }
    }

    /// A zombie has finished executing, it only waits to be reaped.
    pub fn is_alive(&self) -> bool {
        !matches!(self, ProcState::Zombie | ProcState::Dead)
    }
}

/// Extracts the state letter from the content of `/proc/<pid>/stat`.
///
/// The command name in the second field is put into parentheses and may itself
/// contain spaces and parentheses, so the state is searched after the last `)`.
pub fn parse_stat_state(content: &str) -> Option<ProcState> {
    let end_of_comm = content.rfind(')')?;
    content[end_of_comm + 1..]
        .trim_start()
        .chars()
        .next()
        .map(ProcState::from_char)
}

/// Reads the state of `pid` from procfs. `None` if the process does not exist.
pub fn read_state(pid: RawPid) -> Option<ProcState> {
    if pid <= 0 {
        return None;
    }
    let content = fs::read_to_string(format!("{}/{}/stat", PROC_ROOT, pid)).ok()?;
    parse_stat_state(&content)
}

/// Probes `pid` with the null signal.
///
/// EPERM means the process exists but belongs to somebody else.
pub fn signal_probe(pid: RawPid) -> bool {
    // kill(0, ..) and kill(-1, ..) address process groups, never single processes
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: RawPid,
    pub cmdline: Vec<String>,
}

impl ProcessEntry {
    /// Arguments joined by a single space, like `ps -o args` shows them.
    pub fn command_line(&self) -> String {
        self.cmdline.join(" ")
    }
}

/// Splits the NUL separated content of `/proc/<pid>/cmdline`.
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|b| *b == 0)
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// Lists all processes that have a command line.
///
/// Kernel threads have an empty command line and are skipped. Processes that
/// vanish while the table is being read are skipped as well.
pub fn list_processes() -> io::Result<Vec<ProcessEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(PROC_ROOT)? {
        let entry = entry?;
        let pid = match entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<RawPid>().ok())
        {
            Some(pid) => pid,
            None => continue,
        };
        let raw = match fs::read(entry.path().join("cmdline")) {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        let cmdline = parse_cmdline(&raw);
        if cmdline.is_empty() {
            continue;
        }
        entries.push(ProcessEntry { pid, cmdline });
    }
    Ok(entries)
}
