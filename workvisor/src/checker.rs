// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use proc_tools::RawPid;

pub trait ProcessChecker {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Reads `/proc/<pid>/stat`. Zombies count as dead.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcFsChecker;

impl ProcessChecker for ProcFsChecker {
    fn is_alive(&self, pid: u32) -> bool {
        RawPid::try_from(pid)
            .ok()
            .and_then(proc_tools::read_state)
            .map(|state| state.is_alive())
            .unwrap_or(false)
    }
}

/// Sends the null signal. Works on every unix, but cannot tell zombies apart.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalChecker;

impl ProcessChecker for SignalChecker {
    fn is_alive(&self, pid: u32) -> bool {
        RawPid::try_from(pid)
            .map(proc_tools::signal_probe)
            .unwrap_or(false)
    }
}

pub fn default_checker() -> Box<dyn ProcessChecker> {
    if cfg!(target_os = "linux") {
        Box::new(ProcFsChecker)
    } else {
        Box::new(SignalChecker)
    }
}

impl<C: ProcessChecker + ?Sized> ProcessChecker for Box<C> {
    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }
}
