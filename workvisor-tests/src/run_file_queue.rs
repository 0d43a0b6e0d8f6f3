// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::{
    fs,
    io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Output, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

pub const QUEUE_DIR_ENV: &str = "FILE_QUEUE_DIR";
pub const JOB_TIME_ENV: &str = "FILE_QUEUE_JOB_TIME_MS";

/// Writes a configuration file for the `file-queue` binary.
pub fn write_config(dir: &Path, config: serde_json::Value) -> io::Result<PathBuf> {
    let path = dir.join("workvisor.json");
    fs::write(&path, serde_json::to_vec_pretty(&config)?)?;
    Ok(path)
}

pub fn command(bin: &str, queue_dir: &Path, job_time: Duration, args: &[&str]) -> Command {
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .env(QUEUE_DIR_ENV, queue_dir)
        .env(JOB_TIME_ENV, job_time.as_millis().to_string());
    cmd
}

/// Runs `file-queue` to completion.
pub fn run(bin: &str, queue_dir: &Path, job_time: Duration, args: &[&str]) -> Output {
    command(bin, queue_dir, job_time, args)
        .output()
        .expect("failed to run file-queue")
}

/// Polls `condition` until it holds or `timeout` elapsed.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    condition()
}

pub fn is_alive(pid: i32) -> bool {
    proc_tools::read_state(pid)
        .map(|state| state.is_alive())
        .unwrap_or(false)
}

/// SIGTERM first, SIGKILL if the process is still around after a second.
pub fn terminate(pid: i32) {
    let pid = Pid::from_raw(pid);
    let _ = signal::kill(pid, Signal::SIGTERM);
    for _ in 0..10 {
        if !is_alive(pid.as_raw()) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    let _ = signal::kill(pid, Signal::SIGKILL);
}

/// A `file-queue` child process that is terminated when dropped.
pub struct FileQueueGuard {
    child: Child,
}

impl FileQueueGuard {
    pub fn start(bin: &str, queue_dir: &Path, job_time: Duration, args: &[&str]) -> Self {
        let child = command(bin, queue_dir, job_time, args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start file-queue");
        Self { child }
    }

    pub fn pid(&self) -> i32 {
        self.child.id() as i32
    }

    /// Kills the process without giving it a chance to clean up.
    pub fn kill(&mut self) -> io::Result<ExitStatus> {
        self.child.kill()?;
        self.child.wait()
    }
}

impl Drop for FileQueueGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        terminate(self.pid());
        let _ = self.child.wait();
    }
}
