// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread;
use std::time::{Duration, Instant};

use log::info;
use time::OffsetDateTime;

use crate::capability::Worker;
use crate::logging::{now_local, timestamp};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerReport {
    pub slot: u32,
    /// Calls of `process_unit`, the final one that returned false included
    pub attempts: u64,
    pub elapsed: Duration,
}

/// The loop of one worker process: process units until the callback says stop.
pub struct WorkerRunner {
    slot: u32,
    poll_interval: Duration,
}

impl WorkerRunner {
    pub fn new(slot: u32, poll_interval: Duration) -> Self {
        Self {
            slot,
            poll_interval,
        }
    }

    pub fn run(&self, worker: &mut dyn Worker) -> WorkerReport {
        let started_at = Instant::now();
        info!("{}", create_message(self.slot, std::process::id(), now_local()));

        let mut attempts = 0;
        loop {
            attempts += 1;
            if !worker.process_unit() {
                break;
            }
            if !self.poll_interval.is_zero() {
                thread::sleep(self.poll_interval);
            }
        }

        let report = WorkerReport {
            slot: self.slot,
            attempts,
            elapsed: started_at.elapsed(),
        };
        info!("{}", close_message(&report, now_local()));
        report
    }
}

fn create_message(slot: u32, pid: u32, at: OffsetDateTime) -> String {
    format!("Worker #{} create at {} (pid {})", slot, timestamp(at), pid)
}

fn close_message(report: &WorkerReport, at: OffsetDateTime) -> String {
    format!(
        "Worker #{} close at {} | units: {} | cost: {:.2}s",
        report.slot,
        timestamp(at),
        report.attempts.saturating_sub(1),
        report.elapsed.as_secs_f64()
    )
}
