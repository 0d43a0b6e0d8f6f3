// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Demo host: a directory backed queue driven by workvisor.
//!
//!     FILE_QUEUE_DIR=/tmp/q file-queue enqueue 20
//!     FILE_QUEUE_DIR=/tmp/q file-queue --config workvisor.json listen
//!
//! `FILE_QUEUE_JOB_TIME_MS` makes every job take that long.

use std::time::Duration;

use anyhow::Context;
use workvisor::cli::{self, App};
use workvisor_tests::file_queue::FileQueue;
use workvisor_tests::run_file_queue::{JOB_TIME_ENV, QUEUE_DIR_ENV};

fn main() -> anyhow::Result<()> {
    let dir = std::env::var_os(QUEUE_DIR_ENV)
        .with_context(|| format!("{} is not set", QUEUE_DIR_ENV))?;
    let job_time = match std::env::var(JOB_TIME_ENV) {
        Ok(ms) => Duration::from_millis(
            ms.parse()
                .with_context(|| format!("{} must be a number of milliseconds", JOB_TIME_ENV))?,
        ),
        Err(_) => Duration::ZERO,
    };
    let queue = FileQueue::open(&dir)
        .with_context(|| format!("failed to open queue {}", dir.to_string_lossy()))?;

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("enqueue") {
        let count: usize = args
            .next()
            .context("usage: file-queue enqueue <count>")?
            .parse()
            .context("count must be a number")?;
        let names = queue.enqueue(count)?;
        println!("enqueued {} jobs in {}", names.len(), queue.root().display());
        return Ok(());
    }

    let listener_queue = queue.clone();
    let worker_queue = queue.clone();
    let single_queue = queue;
    let app = App::new()
        .listener(move || listener_queue.has_work())
        .worker(move || worker_queue.process_one(job_time))
        .single(move || single_queue.process_one(job_time));

    std::process::exit(cli::run(app));
}
