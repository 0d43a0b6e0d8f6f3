// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Listener loop with a bounded worker pool
//!
//! ## Overview
//! - One dispatcher per host process, polling the host's `has_work` probe.
//! - Work shows up: a dispatch session starts, an initial burst of workers is
//!   spawned, then one more worker per tick until `max_workers` is reached.
//! - Saturated pool: dead workers are respawned into their old slot id.
//! - Work is gone: the session ends and the pool is forgotten. Workers are
//!   not killed, they drain the queue and exit on their own.
//! - A single thread. Every decision happens inside `tick`, the caller sleeps
//!   for the returned duration.
//!
//! ```text
//!          has_work                        has_work
//!     +--------------+               +-------------------------------+
//!     |              v               |                               |
//!     |   +------+  true   +---------+---+  pool full: health check  |
//!     +---| Idle |-------->| Dispatching |---------------------------+
//!         +------+         +-------------+  pool open: spawn one worker
//!            ^                    |
//!            +--------------------+
//!                   false: clear pool, log session cost
//! ```

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::capability::Listener;
use crate::checker::ProcessChecker;
use crate::config::Config;
use crate::launcher::WorkerLauncher;

pub mod pool;

pub use pool::{WorkerPool, WorkerSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Dispatching,
}

/// One working episode, from the first positive probe to the first negative one.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSession {
    pub started_at: Instant,
    /// Workers started in this session, respawns included
    pub worker_count: u32,
}

pub struct Dispatcher<L, C> {
    listener: Box<dyn Listener>,
    launcher: L,
    checker: C,
    pool: WorkerPool,
    /// Pids in the pool whose process was reaped by the launcher
    exited: HashSet<u32>,
    session: Option<DispatchSession>,
    listener_poll_interval: Duration,
    worker_spawn_stagger: Duration,
    initial_worker_burst: u32,
    health_check_enabled: bool,
}

impl<L: WorkerLauncher, C: ProcessChecker> Dispatcher<L, C> {
    pub fn new(config: &Config, listener: Box<dyn Listener>, launcher: L, checker: C) -> Self {
        let config = config.clone().normalized();
        Self {
            listener,
            launcher,
            checker,
            pool: WorkerPool::new(config.max_workers),
            exited: HashSet::new(),
            session: None,
            listener_poll_interval: config.listener_poll_interval,
            worker_spawn_stagger: config.worker_spawn_stagger,
            initial_worker_burst: config.initial_worker_burst,
            health_check_enabled: config.health_check_enabled,
        }
    }

    pub fn state(&self) -> State {
        match self.session {
            Some(_) => State::Dispatching,
            None => State::Idle,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn session(&self) -> Option<&DispatchSession> {
        self.session.as_ref()
    }

    /// Runs until the process is killed.
    pub fn run(&mut self) -> ! {
        info!(
            "Worker manager listening (max workers: {}, initial burst: {})",
            self.pool.max_workers(),
            self.initial_worker_burst
        );
        loop {
            let pause = self.tick();
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
    }

    /// One iteration of the listener loop. Returns how long to sleep before the next one.
    pub fn tick(&mut self) -> Duration {
        let reaped = self.launcher.reap();
        self.exited.extend(
            reaped
                .into_iter()
                .filter(|pid| self.pool.slots().any(|slot| slot.pid == *pid)),
        );

        if !self.listener.has_work() {
            self.finish_session();
            return self.listener_poll_interval;
        }

        if self.session.is_none() {
            self.start_session();
        }

        if self.pool.is_saturated() {
            if self.health_check_enabled {
                self.respawn_dead_workers();
            }
        } else {
            let slot = self.pool.next_slot_id();
            self.spawn(slot);
        }
        self.worker_spawn_stagger
    }

    fn start_session(&mut self) {
        self.session = Some(DispatchSession {
            started_at: Instant::now(),
            worker_count: 0,
        });
        info!("Worker manager start dispatch");

        // the regular spawn step of this tick adds the last worker of the burst
        for _ in 1..self.initial_worker_burst {
            let slot = self.pool.next_slot_id();
            self.spawn(slot);
        }
    }

    fn finish_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.clear();
            self.exited.clear();
            info!(
                "Worker manager stop dispatch, total cost: {:.2}s, workers started: {}",
                session.started_at.elapsed().as_secs_f64(),
                session.worker_count
            );
        }
    }

    fn spawn(&mut self, slot: u32) {
        match self.launcher.launch(slot) {
            Ok(pid) => {
                self.pool.insert(WorkerSlot { id: slot, pid });
                self.count_started_worker();
                info!("Worker #{} dispatched as pid {}", slot, pid);
            }
            Err(err) => error!("failed to start worker #{}: {}", slot, err),
        }
    }

    fn respawn_dead_workers(&mut self) {
        let dead: Vec<WorkerSlot> = self
            .pool
            .slots()
            // a reaped pid may already belong to an unrelated process
            .filter(|slot| {
                self.exited.contains(&slot.pid) || !self.checker.is_alive(slot.pid)
            })
            .collect();

        for slot in dead {
            match self.launcher.launch(slot.id) {
                Ok(pid) => {
                    self.pool.replace(slot.id, pid);
                    self.exited.remove(&slot.pid);
                    self.count_started_worker();
                    info!(
                        "Worker #{} (pid {}) is gone, respawned as pid {}",
                        slot.id, slot.pid, pid
                    );
                }
                Err(err) => error!("failed to respawn worker #{}: {}", slot.id, err),
            }
        }
    }

    fn count_started_worker(&mut self) {
        if let Some(session) = &mut self.session {
            session.worker_count += 1;
        }
    }
}

#[cfg(test)]
mod tests;
