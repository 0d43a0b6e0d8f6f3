// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Exclusive consumer guarded by a lease file.
//!
//! The lease is renewed after every unit and expires
//! `single_poll_interval + single_lease_timeout` after the last renewal, so a
//! crashed consumer blocks new ones only for that long. A unit that takes
//! longer than `single_lease_timeout` lets a second consumer start; this is
//! logged but not prevented.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use time::OffsetDateTime;

use crate::capability::Worker;
use crate::config::Config;
use crate::error::{Result, SupervisorError};

pub mod lease;

pub use lease::{Lease, LeaseStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleReport {
    pub units: u64,
    pub elapsed: Duration,
}

pub struct SingleRunner {
    store: LeaseStore,
    owner: u32,
    poll_interval: Duration,
    lease_timeout: Duration,
}

impl SingleRunner {
    pub fn new(config: &Config) -> Self {
        Self::with_store(LeaseStore::new(&config.lease_dir(), &config.identity()), config)
    }

    pub fn with_store(store: LeaseStore, config: &Config) -> Self {
        Self {
            store,
            owner: std::process::id(),
            poll_interval: config.single_poll_interval,
            lease_timeout: config.single_lease_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_owner(mut self, owner: u32) -> Self {
        self.owner = owner;
        self
    }

    pub fn store(&self) -> &LeaseStore {
        &self.store
    }

    pub fn lease_validity(&self) -> Duration {
        self.poll_interval.saturating_add(self.lease_timeout)
    }

    /// Takes the lease unless another owner holds a valid one (or `force` is set).
    ///
    /// The returned guard deletes the lease when dropped.
    pub fn acquire(&self, force: bool, now: OffsetDateTime) -> Result<LeaseGuard<'_>> {
        if !force {
            match self.store.read() {
                Ok(Some(lease)) if lease.is_valid_at(now) => {
                    return Err(SupervisorError::AlreadyRunning {
                        path: self.store.path().to_path_buf(),
                        owner: lease.owner,
                        expires_at: lease.expires_at,
                    });
                }
                Ok(Some(lease)) => info!(
                    "taking over expired lease of pid {} (expired at {})",
                    lease.owner, lease.expires_at
                ),
                Ok(None) => {}
                Err(err) => warn!("ignoring unreadable lease: {}", err),
            }
        }

        self.renew(now)?;
        Ok(LeaseGuard {
            store: &self.store,
            owner: self.owner,
        })
    }

    pub fn renew(&self, now: OffsetDateTime) -> Result<Lease> {
        let expires_at = time::Duration::try_from(self.lease_validity())
            .ok()
            .and_then(|validity| now.checked_add(validity))
            .ok_or(SupervisorError::Setting {
                name: "single_lease_timeout",
                reason: "lease expiry is out of range".to_string(),
            })?;
        let lease = Lease {
            owner: self.owner,
            expires_at,
        };
        self.store.write(&lease)?;
        Ok(lease)
    }

    pub fn run(&self, consumer: &mut dyn Worker, force: bool) -> Result<SingleReport> {
        let started_at = Instant::now();
        let _guard = self.acquire(force, OffsetDateTime::now_utc())?;
        info!(
            "Single consumer started (pid {}, lock {})",
            self.owner,
            self.store.path().display()
        );

        let mut units = 0;
        loop {
            let unit_started_at = Instant::now();
            if !consumer.process_unit() {
                break;
            }
            units += 1;
            let unit_time = unit_started_at.elapsed();
            if unit_time > self.lease_timeout {
                warn!(
                    "unit took {:.2}s, longer than the lease timeout of {:.2}s",
                    unit_time.as_secs_f64(),
                    self.lease_timeout.as_secs_f64()
                );
            }
            if !self.poll_interval.is_zero() {
                thread::sleep(self.poll_interval);
            }
            self.renew(OffsetDateTime::now_utc())?;
        }

        let report = SingleReport {
            units,
            elapsed: started_at.elapsed(),
        };
        info!(
            "Single consumer closed | units: {} | cost: {:.2}s",
            units,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}

/// Deletes the lease on drop, as long as it still belongs to us.
pub struct LeaseGuard<'a> {
    store: &'a LeaseStore,
    owner: u32,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        match self.store.read() {
            Ok(Some(lease)) if lease.owner != self.owner => {
                debug!("lease now belongs to pid {}, leaving it", lease.owner);
            }
            _ => {
                if let Err(err) = self.store.remove() {
                    warn!("failed to release lease: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn config(poll: u64, timeout: u64) -> Config {
        Config {
            single_poll_interval: Duration::from_secs(poll),
            single_lease_timeout: Duration::from_secs(timeout),
            ..Config::default()
        }
    }

    fn runner(dir: &std::path::Path, cfg: &Config, owner: u32) -> SingleRunner {
        SingleRunner::with_store(LeaseStore::new(dir, "jobs"), cfg).with_owner(owner)
    }

    #[test]
    fn lease_expires_poll_interval_plus_timeout_after_renewal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(2, 15);
        let t = datetime!(2026-10-19 10:00:00 UTC);

        let first = runner(dir.path(), &cfg, 100);
        let _held = first.acquire(false, t).unwrap();
        let lease = first.store().read().unwrap().unwrap();
        assert_eq!(lease.owner, 100);
        assert_eq!(lease.expires_at, datetime!(2026-10-19 10:00:17 UTC));

        let second = runner(dir.path(), &cfg, 200);
        match second.acquire(false, datetime!(2026-10-19 10:00:16 UTC)) {
            Err(SupervisorError::AlreadyRunning { owner, .. }) => assert_eq!(owner, 100),
            other => panic!("expected refusal, got {:?}", other.map(|_| ())),
        }

        let _taken_over = second
            .acquire(false, datetime!(2026-10-19 10:00:18 UTC))
            .unwrap();
        assert_eq!(second.store().read().unwrap().unwrap().owner, 200);
    }

    #[test]
    fn force_ignores_a_valid_lease() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(2, 15);
        let t = datetime!(2026-10-19 10:00:00 UTC);

        let first = runner(dir.path(), &cfg, 100);
        let _held = first.acquire(false, t).unwrap();
        let second = runner(dir.path(), &cfg, 200);
        let _forced = second.acquire(true, t).unwrap();
        assert_eq!(second.store().read().unwrap().unwrap().owner, 200);
    }

    #[test]
    fn guard_only_removes_its_own_lease() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(2, 15);
        let t = datetime!(2026-10-19 10:00:00 UTC);

        let first = runner(dir.path(), &cfg, 100);
        let held = first.acquire(false, t).unwrap();
        let second = runner(dir.path(), &cfg, 200);
        let forced = second.acquire(true, t).unwrap();

        drop(held);
        assert_eq!(first.store().read().unwrap().unwrap().owner, 200);
        drop(forced);
        assert_eq!(first.store().read().unwrap(), None);
    }

    #[test]
    fn unreadable_lease_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(2, 15);
        let single = runner(dir.path(), &cfg, 100);
        std::fs::write(single.store().path(), "not json").unwrap();
        let _held = single
            .acquire(false, datetime!(2026-10-19 10:00:00 UTC))
            .unwrap();
        assert_eq!(single.store().read().unwrap().unwrap().owner, 100);
    }

    #[test]
    fn lease_beyond_the_calendar_is_a_setting_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            single_lease_timeout: Duration::from_secs(20_000 * 366 * 24 * 3600),
            ..Config::default()
        };
        let single = runner(dir.path(), &cfg, 100);

        let err = single.acquire(false, OffsetDateTime::now_utc()).map(|_| ()).unwrap_err();
        assert!(matches!(err, SupervisorError::Setting { .. }), "{err}");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(single.store().read().unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_a_foreign_lease_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let single = runner(dir.path(), &config(2, 15), 100);
        std::fs::write(single.store().path(), "written by someone else").unwrap();
        // a directory in place of the temporary file makes the write fail
        let tmp = dir
            .path()
            .join(format!("jobs.lock.{}.tmp", std::process::id()));
        std::fs::create_dir(&tmp).unwrap();
        std::fs::write(tmp.join("keep"), "").unwrap();

        assert!(single.acquire(false, OffsetDateTime::now_utc()).is_err());
        assert_eq!(
            std::fs::read_to_string(single.store().path()).unwrap(),
            "written by someone else"
        );
    }

    #[test]
    fn run_renews_while_working_and_releases_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            single_poll_interval: Duration::ZERO,
            single_lease_timeout: Duration::from_secs(15),
            ..Config::default()
        };
        let single = runner(dir.path(), &cfg, std::process::id());
        let store = single.store().clone();

        let mut seen = Vec::new();
        let mut remaining = 3;
        let mut consumer = || {
            seen.push(store.read().unwrap().map(|l| l.owner));
            remaining -= 1;
            remaining > 0
        };
        let report = single.run(&mut consumer, false).unwrap();

        assert_eq!(report.units, 2);
        assert_eq!(seen, vec![Some(std::process::id()); 3]);
        assert_eq!(single.store().read().unwrap(), None);
    }

    #[test]
    fn run_refuses_while_another_lease_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(1, 15);
        let other = runner(dir.path(), &cfg, 1);
        let _held = other.acquire(false, OffsetDateTime::now_utc()).unwrap();

        let single = runner(dir.path(), &cfg, 2);
        let mut calls = 0;
        let mut consumer = || {
            calls += 1;
            false
        };
        let err = single.run(&mut consumer, false).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(calls, 0);
        // the existing lease is untouched
        assert_eq!(other.store().read().unwrap().unwrap().owner, 1);
    }
}
