// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Result, SupervisorError};

/// Ownership record of the single consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Lease {
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

/// A lease file at `<dir>/<identity>.lock`.
#[derive(Debug, Clone)]
pub struct LeaseStore {
    path: PathBuf,
}

impl LeaseStore {
    pub fn new(dir: &Path, identity: &str) -> Self {
        let name: String = identity
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
                _ => '_',
            })
            .collect();
        Self {
            path: dir.join(format!("{}.lock", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<Lease>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.error(err)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| self.error(e))
    }

    /// Replaces the lease. Readers see either the old or the new record, never a partial one.
    pub fn write(&self, lease: &Lease) -> Result<()> {
        let json = serde_json::to_string(lease).map_err(|e| self.error(e))?;
        let tmp = self.path.with_extension(format!("lock.{}.tmp", std::process::id()));
        let result = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.write_all(b"\n")?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            return Err(self.error(err));
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.error(err)),
        }
    }

    fn error(&self, reason: impl std::fmt::Display) -> SupervisorError {
        SupervisorError::Lease {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn lease_file_holds_owner_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeaseStore::new(dir.path(), "mail sender/1");
        assert_eq!(store.path(), dir.path().join("mail_sender_1.lock"));
        assert_eq!(store.read().unwrap(), None);

        let lease = Lease {
            owner: 4711,
            expires_at: datetime!(2026-10-19 10:00:17 UTC),
        };
        store.write(&lease).unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "{\"owner\":4711,\"expires_at\":\"2026-10-19T10:00:17Z\"}\n"
        );
        assert_eq!(store.read().unwrap(), Some(lease));

        store.remove().unwrap();
        assert_eq!(store.read().unwrap(), None);
        // removing twice is fine
        store.remove().unwrap();
    }

    #[test]
    fn validity_ends_at_expiry() {
        let lease = Lease {
            owner: 1,
            expires_at: datetime!(2026-10-19 10:00:17 UTC),
        };
        assert!(lease.is_valid_at(datetime!(2026-10-19 10:00:16 UTC)));
        assert!(!lease.is_valid_at(datetime!(2026-10-19 10:00:17 UTC)));
    }

    #[test]
    fn corrupt_lease_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LeaseStore::new(dir.path(), "jobs");
        fs::write(store.path(), "owner=12").unwrap();
        assert!(matches!(store.read(), Err(SupervisorError::Lease { .. })));
    }
}
