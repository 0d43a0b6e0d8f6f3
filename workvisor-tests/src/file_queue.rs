// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! A job queue made of files, so several worker processes can share it.
//!
//! `pending/` holds jobs, a worker claims one by renaming it into `claimed/`
//! (rename is atomic, exactly one worker wins) and moves it to `done/` when
//! finished. The content of a finished job is the pid that processed it.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Claimed,
    Done,
}

impl JobState {
    fn dir_name(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Claimed => "claimed",
            JobState::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileQueue {
    root: PathBuf,
}

impl FileQueue {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let queue = Self { root: root.into() };
        for state in [JobState::Pending, JobState::Claimed, JobState::Done] {
            fs::create_dir_all(queue.dir(state))?;
        }
        Ok(queue)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, state: JobState) -> PathBuf {
        self.root.join(state.dir_name())
    }

    pub fn enqueue(&self, count: usize) -> io::Result<Vec<String>> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let name = format!("job-{}-{:04}", stamp, i);
            fs::File::create(self.dir(JobState::Pending).join(&name))?;
            names.push(name);
        }
        Ok(names)
    }

    pub fn list(&self, state: JobState) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(self.dir(state))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn count(&self, state: JobState) -> usize {
        self.list(state).map(|names| names.len()).unwrap_or(0)
    }

    pub fn has_work(&self) -> bool {
        self.count(JobState::Pending) > 0
    }

    /// Moves the oldest pending job to `claimed/`. `None` once the queue is empty.
    pub fn claim(&self) -> io::Result<Option<String>> {
        for name in self.list(JobState::Pending)? {
            let from = self.dir(JobState::Pending).join(&name);
            let to = self.dir(JobState::Claimed).join(&name);
            match fs::rename(&from, &to) {
                Ok(()) => return Ok(Some(name)),
                // another worker was faster
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    pub fn complete(&self, name: &str) -> io::Result<()> {
        let claimed = self.dir(JobState::Claimed).join(name);
        let mut file = fs::OpenOptions::new().write(true).open(&claimed)?;
        writeln!(file, "{}", std::process::id())?;
        fs::rename(claimed, self.dir(JobState::Done).join(name))
    }

    /// Claims, "processes" (sleeps `job_time`) and completes one job.
    pub fn process_one(&self, job_time: Duration) -> bool {
        let result = self.claim().and_then(|claimed| match claimed {
            Some(name) => {
                thread::sleep(job_time);
                self.complete(&name).map(|_| true)
            }
            None => Ok(false),
        });
        result.unwrap_or_else(|err| {
            error!("file queue {}: {}", self.root.display(), err);
            false
        })
    }
}
