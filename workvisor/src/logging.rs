// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Line oriented logging: `<YYYY-MM-DD HH:MM:SS> - <message>`.
//!
//! Everything goes through the `log` facade. `init` installs an env_logger
//! whose target is a tee writing to stdout and, if configured, appending to a
//! log file.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Env, Target, WriteStyle};
use log::Level;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::error::{Result, SupervisorError};

pub fn timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_default()
}

/// Current time in the local offset, UTC when it cannot be determined.
pub fn now_local() -> OffsetDateTime {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

pub fn format_line(at: OffsetDateTime, level: Level, message: impl Display) -> String {
    match level {
        Level::Error | Level::Warn => format!("{} - {}: {}", timestamp(at), level, message),
        _ => format!("{} - {}", timestamp(at), message),
    }
}

/// Opens `path` for appending, creating it if needed.
pub fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SupervisorError::LogPath {
            path: path.to_path_buf(),
            source,
        })
}

struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        Ok(())
    }
}

/// Installs the process wide logger. `RUST_LOG` overrides the `info` default.
///
/// Must run before any thread is spawned, otherwise the local UTC offset
/// cannot be determined and timestamps fall back to UTC.
pub fn init(log_path: Option<&Path>) -> Result<()> {
    let file = log_path.map(open_log_file).transpose()?;
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder
        .format(move |buf, record| {
            let now = OffsetDateTime::now_utc().to_offset(offset);
            writeln!(buf, "{}", format_line(now, record.level(), record.args()))
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(Tee { file })));

    // a host that already installed a logger keeps it
    if builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
    Ok(())
}
