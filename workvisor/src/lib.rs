// SPDX-License-Identifier: MIT
// workvisor: background job supervisor without a message broker
//
// - `listen`: polls the host's "has work" probe and keeps a bounded pool of
//   worker processes busy, respawning dead ones.
// - `work <slot>`: one worker process, consuming units until the queue is empty.
// - `launch <listen|work>`: starts an action in the background unless it already runs.
// - `single`: one exclusive consumer, guarded by a lease file.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! A host application supplies its callbacks and hands over control:
//!
//! ```no_run
//! use workvisor::cli::{self, App};
//!
//! fn main() {
//!     let app = App::new()
//!         .listener(|| std::path::Path::new("/var/spool/jobs/next").exists())
//!         .worker(|| false)
//!         .single(|| false);
//!     std::process::exit(cli::run(app));
//! }
//! ```

pub mod capability;
pub mod checker;
pub mod cli;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod launcher;
pub mod logging;
pub mod single;
pub mod worker;

pub use capability::{Listener, Worker};
pub use config::Config;
pub use error::SupervisorError;
