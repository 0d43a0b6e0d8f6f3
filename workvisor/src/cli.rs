// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use crate::capability::{Listener, Worker};
use crate::checker::default_checker;
use crate::command::{Action, CommandBuilder, CurrentExe};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SupervisorError};
use crate::guard::LaunchGuard;
use crate::launcher::ProcessLauncher;
use crate::logging;
use crate::single::SingleRunner;
use crate::worker::WorkerRunner;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append log lines to this file (overrides `log_path` of the configuration)
    #[arg(long = "log-path", global = true, value_name = "FILE")]
    pub log_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Watch for work and keep a bounded pool of workers busy
    Listen,
    /// Process units until there is no work left
    Work {
        /// Slot number assigned by the listener
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        slot: u32,
    },
    /// Start `listen` or `work` in the background unless it is already running
    Launch {
        #[arg(value_enum)]
        action: Action,
    },
    /// Run as the only consumer, guarded by a lease file
    Single {
        /// Ignore a valid lease of another process
        #[arg(long)]
        force: bool,
    },
}

/// The host application: its callbacks plus optional overrides.
#[derive(Default)]
pub struct App {
    listener: Option<Box<dyn Listener>>,
    worker: Option<Box<dyn Worker>>,
    single: Option<Box<dyn Worker>>,
    command_builder: Option<Box<dyn CommandBuilder>>,
    config: Option<Config>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(mut self, listener: impl Listener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn worker(mut self, worker: impl Worker + 'static) -> Self {
        self.worker = Some(Box::new(worker));
        self
    }

    pub fn single(mut self, single: impl Worker + 'static) -> Self {
        self.single = Some(Box::new(single));
        self
    }

    /// Replaces the default, which re-invokes the current executable.
    pub fn command_builder(mut self, builder: impl CommandBuilder + 'static) -> Self {
        self.command_builder = Some(Box::new(builder));
        self
    }

    /// Used when no `--config` is given on the command line.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }
}

/// Parses the command line, runs the chosen action and returns the exit code.
pub fn run(app: App) -> i32 {
    run_with_args(app, Args::parse())
}

pub fn run_with_args(app: App, args: Args) -> i32 {
    match execute(app, args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err}");
            err.exit_code()
        }
    }
}

fn execute(mut app: App, args: Args) -> Result<()> {
    let mut config = match (&args.config, app.config.take()) {
        (Some(path), _) => Config::from_file(path)?,
        (None, Some(config)) => config,
        (None, None) => Config::default(),
    };
    if args.log_path.is_some() {
        config.log_path = args.log_path.clone();
    }
    let config = config.normalized();

    match args.command {
        Cmd::Listen => {
            let listener = app.listener.take().ok_or(SupervisorError::MissingCapability {
                action: "listen",
                capability: "has_work",
            })?;
            if app.worker.is_none() {
                return Err(SupervisorError::MissingCapability {
                    action: "listen",
                    capability: "process_unit",
                });
            }
            logging::init(config.log_path.as_deref())?;
            let builder = command_builder(&mut app, &args)?;
            let launcher = ProcessLauncher::new(builder, config.log_path.clone());
            Dispatcher::new(&config, listener, launcher, default_checker()).run()
        }
        Cmd::Work { slot } => {
            let mut worker = app.worker.take().ok_or(SupervisorError::MissingCapability {
                action: "work",
                capability: "process_unit",
            })?;
            // stdout already points to the log file when started by a listener
            logging::init(None)?;
            WorkerRunner::new(slot, config.worker_poll_interval).run(worker.as_mut());
            Ok(())
        }
        Cmd::Launch { action } => {
            logging::init(None)?;
            let builder = command_builder(&mut app, &args)?;
            let pid = LaunchGuard::new(builder.as_ref(), config.log_path.as_deref()).launch(action)?;
            info!("{} started in the background as pid {}", action.as_str(), pid);
            Ok(())
        }
        Cmd::Single { force } => {
            let mut single = app.single.take().ok_or(SupervisorError::MissingCapability {
                action: "single",
                capability: "process_single",
            })?;
            logging::init(config.log_path.as_deref())?;
            SingleRunner::new(&config).run(single.as_mut(), force)?;
            Ok(())
        }
    }
}

fn command_builder(app: &mut App, args: &Args) -> Result<Box<dyn CommandBuilder>> {
    match app.command_builder.take() {
        Some(builder) => Ok(builder),
        None => Ok(Box::new(CurrentExe::forwarding(
            args.config.as_ref(),
            args.log_path.as_ref(),
        )?)),
    }
}
