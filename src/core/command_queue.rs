// src/core/command_queue.rs

use crate::core::backend::SuiteBackend;
use crate::core::commands::{Command, CommandError};
use crate::core::configuration::Configuration;
use crate::core::fault::ConfigFault;
use crate::core::session::Session;
use crate::core::settings::Settings;
use crate::core::suite::{TestSuite, WorkDirectory};
use crate::models::RunStatistics;
use std::sync::Arc;
use thiserror::Error;

/// A command that failed while the queue was running.
#[derive(Error, Debug)]
pub enum ExecutionFault {
    /// `index` is 1-based, in queue order.
    #[error("Command #{index} '{command}' failed")]
    CommandFailed {
        index: usize,
        command: String,
        #[source]
        cause: CommandError,
    },

    /// The fallback command ran and failed.
    #[error("Default command '{command}' failed")]
    AutoRunFailed {
        command: String,
        #[source]
        cause: CommandError,
    },
}

impl ExecutionFault {
    /// The command error behind this fault.
    pub fn cause(&self) -> &CommandError {
        match self {
            Self::CommandFailed { cause, .. } | Self::AutoRunFailed { cause, .. } => cause,
        }
    }
}

/// Runs queued commands in order against one session, then falls back to the auto-run
/// command when no action command was queued.
#[derive(Debug)]
pub struct Executor {
    session: Session,
    queue: Vec<Command>,
    auto_run: Option<Command>,
}

impl Executor {
    /// An executor over `session` with an empty queue.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            queue: Vec::new(),
            auto_run: None,
        }
    }

    /// An executor with default settings and no work directory history.
    pub fn with_backend(backend: Box<dyn SuiteBackend>) -> Self {
        Self::new(Session::new(backend, Settings::default(), None))
    }

    /// Appends a command to the queue.
    pub fn add_command(&mut self, command: Command) {
        self.queue.push(command);
    }

    /// Appends commands in order.
    pub fn add_commands(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.queue.extend(commands);
    }

    /// The command run when no action command was queued.
    pub fn set_auto_run_command(&mut self, command: Option<Command>) {
        self.auto_run = command;
    }

    /// The commands queued so far.
    pub fn queued(&self) -> &[Command] {
        &self.queue
    }

    /// Runs and drains the queue. The first failure stops the run; commands after it are
    /// dropped unexecuted.
    pub fn run_all(&mut self) -> Result<(), ExecutionFault> {
        let queue = std::mem::take(&mut self.queue);
        let mut ran_action = false;

        for (position, command) in queue.into_iter().enumerate() {
            ran_action |= command.is_action();
            command
                .execute(&mut self.session)
                .map_err(|cause| ExecutionFault::CommandFailed {
                    index: position + 1,
                    command: command.to_string(),
                    cause,
                })?;
        }

        if ran_action {
            return Ok(());
        }
        if let Some(auto_run) = &self.auto_run {
            log::debug!("No action command given; running '{}'", auto_run);
            auto_run
                .execute(&mut self.session)
                .map_err(|cause| ExecutionFault::AutoRunFailed {
                    command: auto_run.to_string(),
                    cause,
                })?;
        }
        Ok(())
    }

    /// The session's configuration, resolving it first if needed.
    pub fn configuration(&mut self) -> Result<&Configuration, ConfigFault> {
        self.session.resolver_mut().configuration()
    }

    /// The test suite of the session's configuration.
    pub fn test_suite(&mut self) -> Result<Arc<TestSuite>, ConfigFault> {
        self.session.resolver_mut().test_suite()
    }

    /// The work directory of the session's configuration, if any.
    pub fn work_directory(&mut self) -> Result<Option<Arc<WorkDirectory>>, ConfigFault> {
        self.session.resolver_mut().work_directory()
    }

    /// True when any location input was given or a configuration exists.
    pub fn has_configuration_inputs(&self) -> bool {
        self.session.resolver().has_configuration_inputs()
    }

    /// Outcome counts of the tests run so far.
    pub fn run_statistics(&self) -> &RunStatistics {
        self.session.statistics()
    }

    /// The session commands run against.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Gives the session back, for saving history.
    pub fn into_session(self) -> Session {
        self.session
    }
}
