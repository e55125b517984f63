// src/system/executor.rs

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Could not open output log '{path}'")]
    OutputLog {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command '{command}' timed out after {seconds:.1}s.")]
    TimedOut { command: String, seconds: f64 },
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs one test command to completion (or until `timeout` elapses).
///
/// Returns the exit code, or `None` when the process was ended by a signal. Output goes
/// to `output_log` when given, otherwise to the launcher's own stdout/stderr.
pub fn run_test_command(
    command_line: &str,
    cwd: &Path,
    env_vars: &HashMap<String, String>,
    timeout: Option<Duration>,
    output_log: Option<&Path>,
) -> Result<Option<i32>, ExecutionError> {
    let trimmed_command = command_line.trim();
    if trimmed_command.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }

    let parts = shlex::split(trimmed_command)
        .ok_or_else(|| ExecutionError::CommandParse(trimmed_command.to_string()))?;
    let Some((program, args)) = parts.split_first() else {
        return Err(ExecutionError::EmptyCommand);
    };
    let clean_cwd = dunce::simplified(cwd);

    let spawn = |cmd: &mut StdCommand| -> Result<Child, ExecutionError> {
        let (stdout, stderr) = output_streams(output_log)?;
        cmd.current_dir(clean_cwd)
            .envs(env_vars)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(trimmed_command.to_string(), e))
    };

    let mut command = StdCommand::new(program);
    command.args(args);

    // Windows built-ins like `echo` only exist inside `cmd`.
    let mut child = match spawn(&mut command) {
        Ok(child) => child,
        Err(ExecutionError::CommandFailed(_, e))
            if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") =>
        {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
            let mut fallback = StdCommand::new("cmd");
            fallback.arg("/C").arg(trimmed_command);
            spawn(&mut fallback)?
        }
        Err(e) => return Err(e),
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.code()),
            Ok(None) => {
                if let Some(limit) = timeout {
                    if started.elapsed() >= limit {
                        log::debug!(
                            "Timeout reached, killing child process (PID: {})...",
                            child.id()
                        );
                        if let Err(e) = child.kill() {
                            log::warn!("Failed to kill child process {}: {}", child.id(), e);
                        }
                        child.wait().ok();
                        return Err(ExecutionError::TimedOut {
                            command: trimmed_command.to_string(),
                            seconds: limit.as_secs_f64(),
                        });
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(ExecutionError::CommandFailed(
                    trimmed_command.to_string(),
                    e,
                ));
            }
        }
    }
}

fn output_streams(output_log: Option<&Path>) -> Result<(Stdio, Stdio), ExecutionError> {
    let Some(path) = output_log else {
        return Ok((Stdio::inherit(), Stdio::inherit()));
    };
    let log_error = |source| ExecutionError::OutputLog {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(log_error)?;
    let clone = file.try_clone().map_err(log_error)?;
    Ok((Stdio::from(file), Stdio::from(clone)))
}
