// src/bin/suiterun.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use suiterun::{
    cli::{Cli, parser},
    constants::EXIT_FAULT,
    core::{
        backend::FsBackend,
        command_queue::Executor,
        commands::Command,
        session::Session,
        settings::{self, Settings},
    },
    state::History,
    t,
};

/// The main entry point of the `suiterun` launcher.
/// It sets up logging, parses the command line, runs the command queue,
/// and turns the outcome into the process exit status.
fn main() {
    env_logger::init();

    match run_cli(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(EXIT_FAULT);
        }
    }
}

/// Builds every command up front, so a malformed argument aborts before anything runs.
fn run_cli(cli: Cli) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);

    if cli.args.is_empty() {
        Cli::command().print_help()?;
        return Ok(0);
    }

    let commands = parser::parse_args(&cli.args)?;
    let settings = settings::load_settings().context(t!("settings.error.load"))?;
    let history = load_history(&settings);

    let mut executor = Executor::new(Session::new(
        Box::new(FsBackend::new()),
        settings,
        history,
    ));
    executor.add_commands(commands);
    executor.set_auto_run_command(Some(Command::run_tests()));

    let outcome = executor.run_all();

    for warning in executor.session_mut().resolver_mut().take_warnings() {
        eprintln!("{}: {}", "Warning".yellow().bold(), warning);
    }

    let exit_code = executor.run_statistics().exit_code();
    if let Some(history) = executor.into_session().finish() {
        if let Err(e) = history.save() {
            log::warn!("Could not save the work directory history: {}", e);
        }
    }

    outcome?;
    Ok(exit_code)
}

/// The history is a convenience; a broken file only costs the default work directory.
fn load_history(settings: &Settings) -> Option<History> {
    if !settings.remember_work_dirs {
        return None;
    }
    match History::load() {
        Ok(history) => Some(history),
        Err(e) => {
            log::warn!("Ignoring the work directory history: {}", e);
            None
        }
    }
}
