// src/cli/parser.rs

//! Turns launcher tokens into validated commands.
//!
//! A token `-name` (a letter after the dash) starts a command and the tokens up to the
//! next command are its arguments. `@file` splices in the commands of a command file.

use crate::constants::MAX_COMMAND_FILE_DEPTH;
use crate::core::commands::{Command, CommandError};
use crate::core::paths::{self, PathError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Run with --help to list the commands.")]
    UnknownCommand(String),

    #[error("Argument '{0}' does not belong to any command.")]
    UnexpectedToken(String),

    #[error("{command} expects {expected}, got {found}.")]
    Arity {
        command: &'static str,
        expected: String,
        found: usize,
    },

    #[error("Invalid arguments for {command}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },

    #[error("Invalid command file reference '{token}'")]
    CommandFilePath {
        token: String,
        #[source]
        source: PathError,
    },

    #[error("Cannot read command file '{}'", path.display())]
    CommandFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command file '{}', line {line}: unbalanced quotes.", path.display())]
    CommandFileSyntax { path: PathBuf, line: usize },

    #[error("Command file '{}' is nested more than {max} levels deep.", path.display())]
    CommandFileTooDeep { path: PathBuf, max: u32 },
}

/// Defines a launcher command, its aliases, its arity and how to build it.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    min_args: usize,
    max_args: usize,
    build: fn(&[String]) -> Result<Command, CommandError>,
}

impl CommandDefinition {
    fn expected(&self) -> String {
        match (self.min_args, self.max_args) {
            (0, 0) => "no arguments".to_string(),
            (min, max) if min == max => format!("{} argument(s)", min),
            (min, usize::MAX) => format!("at least {} argument(s)", min),
            (min, max) => format!("{} to {} arguments", min, max),
        }
    }
}

fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or_default()
}

/// The single source of truth for all launcher commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "testsuite",
        aliases: &["ts"],
        min_args: 1,
        max_args: 1,
        build: |args| Command::test_suite(arg(args, 0)),
    },
    CommandDefinition {
        name: "workdir",
        aliases: &["wd"],
        min_args: 1,
        max_args: 1,
        build: |args| Command::work_dir(arg(args, 0), false),
    },
    CommandDefinition {
        name: "create-workdir",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        build: |args| Command::work_dir(arg(args, 0), true),
    },
    CommandDefinition {
        name: "config",
        aliases: &["cfg"],
        min_args: 1,
        max_args: 1,
        build: |args| Command::config(arg(args, 0)),
    },
    CommandDefinition {
        name: "open",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        build: |args| Command::open(arg(args, 0)),
    },
    CommandDefinition {
        name: "set",
        aliases: &[],
        min_args: 2,
        max_args: 2,
        build: |args| Command::set(arg(args, 0), arg(args, 1)),
    },
    CommandDefinition {
        name: "concurrency",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        build: |args| Command::concurrency(arg(args, 0)),
    },
    CommandDefinition {
        name: "timeout-factor",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        build: |args| Command::timeout_factor(arg(args, 0)),
    },
    CommandDefinition {
        name: "tests",
        aliases: &[],
        min_args: 1,
        max_args: usize::MAX,
        build: Command::tests,
    },
    CommandDefinition {
        name: "run",
        aliases: &["runtests"],
        min_args: 0,
        max_args: 0,
        build: |_| Ok(Command::run_tests()),
    },
    CommandDefinition {
        name: "write-config",
        aliases: &[],
        min_args: 1,
        max_args: 1,
        build: |args| Command::write_config(arg(args, 0)),
    },
    CommandDefinition {
        name: "report",
        aliases: &[],
        min_args: 0,
        max_args: 1,
        build: |args| Command::report(args.first().map(String::as_str)),
    },
];

/// Finds a command definition by its name or one of its aliases (without the dash).
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|def| def.name == name || def.aliases.contains(&name))
}

/// A dash followed by a letter. `-1` or `-` alone are arguments.
fn command_name(token: &str) -> Option<&str> {
    let name = token.strip_prefix('-')?;
    name.chars()
        .next()
        .filter(char::is_ascii_alphabetic)
        .map(|_| name)
}

/// Parses the launcher tokens into commands, in order.
pub fn parse_args(tokens: &[String]) -> Result<Vec<Command>, ParseError> {
    let tokens = expand_command_files(tokens, None, 0)?;

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for token in tokens {
        if command_name(&token).is_some() {
            groups.push((token, Vec::new()));
        } else if let Some((_, args)) = groups.last_mut() {
            args.push(token);
        } else {
            return Err(ParseError::UnexpectedToken(token));
        }
    }

    groups
        .into_iter()
        .map(|(token, args)| build_command(&token, &args))
        .collect()
}

fn build_command(token: &str, args: &[String]) -> Result<Command, ParseError> {
    let definition = command_name(token)
        .and_then(find_command)
        .ok_or_else(|| ParseError::UnknownCommand(token.to_string()))?;

    if args.len() < definition.min_args || args.len() > definition.max_args {
        return Err(ParseError::Arity {
            command: definition.name,
            expected: definition.expected(),
            found: args.len(),
        });
    }

    let command = (definition.build)(args).map_err(|source| ParseError::Command {
        command: token.to_string(),
        source,
    })?;
    log::trace!("Parsed command: {}", command);
    Ok(command)
}

/// Replaces every `@file` token with the tokens of that file. Paths inside a command file
/// are relative to the file that names them.
fn expand_command_files(
    tokens: &[String],
    including_file: Option<&Path>,
    depth: u32,
) -> Result<Vec<String>, ParseError> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        let Some(reference) = token.strip_prefix('@').filter(|r| !r.is_empty()) else {
            expanded.push(token.clone());
            continue;
        };

        let raw_path = paths::expand_path(reference).map_err(|source| ParseError::CommandFilePath {
            token: token.clone(),
            source,
        })?;
        let path = match including_file {
            Some(file) => paths::resolve_relative_to_file(file, &raw_path),
            None => raw_path,
        };
        if depth >= MAX_COMMAND_FILE_DEPTH {
            return Err(ParseError::CommandFileTooDeep {
                path,
                max: MAX_COMMAND_FILE_DEPTH,
            });
        }

        let file_tokens = read_command_file(&path)?;
        log::debug!(
            "Read {} token(s) from command file '{}'",
            file_tokens.len(),
            path.display()
        );
        expanded.extend(expand_command_files(&file_tokens, Some(&path), depth + 1)?);
    }
    Ok(expanded)
}

fn read_command_file(path: &Path) -> Result<Vec<String>, ParseError> {
    let content = fs::read_to_string(path).map_err(|source| ParseError::CommandFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tokens = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let words = shlex::split(trimmed).ok_or_else(|| ParseError::CommandFileSyntax {
            path: path.to_path_buf(),
            line: index + 1,
        })?;
        tokens.extend(words);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_groups_arguments_by_command() {
        let commands = parse_args(&tokens(&[
            "-ts", "/ts/root", "-wd", "/wd", "-set", "tests", "api/.*", "-run",
        ]))
        .unwrap();
        let names: Vec<_> = commands.iter().map(Command::name).collect();
        assert_eq!(names, vec!["-testsuite", "-workdir", "-set", "-run"]);
    }

    #[test]
    fn test_negative_numbers_are_arguments() {
        let err = parse_args(&tokens(&["-timeout-factor", "-1"])).unwrap_err();
        assert!(matches!(err, ParseError::Command { .. }));
    }

    #[test]
    fn test_unknown_and_stray_tokens() {
        assert!(matches!(
            parse_args(&tokens(&["-frobnicate"])),
            Err(ParseError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse_args(&tokens(&["stray", "-run"])),
            Err(ParseError::UnexpectedToken(_))
        ));
    }

    #[test]
    fn test_arity_is_checked() {
        assert!(matches!(
            parse_args(&tokens(&["-set", "only-key"])),
            Err(ParseError::Arity { command: "set", found: 1, .. })
        ));
        assert!(matches!(
            parse_args(&tokens(&["-run", "extra"])),
            Err(ParseError::Arity { command: "run", .. })
        ));
        assert_eq!(parse_args(&tokens(&["-report"])).unwrap().len(), 1);
    }

    #[test]
    fn test_construction_errors_are_reported_before_execution() {
        let err = parse_args(&tokens(&["-ts", "/ts", "-concurrency", "0"])).unwrap_err();
        match err {
            ParseError::Command { command, .. } => assert_eq!(command, "-concurrency"),
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_command_files_are_spliced_and_nested() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("inner.cmd"),
            "# nested\n-set note 'two words'\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("outer.cmd"),
            "-ts /ts/root\n\n@inner.cmd\n-concurrency 2\n",
        )
        .unwrap();

        let outer = format!("@{}", tmp.path().join("outer.cmd").display());
        let commands = parse_args(&tokens(&[&outer, "-run"])).unwrap();
        let rendered: Vec<_> = commands.iter().map(Command::to_string).collect();
        assert_eq!(
            rendered,
            vec!["-testsuite /ts/root", "-set note two words", "-concurrency 2", "-run"]
        );
    }

    #[test]
    fn test_recursive_command_file_is_cut_off() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("loop.cmd"), "@loop.cmd\n").unwrap();
        let token = format!("@{}", tmp.path().join("loop.cmd").display());
        assert!(matches!(
            parse_args(&tokens(&[&token])),
            Err(ParseError::CommandFileTooDeep { .. })
        ));
    }

    #[test]
    fn test_command_file_with_bad_quotes() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.cmd"), "-ts /ts\n-set a 'open\n").unwrap();
        let token = format!("@{}", tmp.path().join("bad.cmd").display());
        assert!(matches!(
            parse_args(&tokens(&[&token])),
            Err(ParseError::CommandFileSyntax { line: 2, .. })
        ));
    }
}
