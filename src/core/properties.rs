// src/core/properties.rs
//
// Reader for bootstrap properties files: flat `key=value` text naming the test suite root.

use crate::core::backend::BackendError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

lazy_static! {
    // key, optional separator (`=`, `:` or whitespace), value.
    static ref PROPERTY_LINE_RE: Regex =
        Regex::new(r"^(?P<key>[^=:\s]+)(?:\s*[=:]\s*|\s+)?(?P<value>.*)$")
            .expect("static regex is valid");
}

/// Reads and parses a properties file.
///
/// # Errors
/// `BackendError::Io` when the file cannot be read as text and
/// `BackendError::MalformedProperties` for a line without a key or a dangling continuation.
pub fn load_properties(path: &Path) -> Result<BTreeMap<String, String>, BackendError> {
    let content = fs::read_to_string(path).map_err(|source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_properties(&content).map_err(|(line, reason)| BackendError::MalformedProperties {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

/// Parses properties text. On failure returns the 1-based line number and a reason.
pub fn parse_properties(content: &str) -> Result<BTreeMap<String, String>, (usize, String)> {
    let mut properties = BTreeMap::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim_start();

        let (start_line, mut logical) = match pending.take() {
            Some((start, text)) => (start, text),
            None => {
                if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                    continue;
                }
                (line_number, String::new())
            }
        };

        if ends_with_continuation(line) {
            logical.push_str(line.strip_suffix('\\').unwrap_or(line));
            pending = Some((start_line, logical));
            continue;
        }
        logical.push_str(line);

        let captures = PROPERTY_LINE_RE
            .captures(&logical)
            .ok_or_else(|| (start_line, "missing key".to_string()))?;
        let key = captures.name("key").map(|m| m.as_str()).unwrap_or_default();
        let value = captures.name("value").map(|m| m.as_str()).unwrap_or_default();
        properties.insert(unescape(key), unescape(value.trim_end()));
    }

    if let Some((start, _)) = pending {
        return Err((start, "line continuation reaches end of file".to_string()));
    }
    Ok(properties)
}

/// A line continues when it ends with an odd number of backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
