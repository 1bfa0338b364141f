//! `.env` file parsing
//!
//! Each non-blank, non-comment line is `KEY=VALUE`, optionally prefixed with
//! `export `. Values may be wrapped in single or double quotes; double-quoted
//! values understand `\n`, `\t`, `\"` and `\\`. Unquoted values end at ` #`.

use crate::error::{DotrunError, DotrunResult};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Read and parse an env file. A missing file yields `None`.
pub fn read_env_file(path: &Path) -> DotrunResult<Option<Vec<(String, String)>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DotrunError::io(
                format!("reading env file {}", path.display()),
                e,
            ))
        }
    };

    parse_env(&content, path).map(Some)
}

/// Parse env file contents; `path` is only used for error reporting
pub fn parse_env(content: &str, path: &Path) -> DotrunResult<Vec<(String, String)>> {
    let mut vars = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |reason: &str| DotrunError::Config {
            path: path.to_path_buf(),
            line: index + 1,
            reason: reason.to_string(),
        };

        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| malformed("expected KEY=VALUE"))?;

        let key = key.trim();
        if !is_valid_key(key) {
            return Err(malformed(&format!("invalid variable name '{}'", key)));
        }

        let value = parse_value(value.trim()).map_err(|reason| malformed(reason))?;
        vars.push((key.to_string(), value));
    }

    Ok(vars)
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_value(value: &str) -> Result<String, &'static str> {
    if let Some(rest) = value.strip_prefix('"') {
        let inner = rest.strip_suffix('"').ok_or("unterminated double quote")?;
        return Ok(unescape(inner));
    }

    if let Some(rest) = value.strip_prefix('\'') {
        let inner = rest.strip_suffix('\'').ok_or("unterminated single quote")?;
        return Ok(inner.to_string());
    }

    let value = match value.find(" #") {
        Some(pos) => value[..pos].trim_end(),
        None => value,
    };
    Ok(value.to_string())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
