//! Rule source assembly.
//!
//! Turns rule source text into logical rule lines:
//!
//! - physical lines ending in `,` are joined with the next one (one space between);
//! - blank lines and `#` comments are skipped;
//! - set headers are expanded into the `=>`-led lines that follow them.
//!
//! ```text
//! greet Who, Who != null +> gold += 1      header "greet Who, Who != null", trailer "gold += 1"
//! => "Hi [Who]."                           greet Who, Who != null => "Hi [Who].", gold += 1
//! => "Hey, [Who]!"                         greet Who, Who != null => "Hey, [Who]!", gold += 1
//! ```

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// One assembled rule line and the physical line it started on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub number: usize,
    pub text: String,
}

#[derive(Debug, Default)]
struct SetHeader {
    prefix: String,
    trailer: String,
}

/// Assemble the logical rule lines of `source`. `origin` labels errors.
pub fn logical_lines(origin: &str, source: &str) -> Result<Vec<LogicalLine>> {
    let mut out = Vec::new();
    let mut header: Option<SetHeader> = None;
    let mut pending = String::new();
    let mut start = 0;

    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if pending.is_empty() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            start = index + 1;
        }

        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(line);
        if line.ends_with(',') {
            continue;
        }

        let text = std::mem::take(&mut pending);
        if let Some(line) = assemble(origin, start, text, &mut header)? {
            out.push(line);
        }
    }
    if !pending.is_empty() {
        if let Some(line) = assemble(origin, start, pending, &mut header)? {
            out.push(line);
        }
    }

    Ok(out)
}

fn assemble(origin: &str, number: usize, text: String, header: &mut Option<SetHeader>) -> Result<Option<LogicalLine>> {
    if let Some((prefix, trailer)) = text.split_once("+>") {
        trace!(origin, line = number, "set header with trailer");
        *header = Some(SetHeader { prefix: prefix.trim().to_string(), trailer: trailer.trim().to_string() });
        return Ok(None);
    }
    if !text.contains("=>") {
        trace!(origin, line = number, "set header");
        *header = Some(SetHeader { prefix: text, trailer: String::new() });
        return Ok(None);
    }

    if text.starts_with("=>") {
        let Some(active) = header.as_ref() else {
            let err = Error::rule(&text, "`=>` line without an active set header");
            return Err(Error::Load { origin: origin.to_string(), line: number, source: Box::new(err) });
        };
        let text = format!("{} {}, {}", active.prefix, text, active.trailer);
        return Ok(Some(LogicalLine { number, text }));
    }

    *header = None;
    Ok(Some(LogicalLine { number, text }))
}

pub fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}

/// The `*.hec` files directly inside `dir`, sorted by file name.
pub fn rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_error = |source| Error::Io { path: dir.to_path_buf(), source };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "hec") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
