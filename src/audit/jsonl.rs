//! JSONL decision log: append-only line-delimited JSON, one line per policy
//! decision.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! tailing process never sees a partial line. Degradation chain on write
//! failure: primary file, fallback file (RAM-backed by default), stderr with
//! a `[GK-AUDIT]` prefix, silent discard. A gate decision must never fail
//! because its audit line could not be written.

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── entry model ────────────────────

/// Gate operation a decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AccessPointBanCheck,
    IpBanCheck,
    ConsoleBanCheck,
    ProfileBanCheck,
    ConsoleRegistration,
    PendingConsoleCheck,
    AbuseCheck,
    GameAllowCheck,
    HardwareAddressCheck,
    /// Internal writer notices (e.g. dropped-entry reports).
    Audit,
}

/// Verdict of a gate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The request may proceed past this check.
    Allow,
    /// The check denied the request.
    Deny,
    /// The check failed; the session layer denies and logs.
    Error,
}

/// One decision line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Operation that produced the decision.
    pub operation: Operation,
    /// Verdict.
    pub verdict: Verdict,
    /// Identifier the check evaluated, when one was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Outcome detail (e.g. a registration outcome).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// GK error code when `verdict` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl DecisionEntry {
    /// New entry stamped with the current UTC time.
    #[must_use]
    pub fn new(operation: Operation, verdict: Verdict) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            operation,
            verdict,
            identifier: None,
            detail: None,
            error_code: None,
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }
}

// ──────────────────── writer ────────────────────

/// Configuration for the JSONL decision writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Fallback path on a different filesystem.
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file grows past this size.
    pub max_size_bytes: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/gatekeeper/decisions.jsonl"),
            fallback_path: Some(PathBuf::from("/dev/shm/gatekeeper-decisions.jsonl")),
            max_size_bytes: 64 * 1024 * 1024,
        }
    }
}

enum Sink {
    File { writer: BufWriter<File>, path: PathBuf },
    Stderr,
    Discard,
}

/// Append-only JSONL writer with rotation and multi-level fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    on_fallback: bool,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the decision log, falling through the degradation chain.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let (sink, on_fallback, bytes_written) = initial_sink(&config);
        Self {
            config,
            sink,
            on_fallback,
            bytes_written,
        }
    }

    /// Serialize and append one decision as a single atomic line.
    pub fn write_entry(&mut self, entry: &DecisionEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[GK-AUDIT] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Flush buffered lines and sync file contents.
    pub fn sync(&mut self) {
        if let Sink::File { writer, .. } = &mut self.sink {
            let _ = writer.flush();
            let _ = writer.get_ref().sync_data();
        }
    }

    /// Degradation state label for diagnostics.
    #[must_use]
    pub fn state(&self) -> &'static str {
        match &self.sink {
            Sink::File { .. } if self.on_fallback => "fallback",
            Sink::File { .. } => "normal",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.bytes_written + line.len() as u64 > self.config.max_size_bytes {
            self.rotate();
        }

        match &mut self.sink {
            Sink::File { writer, .. } => {
                if writer.write_all(line.as_bytes()).is_ok() {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            Sink::Stderr => {
                let _ = write!(io::stderr(), "[GK-AUDIT] {line}");
            }
            Sink::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.sink = match std::mem::replace(&mut self.sink, Sink::Discard) {
            Sink::File { .. } if !self.on_fallback => {
                match self.config.fallback_path.as_deref().and_then(open_append) {
                    Some((writer, size, path)) => {
                        let _ = writeln!(
                            io::stderr(),
                            "[GK-AUDIT] primary log failed, using fallback: {}",
                            path.display()
                        );
                        self.on_fallback = true;
                        self.bytes_written = size;
                        Sink::File { writer, path }
                    }
                    None => {
                        let _ = writeln!(io::stderr(), "[GK-AUDIT] log paths failed, using stderr");
                        Sink::Stderr
                    }
                }
            }
            Sink::File { .. } => {
                let _ = writeln!(io::stderr(), "[GK-AUDIT] fallback write failed, using stderr");
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }

    fn rotate(&mut self) {
        let Sink::File { writer, path } = &mut self.sink else {
            return;
        };
        let _ = writer.flush();
        let rotated = rotated_name(path);
        let _ = std::fs::rename(&*path, &rotated);
        let reopened = open_append(path);
        let path = path.clone();
        match reopened {
            Some((writer, size, path)) => {
                self.bytes_written = size;
                self.sink = Sink::File { writer, path };
            }
            None => {
                let _ = writeln!(
                    io::stderr(),
                    "[GK-AUDIT] reopen after rotation failed: {}",
                    path.display()
                );
                self.degrade();
            }
        }
    }
}

fn initial_sink(config: &JsonlConfig) -> (Sink, bool, u64) {
    if let Some((writer, size, path)) = open_append(&config.path) {
        return (Sink::File { writer, path }, false, size);
    }
    if let Some((writer, size, path)) = config.fallback_path.as_deref().and_then(open_append) {
        let _ = writeln!(
            io::stderr(),
            "[GK-AUDIT] primary log unavailable, using fallback: {}",
            path.display()
        );
        return (Sink::File { writer, path }, true, size);
    }
    let _ = writeln!(
        io::stderr(),
        "[GK-AUDIT] no writable log path, using stderr"
    );
    (Sink::Stderr, false, 0)
}

fn open_append(path: &Path) -> Option<(BufWriter<File>, u64, PathBuf)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path).ok()?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Some((
        BufWriter::with_capacity(16 * 1024, file),
        size,
        path.to_path_buf(),
    ))
}

fn rotated_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".1");
    PathBuf::from(name)
}
