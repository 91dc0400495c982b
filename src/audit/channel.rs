//! Audit channel: a dedicated writer thread fed through a bounded channel.
//!
//! Session threads hand decisions to a cloneable handle whose `record()` is
//! non-blocking `try_send()`; back-pressure drops the entry and bumps a
//! counter instead of stalling a login check.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::audit::jsonl::{DecisionEntry, JsonlConfig, JsonlWriter, Operation, Verdict};
use crate::core::errors::{GateError, Result};

/// Default bounded channel capacity for decision entries.
const CHANNEL_CAPACITY: usize = 1_024;

enum AuditEvent {
    Decision(DecisionEntry),
    /// Sentinel requesting graceful shutdown of the writer thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for recording decisions.
#[derive(Clone)]
pub struct AuditLoggerHandle {
    tx: Sender<AuditEvent>,
    dropped_entries: Arc<AtomicU64>,
}

impl AuditLoggerHandle {
    /// Record a decision. Non-blocking; a full channel drops the entry and
    /// increments the dropped-entries counter.
    pub fn record(&self, entry: DecisionEntry) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(AuditEvent::Decision(entry)) {
            self.dropped_entries.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of entries dropped due to channel back-pressure.
    pub fn dropped_entries(&self) -> u64 {
        self.dropped_entries.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the writer thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(AuditEvent::Shutdown);
    }
}

/// Options for building the audit logger.
pub struct AuditLoggerConfig {
    /// JSONL writer config.
    pub jsonl: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the writer thread and return a handle.
///
/// The handle is `Clone + Send`. The thread runs until `shutdown()` is
/// called or every handle is dropped.
pub fn spawn_logger(
    config: AuditLoggerConfig,
) -> Result<(AuditLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<AuditEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = AuditLoggerHandle {
        tx,
        dropped_entries: dropped,
    };

    let join = thread::Builder::new()
        .name("gk-audit".to_string())
        .spawn(move || {
            writer_thread_main(rx, config.jsonl, &dropped_clone);
        })
        .map_err(|e| GateError::Runtime {
            details: format!("failed to spawn audit writer thread: {e}"),
        })?;

    Ok((handle, join))
}

fn writer_thread_main(rx: Receiver<AuditEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut writer = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            writer.write_entry(
                &DecisionEntry::new(Operation::Audit, Verdict::Error)
                    .with_detail(format!("{lost} audit entries dropped under back-pressure")),
            );
        }

        match event {
            AuditEvent::Decision(entry) => writer.write_entry(&entry),
            AuditEvent::Shutdown => break,
        }
    }

    writer.sync();
}
