//! Rolling debug and upload logs.
//!
//! Both logs keep only the most recent [`LOG_CAPACITY`] entries. Appending
//! never fails: a poisoned lock is recovered and store errors during
//! load/flush are traced and otherwise ignored, so logging can't break the
//! operation that is being logged.

use crate::clock::Clock;
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Success,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Success => write!(f, "Success"),
            UploadStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UploadStatus>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Debug,
    Upload,
}

impl LogKind {
    pub fn key(&self) -> &'static str {
        match self {
            LogKind::Debug => "debug_log",
            LogKind::Upload => "upload_log",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollingLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl RollingLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn from_entries<I: IntoIterator<Item = LogEntry>>(entries: I, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        for entry in entries {
            log.push(entry);
        }
        log
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// In-memory view of one log plus the entries the store has not seen yet.
#[derive(Debug)]
struct LogState {
    rolling: RollingLog,
    unsaved: RollingLog,
    cleared: bool,
}

impl LogState {
    fn new() -> Self {
        Self {
            rolling: RollingLog::new(LOG_CAPACITY),
            unsaved: RollingLog::new(LOG_CAPACITY),
            cleared: false,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        self.rolling.push(entry.clone());
        self.unsaved.push(entry);
    }

    fn clear(&mut self) {
        self.rolling.clear();
        self.unsaved.clear();
        self.cleared = true;
    }

    fn take_pending(&mut self) -> (Vec<LogEntry>, bool) {
        let pending = self.unsaved.entries();
        self.unsaved.clear();
        (pending, std::mem::take(&mut self.cleared))
    }

    /// Puts back entries whose flush failed, unless a clear happened since.
    fn restore_pending(&mut self, pending: Vec<LogEntry>, cleared: bool) {
        if !self.cleared {
            let newer = self.unsaved.entries();
            self.unsaved = RollingLog::from_entries(pending.into_iter().chain(newer), LOG_CAPACITY);
        }
        self.cleared |= cleared;
    }

    /// Adopts what was just written to the store, keeping entries added
    /// while the flush was in flight.
    fn rebase(&mut self, saved: RollingLog) {
        if self.cleared {
            return;
        }
        let newer = self.unsaved.entries();
        self.rolling = RollingLog::from_entries(saved.entries().into_iter().chain(newer), LOG_CAPACITY);
    }
}

/// The debug and upload logs shared by every component of one process.
///
/// Several processes may write to the same store. A flush appends this
/// process's new entries to whatever is stored at that moment instead of
/// overwriting it with a stale copy.
pub struct ActivityLog {
    debug: Mutex<LogState>,
    upload: Mutex<LogState>,
    clock: Arc<dyn Clock>,
}

impl ActivityLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            debug: Mutex::new(LogState::new()),
            upload: Mutex::new(LogState::new()),
            clock,
        }
    }

    fn lock(&self, kind: LogKind) -> MutexGuard<'_, LogState> {
        let log = match kind {
            LogKind::Debug => &self.debug,
            LogKind::Upload => &self.upload,
        };
        log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        let entry = LogEntry {
            time: self.clock.now(),
            status: None,
            message,
        };
        self.lock(LogKind::Debug).push(entry);
    }

    pub fn upload(&self, status: UploadStatus, details: impl Into<String>) {
        let details = details.into();
        let entry = LogEntry {
            time: self.clock.now(),
            status: Some(status),
            message: details.clone(),
        };
        self.lock(LogKind::Upload).push(entry);
        self.debug(format!(
            "Upload log entry: Status={}, Details={}",
            status, details
        ));
    }

    pub fn entries(&self, kind: LogKind) -> Vec<LogEntry> {
        self.lock(kind).rolling.entries()
    }

    pub fn debug_entries(&self) -> Vec<LogEntry> {
        self.entries(LogKind::Debug)
    }

    pub fn upload_entries(&self) -> Vec<LogEntry> {
        self.entries(LogKind::Upload)
    }

    /// Empties the debug log; the next flush empties the stored copy too.
    pub fn clear_debug(&self) {
        self.lock(LogKind::Debug).clear();
    }

    /// Prepends whatever the store already holds for both logs.
    pub async fn load_from<S: StateStore>(&self, store: &S) {
        for kind in [LogKind::Debug, LogKind::Upload] {
            match store.load_log(kind).await {
                Ok(stored) => {
                    let mut log = self.lock(kind);
                    let current = log.rolling.entries();
                    log.rolling =
                        RollingLog::from_entries(stored.into_iter().chain(current), LOG_CAPACITY);
                }
                Err(e) => warn!("Failed to load {}: {}", kind.key(), e),
            }
        }
    }

    /// Appends unsaved entries to the stored logs, after dropping the stored
    /// debug log if it was cleared here. The in-memory logs then mirror the
    /// store, entries from other writers included.
    pub async fn flush_to<S: StateStore>(&self, store: &S) {
        for kind in [LogKind::Debug, LogKind::Upload] {
            let (pending, cleared) = self.lock(kind).take_pending();

            let stored = if cleared {
                Ok(Vec::new())
            } else {
                store.load_log(kind).await
            };
            let merged = match stored {
                Ok(stored) => RollingLog::from_entries(
                    stored.into_iter().chain(pending.iter().cloned()),
                    LOG_CAPACITY,
                ),
                Err(e) => {
                    warn!("Failed to load {} before flushing: {}", kind.key(), e);
                    self.lock(kind).restore_pending(pending, cleared);
                    continue;
                }
            };

            match store.save_log(kind, &merged.entries()).await {
                Ok(()) => self.lock(kind).rebase(merged),
                Err(e) => {
                    warn!("Failed to persist {}: {}", kind.key(), e);
                    self.lock(kind).restore_pending(pending, cleared);
                }
            }
        }
    }
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog")
            .field("debug_entries", &self.lock(LogKind::Debug).rolling.len())
            .field("upload_entries", &self.lock(LogKind::Upload).rolling.len())
            .finish()
    }
}
