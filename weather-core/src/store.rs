use crate::activity_log::{LogEntry, LogKind};
use crate::error::CoreError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// Persistence for the little state that outlives a single run: the last
/// published post and the two activity logs.
pub trait StateStore: Send + Sync {
    fn last_post_uri(&self) -> impl Future<Output = Result<Option<String>, CoreError>> + Send;

    fn set_last_post_uri(&self, uri: &str) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn load_log(&self, kind: LogKind)
        -> impl Future<Output = Result<Vec<LogEntry>, CoreError>> + Send;

    fn save_log(
        &self,
        kind: LogKind,
        entries: &[LogEntry],
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    last_post_uri: Mutex<Option<String>>,
    logs: Mutex<HashMap<LogKind, Vec<LogEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_post_uri(uri: &str) -> Self {
        Self {
            last_post_uri: Mutex::new(Some(uri.to_string())),
            ..Self::default()
        }
    }
}

impl StateStore for MemoryStore {
    async fn last_post_uri(&self) -> Result<Option<String>, CoreError> {
        Ok(self
            .last_post_uri
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn set_last_post_uri(&self, uri: &str) -> Result<(), CoreError> {
        *self.last_post_uri.lock().unwrap_or_else(|e| e.into_inner()) = Some(uri.to_string());
        Ok(())
    }

    async fn load_log(&self, kind: LogKind) -> Result<Vec<LogEntry>, CoreError> {
        Ok(self
            .logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_log(&self, kind: LogKind, entries: &[LogEntry]) -> Result<(), CoreError> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, entries.to_vec());
        Ok(())
    }
}

impl<S: StateStore> StateStore for std::sync::Arc<S> {
    fn last_post_uri(&self) -> impl Future<Output = Result<Option<String>, CoreError>> + Send {
        (**self).last_post_uri()
    }

    fn set_last_post_uri(&self, uri: &str) -> impl Future<Output = Result<(), CoreError>> + Send {
        (**self).set_last_post_uri(uri)
    }

    fn load_log(
        &self,
        kind: LogKind,
    ) -> impl Future<Output = Result<Vec<LogEntry>, CoreError>> + Send {
        (**self).load_log(kind)
    }

    fn save_log(
        &self,
        kind: LogKind,
        entries: &[LogEntry],
    ) -> impl Future<Output = Result<(), CoreError>> + Send {
        (**self).save_log(kind, entries)
    }
}
