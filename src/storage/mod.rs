//! Calculation history storage
//!
//! Every backend implements [`HistoryStore`]:
//! - `memory`: volatile, process lifetime only
//! - `local_file`: append-only log on disk, replayed at startup
//! - `remote`: PostgreSQL table

mod memory;
mod persistence;
mod remote;

pub use memory::MemoryStore;
pub use persistence::{HistoryLog, LocalFileStore};
pub use remote::RemoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError};
use thiserror::Error;

use crate::assessment::{Assessment, StoredAssessment};
use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Storage operation failed: {0}")]
    Operation(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::Operation("history lock poisoned".to_string())
    }
}

/// Which backend holds the calculation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    #[default]
    LocalFile,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::LocalFile => write!(f, "local_file"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "local_file" | "localfile" | "localstorage" | "file" => Ok(BackendKind::LocalFile),
            "remote" | "postgres" | "postgresql" => Ok(BackendKind::Remote),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Append-only history of calculations.
///
/// Each call is atomic on its own. `save` assigns `id` and `createdAt`;
/// ids increase monotonically per backend instance.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Prepare the backend. Safe to call more than once.
    async fn initialize(&self) -> Result<(), StoreError>;

    async fn save(&self, assessment: Assessment) -> Result<StoredAssessment, StoreError>;

    /// Most recently saved first, at most `limit` entries.
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAssessment>, StoreError>;

    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// Build the configured backend. Does not initialize it.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn HistoryStore>, StoreError> {
    let store: Arc<dyn HistoryStore> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::LocalFile => Arc::new(LocalFileStore::new(&config.path)),
        BackendKind::Remote => {
            let url = config.database_url.clone().ok_or_else(|| {
                StoreError::BackendUnavailable(
                    "Missing DATABASE_URL. Please check your configuration.".to_string(),
                )
            })?;
            Arc::new(RemoteStore::new(url))
        }
    };
    Ok(store)
}

/// Newest first, truncated. Shared by the in-process backends which keep
/// history in save order.
fn newest_first(records: &[StoredAssessment], limit: usize) -> Vec<StoredAssessment> {
    records.iter().rev().take(limit).cloned().collect()
}
