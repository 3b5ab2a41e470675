use async_trait::async_trait;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::{newest_first, BackendKind, HistoryStore, StoreError};
use crate::assessment::{Assessment, StoredAssessment};

const LOG_FILE_NAME: &str = "history.log";

/// Append-only log of stored calculations.
///
/// Each entry is a 4-byte big-endian length followed by the JSON encoded
/// record.
#[derive(Debug)]
pub struct HistoryLog {
    log_path: PathBuf,
    log_file: File,
}

impl HistoryLog {
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let log_path = dir.join(LOG_FILE_NAME);
        let log_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)?;

        Ok(HistoryLog { log_path, log_file })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append a record and flush it to disk. On failure the log is cut
    /// back to its previous length so earlier entries stay readable.
    pub fn append(&mut self, record: &StoredAssessment) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec(record)?;
        let record_size = u32::try_from(serialized.len())
            .map_err(|_| StoreError::Operation("record too large for history log".to_string()))?;

        self.append_with(|file| write_entry(file, record_size, &serialized))
    }

    fn append_with(
        &mut self,
        write: impl FnOnce(&mut File) -> io::Result<()>,
    ) -> Result<(), StoreError> {
        let previous_len = self.log_file.metadata()?.len();
        if let Err(e) = write(&mut self.log_file) {
            if let Err(rollback) = self.log_file.set_len(previous_len) {
                warn!(error = %rollback, "failed to roll back partial history write");
            }
            return Err(StoreError::Io(e));
        }
        Ok(())
    }

    /// Read every complete record in the log. A torn record at the tail,
    /// left behind by a crash mid-append, is dropped and cut off.
    pub fn replay(&mut self) -> Result<Vec<StoredAssessment>, StoreError> {
        self.log_file.seek(SeekFrom::Start(0))?;

        let mut records = Vec::new();
        let mut valid_len: u64 = 0;

        loop {
            let mut size_buf = [0u8; 4];
            match self.log_file.read_exact(&mut size_buf) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let record_size = u32::from_be_bytes(size_buf) as usize;
            let mut record_data = vec![0u8; record_size];
            match self.log_file.read_exact(&mut record_data) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            records.push(serde_json::from_slice(&record_data)?);
            valid_len += 4 + record_size as u64;
        }

        let file_len = self.log_file.metadata()?.len();
        if file_len > valid_len {
            warn!(
                path = %self.log_path.display(),
                dropped_bytes = file_len - valid_len,
                "dropping incomplete record at end of history log"
            );
            self.log_file.set_len(valid_len)?;
        }

        Ok(records)
    }

    pub fn truncate(&mut self) -> io::Result<()> {
        self.log_file.set_len(0)?;
        self.log_file.sync_all()
    }
}

fn write_entry(file: &mut File, size: u32, data: &[u8]) -> io::Result<()> {
    file.write_all(&size.to_be_bytes())?;
    file.write_all(data)?;
    file.sync_data()
}

#[derive(Debug)]
struct LogState {
    log: HistoryLog,
    records: Vec<StoredAssessment>,
    next_id: i64,
}

/// Durable history backed by a [`HistoryLog`] in a local directory.
///
/// The log is replayed into memory on `initialize`; reads are served from
/// the replayed copy. File work runs on the blocking thread pool.
#[derive(Debug)]
pub struct LocalFileStore {
    dir: PathBuf,
    state: Arc<Mutex<Option<LogState>>>,
}

impl LocalFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        LocalFileStore {
            dir: dir.as_ref().to_path_buf(),
            state: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_state<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LogState) -> Result<T, StoreError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        run_blocking(move || {
            let mut guard = state.lock()?;
            let state = guard.as_mut().ok_or_else(|| {
                StoreError::BackendUnavailable("History log not initialized".to_string())
            })?;
            f(state)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Operation(format!("history log task failed: {}", e)))?
}

fn open_state(dir: &Path) -> Result<LogState, StoreError> {
    let mut log = HistoryLog::open(dir).map_err(|e| {
        StoreError::BackendUnavailable(format!(
            "cannot open history log in {}: {}",
            dir.display(),
            e
        ))
    })?;
    let records = log.replay()?;
    let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;

    info!(
        path = %log.path().display(),
        records = records.len(),
        "history log replayed"
    );
    Ok(LogState { log, records, next_id })
}

#[async_trait]
impl HistoryStore for LocalFileStore {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFile
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        let state = Arc::clone(&self.state);
        let dir = self.dir.clone();
        run_blocking(move || {
            let mut guard = state.lock()?;
            if guard.is_none() {
                *guard = Some(open_state(&dir)?);
            }
            Ok(())
        })
        .await
    }

    async fn save(&self, assessment: Assessment) -> Result<StoredAssessment, StoreError> {
        self.with_state(|state| {
            let stored = StoredAssessment {
                id: state.next_id,
                created_at: Utc::now(),
                assessment,
            };
            state.log.append(&stored)?;
            state.next_id += 1;
            state.records.push(stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAssessment>, StoreError> {
        self.with_state(move |state| Ok(newest_first(&state.records, limit)))
            .await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.with_state(|state| {
            state.log.truncate()?;
            state.records.clear();
            Ok(())
        })
        .await
    }
}
