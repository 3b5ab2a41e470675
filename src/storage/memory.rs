use async_trait::async_trait;
use chrono::Utc;
use std::sync::RwLock;

use super::{newest_first, BackendKind, HistoryStore, StoreError};
use crate::assessment::{Assessment, StoredAssessment};

#[derive(Debug)]
struct Inner {
    records: Vec<StoredAssessment>,
    next_id: i64,
}

/// Volatile history kept for the lifetime of the process
#[derive(Debug)]
pub struct MemoryStore {
    // id counter lives under the same lock as the records
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn save(&self, assessment: Assessment) -> Result<StoredAssessment, StoreError> {
        let mut inner = self.inner.write()?;
        let stored = StoredAssessment {
            id: inner.next_id,
            created_at: Utc::now(),
            assessment,
        };
        inner.next_id += 1;
        inner.records.push(stored.clone());
        Ok(stored)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAssessment>, StoreError> {
        let inner = self.inner.read()?;
        Ok(newest_first(&inner.records, limit))
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.write()?.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{classify, Measurement};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn assessment(pa_o2: f64) -> Assessment {
        classify(Measurement {
            ph: 7.40,
            pa_co2: 40.0,
            pa_o2,
            fio2: 21.0,
            bicarbonate: 24.0,
        })
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_truncated() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.save(assessment(60.0 + i as f64)).await.unwrap();
        }

        let recent = store.list_recent(3).await.unwrap();
        let ids: Vec<i64> = recent.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert_eq!(recent[0].assessment.measurement.pa_o2, 64.0);

        assert_eq!(store.list_recent(10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn clear_then_save_shows_only_new_entry() {
        let store = MemoryStore::new();
        store.save(assessment(70.0)).await.unwrap();
        store.save(assessment(75.0)).await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.list_recent(10).await.unwrap().is_empty());

        let fresh = store.save(assessment(90.0)).await.unwrap();
        assert_eq!(store.list_recent(10).await.unwrap(), vec![fresh.clone()]);
        // ids keep increasing across a clear
        assert_eq!(fresh.id, 3);
    }

    #[tokio::test]
    async fn concurrent_saves_get_unique_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.save(assessment(85.0)).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort();
        assert_eq!(ids, (1..=32).collect::<Vec<i64>>());
    }
}
