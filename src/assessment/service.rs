use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::{classify, validate, RawMeasurement, StoredAssessment, ValidationError};
use crate::storage::{HistoryStore, StoreError};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs calculations against an injected history store.
///
/// A calculation is only complete once it has been persisted: a failed
/// save is reported as the failure of the whole calculation.
#[derive(Clone)]
pub struct AssessmentService {
    store: Arc<dyn HistoryStore>,
    history_limit: usize,
}

impl AssessmentService {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        AssessmentService {
            store,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub async fn calculate(&self, raw: &RawMeasurement) -> Result<StoredAssessment, ServiceError> {
        let measurement = validate(raw).map_err(|e| {
            debug!(reason = %e, "rejected calculation input");
            e
        })?;

        let assessment = classify(measurement);
        debug!(
            pf_ratio = assessment.pf_ratio,
            failure = assessment.has_respiratory_failure,
            failure_type = ?assessment.failure_type,
            "classified measurement"
        );

        let stored = self.store.save(assessment).await.map_err(|e| {
            warn!(error = %e, backend = %self.store.kind(), "failed to persist calculation");
            e
        })?;
        Ok(stored)
    }

    /// Most recent calculations first. `None` uses the configured limit.
    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<StoredAssessment>, ServiceError> {
        let limit = limit.unwrap_or(self.history_limit);
        Ok(self.store.list_recent(limit).await?)
    }

    pub async fn latest(&self) -> Result<Option<StoredAssessment>, ServiceError> {
        Ok(self.store.list_recent(1).await?.into_iter().next())
    }

    pub async fn clear(&self) -> Result<(), ServiceError> {
        self.store.clear_all().await?;
        debug!(backend = %self.store.kind(), "history cleared");
        Ok(())
    }
}
