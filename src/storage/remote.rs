//! PostgreSQL history backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_postgres::types::Json;
use tokio_postgres::{NoTls, Row};
use tracing::info;

use super::{BackendKind, HistoryStore, StoreError};
use crate::assessment::{Assessment, Criteria, FailureType, Measurement, StoredAssessment};

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS respiratory_calculations (
        id BIGSERIAL PRIMARY KEY,
        ph DOUBLE PRECISION NOT NULL,
        pa_co2 DOUBLE PRECISION NOT NULL,
        pa_o2 DOUBLE PRECISION NOT NULL,
        fi_o2 DOUBLE PRECISION NOT NULL,
        bicarbonate DOUBLE PRECISION NOT NULL,
        pf_ratio DOUBLE PRECISION NOT NULL,
        type TEXT,
        has_respiratory_failure BOOLEAN NOT NULL,
        criteria JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

const MAX_CONNECTIONS: usize = 8;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "id, ph, pa_co2, pa_o2, fi_o2, bicarbonate, pf_ratio, type, \
                       has_respiratory_failure, criteria, created_at";

/// History kept in a `respiratory_calculations` table.
///
/// Ids come from the table's `BIGSERIAL` sequence and timestamps from the
/// server clock. Connections are pooled; a connection that has closed is
/// replaced on the next checkout.
pub struct RemoteStore {
    database_url: String,
    pool: OnceCell<Pool>,
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("initialized", &self.pool.initialized())
            .finish_non_exhaustive()
    }
}

impl RemoteStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        RemoteStore {
            database_url: database_url.into(),
            pool: OnceCell::new(),
        }
    }

    fn create_pool(&self) -> Result<Pool, StoreError> {
        if self.database_url.trim().is_empty() {
            return Err(StoreError::BackendUnavailable(
                "Missing DATABASE_URL. Please check your configuration.".to_string(),
            ));
        }

        let mut cfg = Config::new();
        cfg.url = Some(self.database_url.clone());

        cfg.builder(NoTls)
            .map_err(|e| StoreError::BackendUnavailable(format!("invalid DATABASE_URL: {}", e)))?
            .max_size(MAX_CONNECTIONS)
            .runtime(Runtime::Tokio1)
            .create_timeout(Some(CONNECT_TIMEOUT))
            .wait_timeout(Some(CONNECT_TIMEOUT))
            .build()
            .map_err(|e| StoreError::BackendUnavailable(format!("cannot create pool: {}", e)))
    }

    /// Check out a pooled connection.
    async fn get_client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        let pool = self
            .pool
            .get()
            .ok_or_else(|| StoreError::BackendUnavailable("Database not initialized".to_string()))?;
        pool.get()
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("cannot connect to database: {}", e)))
    }

    /// Build the pool, then prove connectivity by preparing the table.
    async fn connect(&self) -> Result<Pool, StoreError> {
        let pool = self.create_pool()?;
        let client = pool
            .get()
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("cannot connect to database: {}", e)))?;

        client.batch_execute(CREATE_TABLE).await?;
        info!("respiratory_calculations table ready");
        drop(client);
        Ok(pool)
    }
}

/// Newest first by sequence id; `created_at` is the transaction start
/// time and can disagree with insert order.
fn list_recent_query() -> String {
    format!(
        "SELECT {} FROM respiratory_calculations ORDER BY id DESC LIMIT $1",
        COLUMNS
    )
}

fn from_row(row: &Row) -> Result<StoredAssessment, StoreError> {
    let failure_type = row
        .try_get::<_, Option<String>>("type")?
        .map(|label| label.parse::<FailureType>())
        .transpose()
        .map_err(|e| StoreError::Operation(e.to_string()))?;
    let Json(criteria) = row.try_get::<_, Json<Criteria>>("criteria")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(StoredAssessment {
        id: row.try_get("id")?,
        created_at,
        assessment: Assessment {
            measurement: Measurement {
                ph: row.try_get("ph")?,
                pa_co2: row.try_get("pa_co2")?,
                pa_o2: row.try_get("pa_o2")?,
                fio2: row.try_get("fi_o2")?,
                bicarbonate: row.try_get("bicarbonate")?,
            },
            pf_ratio: row.try_get("pf_ratio")?,
            criteria,
            has_respiratory_failure: row.try_get("has_respiratory_failure")?,
            failure_type,
        },
    })
}

#[async_trait]
impl HistoryStore for RemoteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        self.pool.get_or_try_init(|| self.connect()).await?;
        Ok(())
    }

    async fn save(&self, assessment: Assessment) -> Result<StoredAssessment, StoreError> {
        let client = self.get_client().await?;
        let m = &assessment.measurement;
        let failure_type = assessment.failure_type.map(|t| t.label());
        let criteria = Json(assessment.criteria);

        let query = format!(
            "INSERT INTO respiratory_calculations \
             (ph, pa_co2, pa_o2, fi_o2, bicarbonate, pf_ratio, type, has_respiratory_failure, criteria) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            COLUMNS
        );
        let row = client
            .query_one(
                query.as_str(),
                &[
                    &m.ph,
                    &m.pa_co2,
                    &m.pa_o2,
                    &m.fio2,
                    &m.bicarbonate,
                    &assessment.pf_ratio,
                    &failure_type,
                    &assessment.has_respiratory_failure,
                    &criteria,
                ],
            )
            .await?;

        from_row(&row)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAssessment>, StoreError> {
        let client = self.get_client().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = list_recent_query();

        client
            .query(query.as_str(), &[&limit])
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.get_client()
            .await?
            .execute("DELETE FROM respiratory_calculations", &[])
            .await?;
        Ok(())
    }
}
