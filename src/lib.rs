//! respcalc: a blood-gas respiratory failure calculator
//!
//! Classifies arterial blood gas measurements into respiratory failure
//! categories, keeps a history of calculations in a pluggable store and
//! exports results as FHIR Observations or HL7 v2 messages.

pub mod api;
pub mod assessment;
pub mod config;
pub mod error;
pub mod fhir;
pub mod hl7;
pub mod storage;

pub use error::RespCalcError;

use tracing::info;

use crate::api::RestApi;
use crate::assessment::AssessmentService;
use crate::config::Config;

/// Open and initialize the configured store and wire up the HTTP API.
///
/// Fails if the configuration is invalid or the backend cannot be
/// prepared, so misconfiguration surfaces at startup.
pub async fn build_api(config: &Config) -> Result<RestApi, RespCalcError> {
    config.validate()?;

    let store = storage::open_store(&config.storage)?;
    store.initialize().await?;
    info!(backend = %store.kind(), "history store initialized");

    let service = AssessmentService::new(store).with_history_limit(config.history_limit);
    Ok(RestApi::new(service))
}
