//! Respiratory assessment domain
//!
//! Holds the blood-gas measurement types and the pipeline built on them:
//! - Input validation
//! - Classification of respiratory status
//! - Persistence through a history store

pub mod classifier;
pub mod service;
pub mod validation;

pub use classifier::classify;
pub use service::{AssessmentService, ServiceError};
pub use validation::{validate, RawMeasurement, ValidationError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A validated arterial blood gas sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub ph: f64,
    #[serde(rename = "paCO2")]
    pub pa_co2: f64,          // mmHg
    #[serde(rename = "paO2")]
    pub pa_o2: f64,           // mmHg
    pub fio2: f64,            // percent, 21-100
    pub bicarbonate: f64,     // mEq/L
}

/// Which of the individual values fall outside their reference ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(rename = "abnormalPH")]
    pub abnormal_ph: bool,
    #[serde(rename = "abnormalPaCO2")]
    pub abnormal_pa_co2: bool,
    #[serde(rename = "abnormalPaO2")]
    pub abnormal_pa_o2: bool,
    #[serde(rename = "abnormalPFRatio")]
    pub abnormal_pf_ratio: bool,
    #[serde(rename = "abnormalBicarbonate")]
    pub abnormal_bicarbonate: bool,
}

/// Diagnostic label attached to an assessment with respiratory failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureType {
    #[serde(rename = "Acute Respiratory Acidosis")]
    AcuteRespiratoryAcidosis,
    #[serde(rename = "Compensated Respiratory Acidosis")]
    CompensatedRespiratoryAcidosis,
    #[serde(rename = "Acute Respiratory Alkalosis")]
    AcuteRespiratoryAlkalosis,
    #[serde(rename = "Compensated Respiratory Alkalosis")]
    CompensatedRespiratoryAlkalosis,
    #[serde(rename = "Severe Hypoxemic Respiratory Failure")]
    SevereHypoxemicRespiratoryFailure,
    #[serde(rename = "Hypoxemic Respiratory Failure")]
    HypoxemicRespiratoryFailure,
    #[serde(rename = "Mixed Respiratory Disorder")]
    MixedRespiratoryDisorder,
}

impl FailureType {
    pub const ALL: [FailureType; 7] = [
        FailureType::AcuteRespiratoryAcidosis,
        FailureType::CompensatedRespiratoryAcidosis,
        FailureType::AcuteRespiratoryAlkalosis,
        FailureType::CompensatedRespiratoryAlkalosis,
        FailureType::SevereHypoxemicRespiratoryFailure,
        FailureType::HypoxemicRespiratoryFailure,
        FailureType::MixedRespiratoryDisorder,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FailureType::AcuteRespiratoryAcidosis => "Acute Respiratory Acidosis",
            FailureType::CompensatedRespiratoryAcidosis => "Compensated Respiratory Acidosis",
            FailureType::AcuteRespiratoryAlkalosis => "Acute Respiratory Alkalosis",
            FailureType::CompensatedRespiratoryAlkalosis => "Compensated Respiratory Alkalosis",
            FailureType::SevereHypoxemicRespiratoryFailure => "Severe Hypoxemic Respiratory Failure",
            FailureType::HypoxemicRespiratoryFailure => "Hypoxemic Respiratory Failure",
            FailureType::MixedRespiratoryDisorder => "Mixed Respiratory Disorder",
        }
    }

    /// True for the oxygenation-driven (type 1) labels
    pub fn is_hypoxemic(&self) -> bool {
        matches!(
            self,
            FailureType::SevereHypoxemicRespiratoryFailure | FailureType::HypoxemicRespiratoryFailure
        )
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown respiratory failure type: {0}")]
pub struct UnknownFailureType(pub String);

impl FromStr for FailureType {
    type Err = UnknownFailureType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureType::ALL
            .into_iter()
            .find(|t| t.label() == s)
            .ok_or_else(|| UnknownFailureType(s.to_string()))
    }
}

/// Output of the classifier. Every derived field is a pure function of
/// `measurement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(flatten)]
    pub measurement: Measurement,
    #[serde(rename = "pfRatio")]
    pub pf_ratio: f64,
    pub criteria: Criteria,
    #[serde(rename = "hasRespiratoryFailure")]
    pub has_respiratory_failure: bool,
    #[serde(rename = "type")]
    pub failure_type: Option<FailureType>,
}

/// An assessment after it has been persisted by a history store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAssessment {
    pub id: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub assessment: Assessment,
}
