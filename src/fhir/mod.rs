//! FHIR export
//!
//! Structures for the subset of the FHIR R4 Observation resource that a
//! respiratory assessment is exported as, plus the terminology codes
//! shared with the HL7 export.

pub mod conversion;

pub use conversion::FHIRConverter;

use serde::{Deserialize, Serialize};

use crate::assessment::{Criteria, FailureType, Measurement};

pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

pub const ASSESSMENT_CODE: &str = "82800-4";
pub const ASSESSMENT_DISPLAY: &str = "Respiratory Failure Assessment";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub resource_type: String,
    pub status: String,
    pub code: CodeableConcept,
    pub effective_date_time: String,
    pub value_codeable_concept: CodeableConcept,
    pub component: Vec<ObservationComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

impl CodeableConcept {
    pub fn single(system: &str, code: &str, display: &str) -> Self {
        CodeableConcept {
            coding: vec![Coding {
                system: system.to_string(),
                code: code.to_string(),
                display: display.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationComponent {
    pub code: CodeableConcept,
    pub value_quantity: ValueQuantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueQuantity {
    pub value: f64,
    pub unit: String,
    pub system: String,
    pub code: String,
}

/// Respiratory failure category as coded in SNOMED CT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCode {
    pub code: &'static str,
    pub display: &'static str,
}

pub const TYPE_1_FAILURE: FailureCode = FailureCode {
    code: "409622000",
    display: "Type 1 respiratory failure",
};

pub const TYPE_2_FAILURE: FailureCode = FailureCode {
    code: "409623005",
    display: "Type 2 respiratory failure",
};

/// Hypoxemic labels code as type 1; every other outcome, including no
/// failure, codes as type 2.
pub fn failure_code(failure_type: Option<FailureType>) -> FailureCode {
    match failure_type {
        Some(t) if t.is_hypoxemic() => TYPE_1_FAILURE,
        _ => TYPE_2_FAILURE,
    }
}

/// One exported blood-gas value with its LOINC and UCUM codes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodedValue {
    pub name: &'static str,
    pub loinc: &'static str,
    pub display: &'static str,
    pub unit: &'static str,
    pub ucum: &'static str,
    pub value: f64,
    pub abnormal: bool,
}

/// The exported measurements in output order: pH, PaCO2, PaO2, HCO3.
/// FiO2 only contributes through the P/F ratio.
pub fn coded_values(measurement: &Measurement, criteria: &Criteria) -> [CodedValue; 4] {
    [
        CodedValue {
            name: "pH",
            loinc: "2744-1",
            display: "pH",
            unit: "pH",
            ucum: "[pH]",
            value: measurement.ph,
            abnormal: criteria.abnormal_ph,
        },
        CodedValue {
            name: "PaCO2",
            loinc: "2019-8",
            display: "Carbon dioxide partial pressure",
            unit: "mmHg",
            ucum: "mm[Hg]",
            value: measurement.pa_co2,
            abnormal: criteria.abnormal_pa_co2,
        },
        CodedValue {
            name: "PaO2",
            loinc: "2703-7",
            display: "Oxygen partial pressure",
            unit: "mmHg",
            ucum: "mm[Hg]",
            value: measurement.pa_o2,
            abnormal: criteria.abnormal_pa_o2,
        },
        CodedValue {
            name: "HCO3",
            loinc: "1959-6",
            display: "Bicarbonate",
            unit: "mEq/L",
            ucum: "meq/L",
            value: measurement.bicarbonate,
            abnormal: criteria.abnormal_bicarbonate,
        },
    ]
}
