use chrono::SecondsFormat;

use super::{
    coded_values, failure_code, CodeableConcept, Observation, ObservationComponent, ValueQuantity,
    ASSESSMENT_CODE, ASSESSMENT_DISPLAY, LOINC_SYSTEM, SNOMED_SYSTEM, UCUM_SYSTEM,
};
use crate::assessment::StoredAssessment;

/// Converts a stored assessment into a FHIR resource
pub trait FHIRConverter {
    fn to_observation(&self) -> Observation;
}

impl FHIRConverter for StoredAssessment {
    fn to_observation(&self) -> Observation {
        let assessment = &self.assessment;
        let outcome = failure_code(assessment.failure_type);

        let component = coded_values(&assessment.measurement, &assessment.criteria)
            .iter()
            .map(|v| ObservationComponent {
                code: CodeableConcept::single(LOINC_SYSTEM, v.loinc, v.display),
                value_quantity: ValueQuantity {
                    value: v.value,
                    unit: v.unit.to_string(),
                    system: UCUM_SYSTEM.to_string(),
                    code: v.ucum.to_string(),
                },
            })
            .collect();

        Observation {
            resource_type: "Observation".to_string(),
            status: "final".to_string(),
            code: CodeableConcept::single(LOINC_SYSTEM, ASSESSMENT_CODE, ASSESSMENT_DISPLAY),
            effective_date_time: self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            value_codeable_concept: CodeableConcept::single(
                SNOMED_SYSTEM,
                outcome.code,
                outcome.display,
            ),
            component,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{classify, Measurement};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stored(measurement: Measurement) -> StoredAssessment {
        StoredAssessment {
            id: 1,
            created_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            assessment: classify(measurement),
        }
    }

    #[test]
    fn observation_document_shape() {
        let observation = stored(Measurement {
            ph: 7.38,
            pa_co2: 40.0,
            pa_o2: 55.0,
            fio2: 40.0,
            bicarbonate: 24.0,
        })
        .to_observation();

        let json = serde_json::to_value(&observation).unwrap();
        assert_eq!(json["resourceType"], "Observation");
        assert_eq!(json["status"], "final");
        assert_eq!(json["effectiveDateTime"], "2024-05-06T07:08:09.000Z");
        assert_eq!(
            json["code"],
            json!({ "coding": [{
                "system": "http://loinc.org",
                "code": "82800-4",
                "display": "Respiratory Failure Assessment"
            }]})
        );
        assert_eq!(json["valueCodeableConcept"]["coding"][0]["code"], "409622000");
        assert_eq!(
            json["component"][3],
            json!({
                "code": { "coding": [{
                    "system": "http://loinc.org",
                    "code": "1959-6",
                    "display": "Bicarbonate"
                }]},
                "valueQuantity": {
                    "value": 24.0,
                    "unit": "mEq/L",
                    "system": "http://unitsofmeasure.org",
                    "code": "meq/L"
                }
            })
        );
    }

    #[test]
    fn components_follow_measurement_order() {
        let observation = stored(Measurement {
            ph: 7.30,
            pa_co2: 50.0,
            pa_o2: 70.0,
            fio2: 40.0,
            bicarbonate: 24.0,
        })
        .to_observation();

        let codes: Vec<&str> = observation
            .component
            .iter()
            .map(|c| c.code.coding[0].code.as_str())
            .collect();
        assert_eq!(codes, vec!["2744-1", "2019-8", "2703-7", "1959-6"]);

        let values: Vec<f64> = observation.component.iter().map(|c| c.value_quantity.value).collect();
        assert_eq!(values, vec![7.30, 50.0, 70.0, 24.0]);
        assert_eq!(observation.value_codeable_concept.coding[0].code, "409623005");
    }
}
