//! HL7 v2.5.1 ORU^R01 export of a stored assessment.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::assessment::StoredAssessment;
use crate::fhir::{coded_values, failure_code, ASSESSMENT_CODE, ASSESSMENT_DISPLAY};

pub const SEGMENT_SEPARATOR: &str = "\r";
pub const CONTENT_TYPE: &str = "x-application/hl7-v2+er7";

const SENDING_APPLICATION: &str = "RESPCALC";
const SENDING_FACILITY: &str = "HOSPITAL";
const RECEIVING_APPLICATION: &str = "EHR";
const RECEIVING_FACILITY: &str = "HOSPITAL";
const VERSION: &str = "2.5.1";

/// Build a message stamped with the current time and a fresh control id.
pub fn to_message(stored: &StoredAssessment) -> String {
    let control_id = Uuid::new_v4().simple().to_string();
    build_message(stored, Utc::now(), &control_id)
}

/// Build a message with an explicit timestamp and control id.
pub fn build_message(stored: &StoredAssessment, at: DateTime<Utc>, control_id: &str) -> String {
    let timestamp = at.format("%Y%m%d%H%M%S").to_string();
    let assessment = &stored.assessment;
    let outcome = failure_code(assessment.failure_type);

    let mut segments = vec![
        format!(
            "MSH|^~\\&|{}|{}|{}|{}|{}||ORU^R01|{}|P|{}",
            SENDING_APPLICATION,
            SENDING_FACILITY,
            RECEIVING_APPLICATION,
            RECEIVING_FACILITY,
            timestamp,
            control_id,
            VERSION
        ),
        "PID|1||||||||".to_string(),
        format!(
            "OBR|1|||{}^{}^LN|||{}",
            ASSESSMENT_CODE, ASSESSMENT_DISPLAY, timestamp
        ),
        format!(
            "OBX|1|CE|{}^Respiratory Status^LN||{}^{}^SCT||||||F|||{}",
            ASSESSMENT_CODE, outcome.code, outcome.display, timestamp
        ),
    ];

    // OBX-8 carries the abnormal flag, OBX-11 the result status
    for (index, v) in coded_values(&assessment.measurement, &assessment.criteria)
        .iter()
        .enumerate()
    {
        segments.push(format!(
            "OBX|{}|NM|{}^{}^LN||{}|{}||{}|||F|||{}",
            index + 2,
            v.loinc,
            v.name,
            v.value,
            v.ucum,
            if v.abnormal { "A" } else { "N" },
            timestamp
        ));
    }

    segments.join(SEGMENT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{classify, Measurement};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn stored() -> StoredAssessment {
        StoredAssessment {
            id: 3,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            assessment: classify(Measurement {
                ph: 7.30,
                pa_co2: 50.0,
                pa_o2: 70.0,
                fio2: 40.0,
                bicarbonate: 24.0,
            }),
        }
    }

    #[test]
    fn builds_expected_segments() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let message = build_message(&stored(), at, "abc123");
        let segments: Vec<&str> = message.split('\r').collect();

        assert_eq!(
            segments,
            vec![
                "MSH|^~\\&|RESPCALC|HOSPITAL|EHR|HOSPITAL|20240102030405||ORU^R01|abc123|P|2.5.1",
                "PID|1||||||||",
                "OBR|1|||82800-4^Respiratory Failure Assessment^LN|||20240102030405",
                "OBX|1|CE|82800-4^Respiratory Status^LN||409623005^Type 2 respiratory failure^SCT||||||F|||20240102030405",
                "OBX|2|NM|2744-1^pH^LN||7.3|[pH]||A|||F|||20240102030405",
                "OBX|3|NM|2019-8^PaCO2^LN||50|mm[Hg]||A|||F|||20240102030405",
                "OBX|4|NM|2703-7^PaO2^LN||70|mm[Hg]||A|||F|||20240102030405",
                "OBX|5|NM|1959-6^HCO3^LN||24|meq/L||N|||F|||20240102030405",
            ]
        );
    }

    #[test]
    fn generated_messages_get_unique_control_ids() {
        let first = to_message(&stored());
        let second = to_message(&stored());

        let control_id = |m: &str| m.split('\r').next().unwrap().split('|').nth(9).unwrap().to_string();
        assert_ne!(control_id(&first), control_id(&second));
        assert_eq!(control_id(&first).len(), 32);
    }

    #[test]
    fn result_status_is_field_eleven() {
        let message = build_message(&stored(), Utc::now(), "x");
        for obx in message.split('\r').filter(|s| s.starts_with("OBX")) {
            let fields: Vec<&str> = obx.split('|').collect();
            assert_eq!(fields[11], "F", "{}", obx);
            assert_eq!(fields.len(), 15, "{}", obx);
        }
    }
}
