use super::{Assessment, Criteria, FailureType, Measurement};

// Reference ranges
const PH_LOW: f64 = 7.35;
const PH_HIGH: f64 = 7.45;
const PACO2_LOW: f64 = 35.0;
const PACO2_HIGH: f64 = 45.0;
const PAO2_LOW: f64 = 80.0;
const BICARBONATE_LOW: f64 = 22.0;
const BICARBONATE_HIGH: f64 = 26.0;

// Failure thresholds
const PAO2_FAILURE: f64 = 60.0;
const PF_RATIO_ABNORMAL: f64 = 300.0;
const PF_RATIO_SEVERE: f64 = 200.0;

/// Classify a validated measurement.
///
/// Deterministic and infallible: the same measurement always yields the
/// same ratio, criteria and label.
pub fn classify(measurement: Measurement) -> Assessment {
    let pf_ratio = pf_ratio(&measurement);
    let criteria = evaluate_criteria(&measurement, pf_ratio);
    let has_respiratory_failure = has_respiratory_failure(&measurement, pf_ratio, &criteria);

    let failure_type = if has_respiratory_failure {
        Some(determine_type(&measurement, pf_ratio))
    } else {
        None
    };

    Assessment {
        measurement,
        pf_ratio,
        criteria,
        has_respiratory_failure,
        failure_type,
    }
}

/// PaO2 over FiO2 expressed as a fraction
pub fn pf_ratio(measurement: &Measurement) -> f64 {
    measurement.pa_o2 / (measurement.fio2 / 100.0)
}

pub fn evaluate_criteria(measurement: &Measurement, pf_ratio: f64) -> Criteria {
    Criteria {
        abnormal_ph: measurement.ph < PH_LOW || measurement.ph > PH_HIGH,
        abnormal_pa_co2: measurement.pa_co2 < PACO2_LOW || measurement.pa_co2 > PACO2_HIGH,
        abnormal_pa_o2: measurement.pa_o2 < PAO2_LOW,
        abnormal_pf_ratio: pf_ratio < PF_RATIO_ABNORMAL,
        abnormal_bicarbonate: measurement.bicarbonate < BICARBONATE_LOW
            || measurement.bicarbonate > BICARBONATE_HIGH,
    }
}

fn has_respiratory_failure(measurement: &Measurement, pf_ratio: f64, criteria: &Criteria) -> bool {
    measurement.pa_o2 < PAO2_FAILURE
        || measurement.pa_co2 > PACO2_HIGH
        || (pf_ratio < PF_RATIO_ABNORMAL && criteria.abnormal_ph)
}

// Branches are checked in order. The acid-base branches can finish without
// a label (normal pH), in which case evaluation continues with oxygenation.
fn determine_type(measurement: &Measurement, pf_ratio: f64) -> FailureType {
    let ph = measurement.ph;

    if measurement.pa_co2 > PACO2_HIGH {
        if ph < PH_LOW {
            return FailureType::AcuteRespiratoryAcidosis;
        } else if ph > PH_HIGH {
            return FailureType::CompensatedRespiratoryAcidosis;
        }
    } else if measurement.pa_co2 < PACO2_LOW {
        if ph > PH_HIGH {
            return FailureType::AcuteRespiratoryAlkalosis;
        } else if ph < PH_LOW {
            return FailureType::CompensatedRespiratoryAlkalosis;
        }
    }

    if pf_ratio < PF_RATIO_ABNORMAL {
        if pf_ratio < PF_RATIO_SEVERE {
            return FailureType::SevereHypoxemicRespiratoryFailure;
        }
        return FailureType::HypoxemicRespiratoryFailure;
    }

    FailureType::MixedRespiratoryDisorder
}
