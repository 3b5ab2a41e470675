//! Presence and range checks on raw calculator input.
//!
//! Exactly one reason is reported per rejection. Checks run in a fixed
//! order and the first failure wins.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::Measurement;

/// Calculator input as it arrives from a client, before any checks.
///
/// Fields are kept as loose JSON so that missing, `null`, string and
/// numeric values all reach the validator instead of failing
/// deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMeasurement {
    #[serde(default)]
    pub ph: Option<Value>,
    #[serde(default, rename = "paCO2")]
    pub pa_co2: Option<Value>,
    #[serde(default, rename = "paO2")]
    pub pa_o2: Option<Value>,
    #[serde(default)]
    pub fio2: Option<Value>,
    #[serde(default)]
    pub bicarbonate: Option<Value>,
}

impl RawMeasurement {
    /// Parse a request body. Only a JSON object carries the named fields;
    /// an empty body or any other JSON value reports missing fields.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::MissingFields);
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
        if !value.is_object() {
            return Err(ValidationError::MissingFields);
        }
        serde_json::from_value(value).map_err(|e| ValidationError::MalformedBody(e.to_string()))
    }

    pub fn from_values(ph: f64, pa_co2: f64, pa_o2: f64, fio2: f64, bicarbonate: f64) -> Self {
        RawMeasurement {
            ph: Some(Value::from(ph)),
            pa_co2: Some(Value::from(pa_co2)),
            pa_o2: Some(Value::from(pa_o2)),
            fio2: Some(Value::from(fio2)),
            bicarbonate: Some(Value::from(bicarbonate)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("All fields are required")]
    MissingFields,
    #[error("pH must be between 6.8 and 7.8")]
    PhOutOfRange,
    #[error("PaCO2 must be between 15 and 130 mmHg")]
    PaCo2OutOfRange,
    #[error("PaO2 must be between 40 and 500 mmHg")]
    PaO2OutOfRange,
    #[error("FiO2 must be between 21 and 100%")]
    Fio2OutOfRange,
    #[error("Bicarbonate must be between 0 and 45 mEq/L")]
    BicarbonateOutOfRange,
    #[error("Invalid request body: {0}")]
    MalformedBody(String),
}

struct Range {
    min: f64,
    max: f64,
    error: ValidationError,
}

const PH: Range = Range { min: 6.8, max: 7.8, error: ValidationError::PhOutOfRange };
const PA_CO2: Range = Range { min: 15.0, max: 130.0, error: ValidationError::PaCo2OutOfRange };
const PA_O2: Range = Range { min: 40.0, max: 500.0, error: ValidationError::PaO2OutOfRange };
const FIO2: Range = Range { min: 21.0, max: 100.0, error: ValidationError::Fio2OutOfRange };
const BICARBONATE: Range = Range {
    min: 0.0,
    max: 45.0,
    error: ValidationError::BicarbonateOutOfRange,
};

impl Range {
    fn check(&self, value: f64) -> Result<f64, ValidationError> {
        if value < self.min || value > self.max {
            return Err(self.error.clone());
        }
        Ok(value)
    }
}

/// Validate raw input into a [`Measurement`].
///
/// Presence uses truthiness: a field that is absent, `null`, non-numeric,
/// NaN or exactly zero counts as missing. A real bicarbonate of 0 is
/// therefore rejected as missing even though 0 is inside its range.
pub fn validate(raw: &RawMeasurement) -> Result<Measurement, ValidationError> {
    let fields = [&raw.ph, &raw.pa_co2, &raw.pa_o2, &raw.fio2, &raw.bicarbonate];
    let mut values = [0.0_f64; 5];

    for (slot, field) in values.iter_mut().zip(fields) {
        *slot = present(field.as_ref()).ok_or(ValidationError::MissingFields)?;
    }

    let [ph, pa_co2, pa_o2, fio2, bicarbonate] = values;

    Ok(Measurement {
        ph: PH.check(ph)?,
        pa_co2: PA_CO2.check(pa_co2)?,
        pa_o2: PA_O2.check(pa_o2)?,
        fio2: FIO2.check(fio2)?,
        bicarbonate: BICARBONATE.check(bicarbonate)?,
    })
}

fn present(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if number == 0.0 || number.is_nan() {
        return None;
    }
    Some(number)
}
