//! Input gates checked before any structure is built or any run starts.

use crate::error::InputError;
use crate::units::{normalize_temperature, TemperatureUnit};

/// Split a comma-separated atom list such as `"Fe, Pt"` into symbols.
pub fn validate_atom_list(raw: &str) -> Result<Vec<String>, InputError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(InputError::EmptyInput);
    }

    let atoms: Vec<String> = raw.split(',').map(|atom| atom.trim().to_string()).collect();
    if atoms.iter().any(String::is_empty) {
        return Err(InputError::EmptyInput);
    }

    if let Some(atom) = atoms.iter().find(|atom| atom.contains(char::is_whitespace)) {
        return Err(InputError::MalformedAtom(atom.clone()));
    }

    Ok(atoms)
}

/// Normalize a temperature to Kelvin and reject anything at or below 0 K.
pub fn validate_temperature(value: f64, unit: TemperatureUnit) -> Result<f64, InputError> {
    let kelvin = normalize_temperature(value, unit);
    if kelvin.is_nan() || kelvin <= 0.0 {
        return Err(InputError::SubZeroTemperature { kelvin });
    }
    Ok(kelvin)
}

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), InputError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(InputError::InvalidParameter {
            name,
            reason: format!("expected a positive number, got {value}"),
        })
    }
}

pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<(), InputError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(InputError::InvalidParameter {
            name,
            reason: format!("expected a non-negative number, got {value}"),
        })
    }
}
