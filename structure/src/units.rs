//! Pressure and temperature unit handling.
//!
//! Internal pressure unit is eV/Å³, internal temperature unit is Kelvin.
//! Conversion happens once at the boundary; orchestrators only ever see
//! normalized values.

use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One eV/Å³ expressed in GPa.
pub const EV_PER_A3_IN_GPA: f64 = 160.21766208;

/// 0 °C in Kelvin.
pub const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PressureUnit {
    #[serde(rename = "GPa")]
    GPa,
    #[serde(rename = "eV/A^3")]
    EvPerCubicAngstrom,
}

impl PressureUnit {
    pub fn token(&self) -> &'static str {
        match self {
            PressureUnit::GPa => "GPa",
            PressureUnit::EvPerCubicAngstrom => "eV/A^3",
        }
    }
}

impl FromStr for PressureUnit {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "GPa" => Ok(Self::GPa),
            "eV/A^3" => Ok(Self::EvPerCubicAngstrom),
            other => Err(InputError::UnknownToken {
                kind: "pressure unit",
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "K")]
    Kelvin,
    #[serde(rename = "deg")]
    Celsius,
}

impl TemperatureUnit {
    pub fn token(&self) -> &'static str {
        match self {
            TemperatureUnit::Kelvin => "K",
            TemperatureUnit::Celsius => "deg",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "K" => Ok(Self::Kelvin),
            "deg" => Ok(Self::Celsius),
            other => Err(InputError::UnknownToken {
                kind: "temperature unit",
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Express a pressure in eV/Å³.
pub fn normalize_pressure(value: f64, unit: PressureUnit) -> f64 {
    match unit {
        PressureUnit::GPa => value / EV_PER_A3_IN_GPA,
        PressureUnit::EvPerCubicAngstrom => value,
    }
}

/// Inverse of [`normalize_pressure`] for reporting.
pub fn pressure_in_gpa(internal: f64) -> f64 {
    internal * EV_PER_A3_IN_GPA
}

/// Express a temperature in Kelvin.
pub fn normalize_temperature(value: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Kelvin => value,
        TemperatureUnit::Celsius => value + ZERO_CELSIUS_IN_KELVIN,
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - ZERO_CELSIUS_IN_KELVIN
}
