//! Ensemble tokens and the validated MD request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use structure::units::kelvin_to_celsius;
use structure::{validate_temperature, InputError, TemperatureUnit};

/// Thermostat timescale multiplier applied to the timestep when unset.
pub const DEFAULT_TAUT_FACTOR: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ensemble {
    #[serde(rename = "NVT_NOSE_HOOVER")]
    NvtNoseHoover,
    #[serde(rename = "NVT_BERENDSEN")]
    NvtBerendsen,
}

impl Ensemble {
    pub fn token(&self) -> &'static str {
        match self {
            Ensemble::NvtNoseHoover => "NVT_NOSE_HOOVER",
            Ensemble::NvtBerendsen => "NVT_BERENDSEN",
        }
    }
}

impl FromStr for Ensemble {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NVT_NOSE_HOOVER" => Ok(Ensemble::NvtNoseHoover),
            "NVT_BERENDSEN" => Ok(Ensemble::NvtBerendsen),
            _ => Err(InputError::UnknownToken {
                kind: "ensemble",
                token: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Ensemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Parameters of one MD run. Temperature is always Kelvin and always above
/// absolute zero; the only way in is [`MdRequest::new`], which runs the gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MdRequest {
    ensemble: Ensemble,
    temperature_k: f64,
    timestep_fs: f64,
    taut_fs: Option<f64>,
    n_steps: usize,
}

impl MdRequest {
    pub fn new(
        ensemble: Ensemble,
        temperature: f64,
        unit: TemperatureUnit,
        timestep_fs: f64,
        taut_fs: Option<f64>,
        n_steps: usize,
    ) -> Result<Self, InputError> {
        let temperature_k = validate_temperature(temperature, unit)?;
        if !timestep_fs.is_finite() || timestep_fs < 0.0 {
            return Err(InputError::InvalidParameter {
                name: "timestep",
                reason: format!("expected a non-negative number of fs, got {timestep_fs}"),
            });
        }
        if let Some(taut) = taut_fs {
            if !taut.is_finite() || taut <= 0.0 {
                return Err(InputError::InvalidParameter {
                    name: "taut",
                    reason: format!("expected a positive number of fs, got {taut}"),
                });
            }
        }

        Ok(Self {
            ensemble,
            temperature_k,
            timestep_fs,
            taut_fs,
            n_steps,
        })
    }

    pub fn ensemble(&self) -> Ensemble {
        self.ensemble
    }

    pub fn temperature_k(&self) -> f64 {
        self.temperature_k
    }

    pub fn temperature_celsius(&self) -> f64 {
        kelvin_to_celsius(self.temperature_k)
    }

    pub fn timestep_fs(&self) -> f64 {
        self.timestep_fs
    }

    /// The timescale as given, `None` when left to the default.
    pub fn taut_fs(&self) -> Option<f64> {
        self.taut_fs
    }

    /// Effective thermostat timescale in fs.
    pub fn thermostat_timescale(&self) -> f64 {
        self.taut_fs
            .unwrap_or(DEFAULT_TAUT_FACTOR * self.timestep_fs)
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }
}
