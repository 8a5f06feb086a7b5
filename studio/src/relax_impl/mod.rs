//! Relaxation Orchestrator
//!
//! The optimizer, the cell filters and the symmetry constraint are external;
//! this module validates the request, drives the collaborator and normalizes
//! whatever it returns into a converged structure or a typed failure.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use structure::units::{normalize_pressure, pressure_in_gpa};
use structure::{CollaboratorError, InputError, PressureUnit, StructureState};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OptimizerKind {
    #[serde(rename = "BFGS")]
    Bfgs,
    #[serde(rename = "FIRE")]
    Fire,
}

impl OptimizerKind {
    pub fn token(&self) -> &'static str {
        match self {
            OptimizerKind::Bfgs => "BFGS",
            OptimizerKind::Fire => "FIRE",
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BFGS" => Ok(OptimizerKind::Bfgs),
            "FIRE" => Ok(OptimizerKind::Fire),
            _ => Err(InputError::UnknownToken {
                kind: "optimizer",
                token: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellFilter {
    ExpCellFilter,
    FrechetCellFilter,
}

impl CellFilter {
    pub fn token(&self) -> &'static str {
        match self {
            CellFilter::ExpCellFilter => "ExpCellFilter",
            CellFilter::FrechetCellFilter => "FrechetCellFilter",
        }
    }

    /// Parse a filter token; `None` (any case) or an empty string means
    /// positions-only relaxation.
    pub fn parse_optional(s: &str) -> Result<Option<Self>, InputError> {
        match s.trim() {
            "" => Ok(None),
            t if t.eq_ignore_ascii_case("none") => Ok(None),
            "ExpCellFilter" => Ok(Some(CellFilter::ExpCellFilter)),
            "FrechetCellFilter" => Ok(Some(CellFilter::FrechetCellFilter)),
            _ => Err(InputError::UnknownToken {
                kind: "cell filter",
                token: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CellFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Raised when the pressure is entered in eV/Å³ with a value that is almost
/// certainly meant as GPa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureAdvisory {
    pub value: f64,
    pub gpa: f64,
}

impl fmt::Display for PressureAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pressure {} eV/A^3 is {:.1} GPa; 1 eV/A^3 is already ~160 GPa",
            self.value, self.gpa
        )
    }
}

pub fn pressure_advisory(value: f64, unit: PressureUnit) -> Option<PressureAdvisory> {
    match unit {
        PressureUnit::EvPerCubicAngstrom if value >= 1.0 => Some(PressureAdvisory {
            value,
            gpa: pressure_in_gpa(value),
        }),
        _ => None,
    }
}

/// What the optimizer is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelaxerSettings {
    pub optimizer: OptimizerKind,
    pub filter: Option<CellFilter>,
    pub constrain_symmetry: bool,
}

/// Validated relaxation parameters. The pressure is stored in eV/Å³.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationRequest {
    settings: RelaxerSettings,
    fmax: f64,
    steps: usize,
    pressure: f64,
}

impl RelaxationRequest {
    pub fn new(
        optimizer: OptimizerKind,
        filter: Option<CellFilter>,
        constrain_symmetry: bool,
        fmax: f64,
        steps: usize,
        pressure: f64,
        unit: PressureUnit,
    ) -> Result<Self, InputError> {
        if !fmax.is_finite() || fmax <= 0.0 {
            return Err(InputError::InvalidParameter {
                name: "fmax",
                reason: format!("expected a positive force in eV/A, got {fmax}"),
            });
        }
        if !pressure.is_finite() || pressure < 0.0 {
            return Err(InputError::InvalidParameter {
                name: "pressure",
                reason: format!("expected a non-negative pressure, got {pressure} {unit}"),
            });
        }

        Ok(Self {
            settings: RelaxerSettings {
                optimizer,
                filter,
                constrain_symmetry,
            },
            fmax,
            steps,
            pressure: normalize_pressure(pressure, unit),
        })
    }

    pub fn settings(&self) -> &RelaxerSettings {
        &self.settings
    }

    pub fn fmax(&self) -> f64 {
        self.fmax
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Target scalar pressure in eV/Å³.
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn pressure_gpa(&self) -> f64 {
        pressure_in_gpa(self.pressure)
    }
}

/// Parameters forwarded to the cell filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterParams {
    pub scalar_pressure: f64,
}

/// The two shapes a relaxer may answer with, plus anything else it
/// produced.
#[derive(Debug, Clone)]
pub enum RawRelaxOutput {
    Structure(StructureState),
    Flagged {
        success: bool,
        structure: Option<StructureState>,
    },
    Unrecognized(String),
}

pub trait Relaxer {
    fn relax(
        &self,
        structure: &StructureState,
        steps: usize,
        fmax: f64,
        filter_params: &FilterParams,
    ) -> Result<RawRelaxOutput, CollaboratorError>;
}

pub trait RelaxerBuilder {
    fn build(&self, settings: &RelaxerSettings) -> Result<Box<dyn Relaxer>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelaxError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("no potential evaluator is attached to the structure")]
    CalculatorNotAttached,

    #[error("failed to initialize relaxer: {0}")]
    RelaxerInit(#[source] CollaboratorError),

    #[error("an error occurred during relaxation: {0}")]
    Runtime(#[source] CollaboratorError),

    #[error("relaxation did not converge: optimizer returned failure flag")]
    Diverged,

    #[error("relaxation returned unexpected output: {0}")]
    UnexpectedOutput(String),
}

/// Relaxer output after normalization.
#[derive(Debug, Clone)]
pub enum RelaxOutcome {
    Converged(StructureState),
    Diverged,
}

impl RelaxOutcome {
    pub fn from_raw(raw: RawRelaxOutput) -> Result<Self, RelaxError> {
        match raw {
            RawRelaxOutput::Structure(structure) => Ok(RelaxOutcome::Converged(structure)),
            RawRelaxOutput::Flagged { success: false, .. } => Ok(RelaxOutcome::Diverged),
            RawRelaxOutput::Flagged {
                success: true,
                structure: Some(structure),
            } => Ok(RelaxOutcome::Converged(structure)),
            RawRelaxOutput::Flagged {
                success: true,
                structure: None,
            } => Err(RelaxError::UnexpectedOutput(
                "no structure returned".to_string(),
            )),
            RawRelaxOutput::Unrecognized(kind) => Err(RelaxError::UnexpectedOutput(format!(
                "unexpected return type from relaxer: {kind}"
            ))),
        }
    }
}

/// Relax `structure` and return the relaxed copy.
///
/// The input is never modified. The result carries the input's evaluator.
/// A non-converged run is an error, never a usable structure.
pub fn relax<B: RelaxerBuilder + ?Sized>(
    structure: &StructureState,
    request: &RelaxationRequest,
    builder: &B,
) -> Result<StructureState, RelaxError> {
    if structure.is_empty() {
        return Err(RelaxError::MissingInput("basis positions"));
    }
    if !structure.has_calculator() {
        return Err(RelaxError::CalculatorNotAttached);
    }

    let settings = request.settings();
    info!(
        "Starting relaxation: {} optimizer, filter {}, symmetry constrained: {}",
        settings.optimizer,
        settings.filter.map_or("None", |f| f.token()),
        settings.constrain_symmetry
    );
    let relaxer = builder.build(settings).map_err(RelaxError::RelaxerInit)?;

    let start = Instant::now();
    let filter_params = FilterParams {
        scalar_pressure: request.pressure(),
    };
    let raw = relaxer
        .relax(structure, request.steps(), request.fmax(), &filter_params)
        .map_err(RelaxError::Runtime)?;

    let relaxed = match RelaxOutcome::from_raw(raw)? {
        RelaxOutcome::Converged(relaxed) => relaxed,
        RelaxOutcome::Diverged => {
            warn!("Optimizer reported failure after {:.2?}", start.elapsed());
            return Err(RelaxError::Diverged);
        }
    };
    if relaxed.len() != structure.len() {
        return Err(RelaxError::UnexpectedOutput(format!(
            "relaxer returned {} atoms for a {}-atom structure",
            relaxed.len(),
            structure.len()
        )));
    }

    info!("Time taken for relaxation: {:.2?}", start.elapsed());
    Ok(relaxed.with_calculator_from(structure))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_tokens() {
        assert_eq!(
            CellFilter::parse_optional("FrechetCellFilter").unwrap(),
            Some(CellFilter::FrechetCellFilter)
        );
        assert_eq!(CellFilter::parse_optional("None").unwrap(), None);
        assert_eq!(CellFilter::parse_optional("").unwrap(), None);
        assert!(CellFilter::parse_optional("UnitCellFilter").is_err());
        assert_eq!("fire".parse::<OptimizerKind>().unwrap(), OptimizerKind::Fire);
    }

    #[test]
    fn test_request_normalizes_pressure() {
        let request = RelaxationRequest::new(
            OptimizerKind::Bfgs,
            Some(CellFilter::FrechetCellFilter),
            true,
            0.01,
            500,
            1.0,
            PressureUnit::EvPerCubicAngstrom,
        )
        .unwrap();
        assert_eq!(request.pressure(), 1.0);
        assert!((request.pressure_gpa() - 160.21766208).abs() < 1e-9);

        let request = RelaxationRequest::new(
            OptimizerKind::Fire,
            None,
            false,
            0.05,
            0,
            10.0,
            PressureUnit::GPa,
        )
        .unwrap();
        assert!((request.pressure() * 160.21766208 - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_request_rejects_bad_values() {
        assert!(matches!(
            RelaxationRequest::new(
                OptimizerKind::Bfgs,
                None,
                true,
                0.0,
                10,
                0.0,
                PressureUnit::GPa
            ),
            Err(InputError::InvalidParameter { name: "fmax", .. })
        ));
        assert!(matches!(
            RelaxationRequest::new(
                OptimizerKind::Bfgs,
                None,
                true,
                0.01,
                10,
                -1.0,
                PressureUnit::GPa
            ),
            Err(InputError::InvalidParameter { name: "pressure", .. })
        ));
    }

    #[test]
    fn test_pressure_advisory_threshold() {
        assert!(pressure_advisory(1.0, PressureUnit::EvPerCubicAngstrom).is_some());
        assert!(pressure_advisory(0.5, PressureUnit::EvPerCubicAngstrom).is_none());
        assert!(pressure_advisory(100.0, PressureUnit::GPa).is_none());
    }

    #[test]
    fn test_unrecognized_output_is_an_error() {
        assert_eq!(
            RelaxOutcome::from_raw(RawRelaxOutput::Unrecognized("NoneType".to_string()))
                .unwrap_err(),
            RelaxError::UnexpectedOutput(
                "unexpected return type from relaxer: NoneType".to_string()
            )
        );
        assert!(matches!(
            RelaxOutcome::from_raw(RawRelaxOutput::Flagged {
                success: false,
                structure: None
            }),
            Ok(RelaxOutcome::Diverged)
        ));
    }
}
