//! The potential-evaluator collaborator.
//!
//! An evaluator is loaded elsewhere (see the studio crate) and attached to a
//! structure as a shared handle. Relaxed and MD structures carry the same
//! handle forward instead of loading a new one.

use crate::error::CollaboratorError;
use crate::state::StructureState;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What an evaluator was loaded from; forwarded to services that need to
/// rebuild the same evaluator on their side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatorInfo {
    pub model: String,
    pub checkpoint: String,
    pub device: String,
    pub map_location: Option<String>,
}

/// Energy (eV), forces (eV/Å) and, when available, Voigt stress (eV/Å³).
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub energy: f64,
    pub forces: Vec<Vector3<f64>>,
    pub stress: Option<[f64; 6]>,
}

impl Evaluation {
    pub fn max_force(&self) -> f64 {
        self.forces.iter().map(|f| f.norm()).fold(0.0, f64::max)
    }
}

pub trait Calculator: fmt::Debug + Send + Sync {
    fn info(&self) -> &CalculatorInfo;

    fn evaluate(&self, structure: &StructureState) -> Result<Evaluation, CollaboratorError>;
}

pub type CalculatorHandle = Arc<dyn Calculator>;

/// True when both handles point at the same loaded evaluator.
pub fn same_calculator(a: &CalculatorHandle, b: &CalculatorHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
