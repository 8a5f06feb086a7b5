//! MD Orchestrator: build an integrator for the requested ensemble, advance
//! it a fixed number of steps and read the final state back.

use crate::error::MdError;
use crate::request::MdRequest;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use structure::{CalculatorHandle, CollaboratorError, StructureState};
use tracing::{debug, info};

/// One recorded snapshot of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub step: usize,
    pub positions: Vec<Vector3<f64>>,
    #[serde(default)]
    pub potential_energy: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// A thermostatted integrator seeded with one structure.
pub trait Integrator {
    /// Advance `n_steps` steps. Nothing is returned; state is queried
    /// afterwards.
    fn run(&mut self, n_steps: usize) -> Result<(), CollaboratorError>;

    fn final_structure(&self) -> Result<StructureState, CollaboratorError>;

    /// Frames recorded during the run, possibly none.
    fn trajectory(&self) -> Vec<Frame>;
}

pub trait IntegratorFactory {
    fn create(
        &self,
        structure: &StructureState,
        request: &MdRequest,
    ) -> Result<Box<dyn Integrator>, CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct TrajectoryResult {
    request: MdRequest,
    final_structure: StructureState,
    frames: Vec<Frame>,
    elapsed: Duration,
}

impl TrajectoryResult {
    pub fn request(&self) -> &MdRequest {
        &self.request
    }

    pub fn final_structure(&self) -> &StructureState {
        &self.final_structure
    }

    /// Point the final structure at a newly selected evaluator.
    pub fn attach_calculator(&mut self, calculator: CalculatorHandle) {
        self.final_structure.attach_calculator(calculator);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Temperature of the last frame that reported one.
    pub fn final_temperature(&self) -> Option<f64> {
        self.frames.iter().rev().find_map(|frame| frame.temperature)
    }
}

/// Run MD on `structure`, which the caller has already chosen as the latest
/// state. The temperature gate ran when `request` was built.
///
/// The input is never touched. The final structure shares the input's
/// evaluator. Any collaborator failure is terminal and no partial trajectory
/// is returned.
pub fn run_md<F: IntegratorFactory + ?Sized>(
    structure: &StructureState,
    request: &MdRequest,
    factory: &F,
) -> Result<TrajectoryResult, MdError> {
    if !structure.has_calculator() {
        return Err(MdError::CalculatorNotAttached);
    }

    info!(
        "Running {} MD: {} steps at {:.2} K, timestep {} fs, taut {} fs",
        request.ensemble(),
        request.n_steps(),
        request.temperature_k(),
        request.timestep_fs(),
        request.thermostat_timescale()
    );
    let start = Instant::now();

    let mut integrator = factory
        .create(structure, request)
        .map_err(|e| MdError::runtime("constructing the integrator", e))?;
    integrator
        .run(request.n_steps())
        .map_err(|e| MdError::runtime("stepping", e))?;

    let final_structure = integrator
        .final_structure()
        .map_err(|e| MdError::runtime("reading the final state", e))?;
    if final_structure.len() != structure.len() {
        return Err(MdError::runtime(
            "reading the final state",
            CollaboratorError::new(format!(
                "integrator returned {} atoms for a {}-atom structure",
                final_structure.len(),
                structure.len()
            )),
        ));
    }
    let final_structure = final_structure.with_calculator_from(structure);
    let frames = integrator.trajectory();
    debug!("Integrator recorded {} frames", frames.len());

    let elapsed = start.elapsed();
    info!("Time taken for MD: {:.2?}", elapsed);

    Ok(TrajectoryResult {
        request: *request,
        final_structure,
        frames,
        elapsed,
    })
}
