//! Collaborator traits implemented on top of the worker.

use super::protocol::{
    AtomsPayload, CheckRelaxerRequest, EvaluateReply, EvaluateRequest, LoadRequest, MdReply,
    MdRunRequest, ProbeReply, RelaxReply, RelaxRequest,
};
use super::PythonWorker;
use crate::app::CalculatorLoader;
use crate::relax_impl::{FilterParams, RawRelaxOutput, Relaxer, RelaxerBuilder, RelaxerSettings};
use md::{Frame, Integrator, IntegratorFactory, MdRequest};
use serde_json::Value;
use std::sync::Arc;
use structure::{
    Calculator, CalculatorHandle, CalculatorInfo, CollaboratorError, Evaluation, StructureState,
};
use tracing::{info, warn};

fn calculator_info(structure: &StructureState) -> Result<CalculatorInfo, CollaboratorError> {
    structure
        .calculator()
        .map(|calculator| calculator.info().clone())
        .ok_or_else(|| CollaboratorError::new("structure has no evaluator attached"))
}

/// A model loaded inside the worker, addressed by its load parameters.
#[derive(Debug)]
pub struct WorkerCalculator {
    info: CalculatorInfo,
    worker: Arc<PythonWorker>,
}

impl Calculator for WorkerCalculator {
    fn info(&self) -> &CalculatorInfo {
        &self.info
    }

    fn evaluate(&self, structure: &StructureState) -> Result<Evaluation, CollaboratorError> {
        let reply: EvaluateReply = self.worker.call(
            "evaluate",
            &EvaluateRequest {
                calculator: &self.info,
                atoms: AtomsPayload::from_state(structure),
            },
        )?;
        Ok(reply.into())
    }
}

pub struct WorkerLoader {
    worker: Arc<PythonWorker>,
}

impl WorkerLoader {
    pub fn new(worker: Arc<PythonWorker>) -> Self {
        Self { worker }
    }
}

impl CalculatorLoader for WorkerLoader {
    fn accelerator_available(&self) -> bool {
        match self.worker.call::<_, ProbeReply>("probe", &Value::Null) {
            Ok(reply) => {
                if let Some(name) = reply.device_name {
                    info!("Accelerator: {}", name);
                }
                reply.accelerator
            }
            Err(e) => {
                warn!("Accelerator probe failed, assuming none: {}", e);
                false
            }
        }
    }

    fn load(&self, info: &CalculatorInfo) -> Result<CalculatorHandle, CollaboratorError> {
        self.worker
            .call::<_, Value>("load", &LoadRequest { calculator: info })?;
        Ok(Arc::new(WorkerCalculator {
            info: info.clone(),
            worker: self.worker.clone(),
        }))
    }
}

pub struct WorkerRelaxerBuilder {
    worker: Arc<PythonWorker>,
}

impl WorkerRelaxerBuilder {
    pub fn new(worker: Arc<PythonWorker>) -> Self {
        Self { worker }
    }
}

impl RelaxerBuilder for WorkerRelaxerBuilder {
    fn build(&self, settings: &RelaxerSettings) -> Result<Box<dyn Relaxer>, CollaboratorError> {
        self.worker
            .call::<_, Value>("check_relaxer", &CheckRelaxerRequest { settings })?;
        Ok(Box::new(WorkerRelaxer {
            settings: *settings,
            worker: self.worker.clone(),
        }))
    }
}

struct WorkerRelaxer {
    settings: RelaxerSettings,
    worker: Arc<PythonWorker>,
}

impl Relaxer for WorkerRelaxer {
    fn relax(
        &self,
        structure: &StructureState,
        steps: usize,
        fmax: f64,
        filter_params: &FilterParams,
    ) -> Result<RawRelaxOutput, CollaboratorError> {
        let calculator = calculator_info(structure)?;
        let reply: RelaxReply = self.worker.call(
            "relax",
            &RelaxRequest {
                calculator: &calculator,
                atoms: AtomsPayload::from_state(structure),
                settings: &self.settings,
                steps,
                fmax,
                filter_params,
            },
        )?;
        reply.into_raw()
    }
}

pub struct WorkerIntegratorFactory {
    worker: Arc<PythonWorker>,
}

impl WorkerIntegratorFactory {
    pub fn new(worker: Arc<PythonWorker>) -> Self {
        Self { worker }
    }
}

impl IntegratorFactory for WorkerIntegratorFactory {
    fn create(
        &self,
        structure: &StructureState,
        request: &MdRequest,
    ) -> Result<Box<dyn Integrator>, CollaboratorError> {
        Ok(Box::new(WorkerIntegrator {
            calculator: calculator_info(structure)?,
            atoms: AtomsPayload::from_state(structure),
            request: *request,
            worker: self.worker.clone(),
            reply: None,
        }))
    }
}

/// The dynamics object lives in the worker only for the duration of `run`.
/// Construction problems in the worker therefore surface while stepping.
struct WorkerIntegrator {
    calculator: CalculatorInfo,
    atoms: AtomsPayload,
    request: MdRequest,
    worker: Arc<PythonWorker>,
    reply: Option<MdReply>,
}

impl Integrator for WorkerIntegrator {
    fn run(&mut self, n_steps: usize) -> Result<(), CollaboratorError> {
        let reply: MdReply = self.worker.call(
            "md",
            &MdRunRequest {
                calculator: &self.calculator,
                atoms: &self.atoms,
                ensemble: self.request.ensemble().token(),
                temperature: self.request.temperature_k(),
                timestep: self.request.timestep_fs(),
                taut: self.request.thermostat_timescale(),
                n_steps,
            },
        )?;
        self.reply = Some(reply);
        Ok(())
    }

    fn final_structure(&self) -> Result<StructureState, CollaboratorError> {
        self.reply
            .as_ref()
            .map(|reply| reply.atoms.clone())
            .ok_or_else(|| CollaboratorError::new("integrator has not been run"))?
            .into_state()
    }

    fn trajectory(&self) -> Vec<Frame> {
        self.reply
            .as_ref()
            .map(|reply| reply.frames.clone())
            .unwrap_or_default()
    }
}
