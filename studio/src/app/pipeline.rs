use md::TrajectoryResult;
use structure::{CalculatorHandle, StructureState};
use tracing::debug;

/// Which structure is authoritative at each point of a session.
///
/// `initial` is replaced wholesale by the Structure Factory and doing so
/// always clears `relaxed`. Only a successful relaxation sets `relaxed`.
/// "Latest" is derived on every call, never cached.
#[derive(Debug, Default)]
pub struct PipelineState {
    initial: Option<StructureState>,
    relaxed: Option<StructureState>,
    trajectory: Option<TrajectoryResult>,
}

/// Stage names used for reports and view files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initial,
    Relaxed,
    Md,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Relaxed => "relaxed",
            Stage::Md => "md",
        }
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_initial(&mut self, structure: StructureState) {
        if self.relaxed.is_some() || self.trajectory.is_some() {
            debug!("Initial structure replaced, dropping derived results");
        }
        self.initial = Some(structure);
        self.relaxed = None;
        self.trajectory = None;
    }

    /// Drop every stage, after the inputs stopped describing a valid structure.
    pub fn clear(&mut self) {
        self.initial = None;
        self.relaxed = None;
        self.trajectory = None;
    }

    pub fn set_relaxed(&mut self, structure: StructureState) {
        self.relaxed = Some(structure);
    }

    pub fn set_trajectory(&mut self, trajectory: TrajectoryResult) {
        self.trajectory = Some(trajectory);
    }

    pub fn initial(&self) -> Option<&StructureState> {
        self.initial.as_ref()
    }

    pub fn relaxed(&self) -> Option<&StructureState> {
        self.relaxed.as_ref()
    }

    pub fn trajectory(&self) -> Option<&TrajectoryResult> {
        self.trajectory.as_ref()
    }

    /// `relaxed` if present, else `initial`.
    pub fn latest(&self) -> Option<&StructureState> {
        self.relaxed.as_ref().or(self.initial.as_ref())
    }

    pub fn stage(&self, stage: Stage) -> Option<&StructureState> {
        match stage {
            Stage::Initial => self.initial(),
            Stage::Relaxed => self.relaxed(),
            Stage::Md => self.trajectory.as_ref().map(|t| t.final_structure()),
        }
    }

    /// Point every held structure at `calculator`, after the model or device
    /// selection changed.
    pub fn attach_everywhere(&mut self, calculator: &CalculatorHandle) {
        for structure in [self.initial.as_mut(), self.relaxed.as_mut()]
            .into_iter()
            .flatten()
        {
            structure.attach_calculator(calculator.clone());
        }
        if let Some(trajectory) = self.trajectory.as_mut() {
            trajectory.attach_calculator(calculator.clone());
        }
    }
}
