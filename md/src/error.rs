use structure::CollaboratorError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MdError {
    #[error("no potential evaluator is attached to the structure")]
    CalculatorNotAttached,

    #[error("MD run failed while {stage}: {source}")]
    Runtime {
        stage: &'static str,
        #[source]
        source: CollaboratorError,
    },
}

impl MdError {
    pub(crate) fn runtime(stage: &'static str, source: CollaboratorError) -> Self {
        MdError::Runtime { stage, source }
    }
}
