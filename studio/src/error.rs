//! One error type for everything a studio action can fail with.

use crate::app::CalculatorAttachError;
use crate::config::ConfigError;
use crate::io::RenderError;
use crate::relax_impl::RelaxError;
use md::MdError;
use structure::{CalculatorError, CollaboratorError, ConstructionError, InputError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Calculator(#[from] CalculatorError),

    #[error(transparent)]
    CalculatorAttach(#[from] CalculatorAttachError),

    #[error(transparent)]
    Relax(#[from] RelaxError),

    #[error(transparent)]
    Md(#[from] MdError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start the worker: {0}")]
    Worker(#[source] CollaboratorError),

    #[error("no {0} structure is available yet")]
    NoStructure(&'static str),
}

impl StudioError {
    /// The message shown to the user; the action is abandoned, the session
    /// is not.
    pub fn user_message(&self) -> String {
        let kind = match self {
            StudioError::Input(_) => "Invalid input",
            StudioError::Construction(_) => "Failed to build the structure",
            StudioError::Calculator(_) => "Energy evaluation failed",
            StudioError::CalculatorAttach(_) => "Failed to attach calculator to structure",
            StudioError::Relax(RelaxError::RelaxerInit(_)) => "Failed to initialize relaxer",
            StudioError::Relax(_) => "Relaxation failed",
            StudioError::Md(_) => "MD simulation failed",
            StudioError::Render(_) => "Failed to render the structure",
            StudioError::Config(_) => "Configuration error",
            StudioError::Worker(_) => "Worker error",
            StudioError::NoStructure(_) => "Nothing to do",
        };
        format!("{kind}: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_names_the_action() {
        let err = StudioError::from(InputError::SubZeroTemperature { kelvin: 0.0 });
        assert!(err.user_message().starts_with("Invalid input: "));

        let err = StudioError::from(RelaxError::Diverged);
        assert_eq!(
            err.user_message(),
            "Relaxation failed: relaxation did not converge: optimizer returned failure flag"
        );

        let err = StudioError::NoStructure("relaxed");
        assert_eq!(
            err.user_message(),
            "Nothing to do: no relaxed structure is available yet"
        );
    }
}
