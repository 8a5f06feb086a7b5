//! Error taxonomy shared by the structure pipeline.
//!
//! Input errors are raised before any expensive call, construction errors
//! wrap geometric or crystallographic failures, and collaborator errors carry
//! the message of an external service (potential, optimizer, integrator).

use thiserror::Error;

/// Problems with user-supplied values, detected before anything is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("atom list is empty or contains an empty entry; atoms must be comma-separated")]
    EmptyInput,

    #[error("atom '{0}' contains spaces; separate atoms with commas only")]
    MalformedAtom(String),

    #[error("temperature {kelvin} K is at or below absolute zero")]
    SubZeroTemperature { kelvin: f64 },

    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown {kind} '{token}'")]
    UnknownToken { kind: &'static str, token: String },
}

/// Failures while turning validated inputs into a [`crate::StructureState`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    #[error("no atoms were given")]
    EmptyStructure,

    #[error("{species} species but {positions} basis positions")]
    SpeciesBasisMismatch { species: usize, positions: usize },

    #[error("degenerate cell: {0}")]
    DegenerateCell(String),

    #[error("invalid lattice angles: {0}")]
    InvalidAngles(String),

    #[error("unknown chemical element '{0}'")]
    UnknownElement(String),

    #[error("invalid space group {number}: {reason}")]
    InvalidSpaceGroup { number: i32, reason: String },

    #[error("fractional coordinate {value} of atom {atom} is outside [-1, 1]")]
    CoordinateOutOfRange { atom: usize, value: f64 },

    #[error("cannot place {first} and {second} on the same site {site:?}")]
    ConflictingSites {
        first: String,
        second: String,
        site: [f64; 3],
    },

    #[error("invalid perturbation: {0}")]
    InvalidPerturbation(String),

    #[error("{velocities} velocities for {atoms} atoms")]
    VelocityCountMismatch { atoms: usize, velocities: usize },
}

/// An error reported by an external collaborator, kept as its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Energy or force queries against a structure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculatorError {
    #[error("no potential evaluator is attached to the structure")]
    NotAttached,

    #[error("potential evaluation failed: {0}")]
    Evaluation(#[from] CollaboratorError),
}
