//! Atomic structures for the studio pipeline: lattice geometry, unit
//! conversion, input gates, the structure factory and the potential-evaluator
//! collaborator.

pub mod calculator;
pub mod error;
pub mod factory;
pub mod lattice;
pub mod state;
pub mod symmetry;
pub mod units;
pub mod validate;

pub use calculator::{Calculator, CalculatorHandle, CalculatorInfo, Evaluation};
pub use error::{CalculatorError, CollaboratorError, ConstructionError, InputError};
pub use factory::{
    BuilderMode, CrystalSpec, FreeformSpec, Rattle, StructureFactory, StructureSpec,
};
pub use lattice::{Lattice, LatticeParameters};
pub use state::StructureState;
pub use symmetry::{MoyoSpaceGroups, SpaceGroupSource, SymmetryOperation};
pub use units::{normalize_pressure, normalize_temperature, PressureUnit, TemperatureUnit};
pub use validate::{validate_atom_list, validate_temperature};
