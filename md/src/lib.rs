//! Molecular dynamics orchestration on top of an external integrator.

pub mod error;
pub mod request;
pub mod run_md;

pub use error::MdError;
pub use request::{Ensemble, MdRequest};
pub use run_md::{run_md, Frame, Integrator, IntegratorFactory, TrajectoryResult};
