//! Structure studio: build a crystal or a free set of atoms, attach a
//! machine-learned potential, relax it, run MD and look at every stage.

pub mod app;
pub mod config;
pub mod error;
pub mod io;
pub mod relax_impl;

pub use app::{Session, StudioApplication};
pub use config::{load_config, Args, Config};
pub use error::StudioError;
