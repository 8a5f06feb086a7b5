mod model_store;
mod output;
mod viewer;
pub mod worker;

pub use model_store::CheckpointStore;
pub use output::setup_output;
pub use viewer::{build_scene, render_html, to_xyz, write_view, RenderError, ViewOptions, MAX_REPEAT};
pub use worker::PythonWorker;
