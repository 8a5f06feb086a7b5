mod calculator;
mod pipeline;
mod report;
mod session;

pub use calculator::{
    attach_calculator, resolve_device, CalculatorAttachError, CalculatorLoader,
    CalculatorRegistry, Device, DeviceAdvisory, DeviceResolution, ModelVariant,
};
pub use pipeline::{PipelineState, Stage};
pub use report::{summarize, EnergySummary};
pub use session::{Collaborators, Command, Reload, Session};

use crate::config::{load_config, Args, Config};
use crate::error::StudioError;
use crate::io::setup_output;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{error, info};

pub struct StudioApplication {
    args: Args,
    config: Config,
}

impl StudioApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let mut config = load_config(&args.config_file)
            .wrap_err_with(|| format!("Unable to load configuration: {}", args.config_file))?;
        config.apply_overrides(&args);
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from {}:\n{:?}", self.args.config_file, self.config);

        let collaborators =
            Collaborators::python(&self.config.worker.python).map_err(StudioError::Worker)?;
        let interactive = self.args.interactive;
        let mut session = Session::new(self.config, self.args, collaborators);

        if interactive {
            session.run_interactive(std::io::stdin().lock());
            return Ok(());
        }
        session.run_once().map_err(|e| {
            error!("{}", e.user_message());
            e
        })?;
        info!("All requested stages finished");
        Ok(())
    }
}
