//! One studio session: the pipeline state plus the collaborators that move
//! it forward. Each action runs to completion before the next one starts.

use super::calculator::{attach_calculator, CalculatorLoader, CalculatorRegistry};
use super::pipeline::{PipelineState, Stage};
use super::report::{report_energy, report_md, report_relaxation, summarize};
use crate::config::{load_config, Args, Config};
use crate::error::StudioError;
use crate::io::worker::{WorkerIntegratorFactory, WorkerLoader, WorkerRelaxerBuilder};
use crate::io::{write_view, CheckpointStore, PythonWorker};
use crate::relax_impl::{relax, RelaxerBuilder};
use md::{run_md, IntegratorFactory};
use nalgebra::Vector3;
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use structure::{CollaboratorError, InputError, StructureFactory, StructureState};
use tracing::{error, info, warn};

/// The external services a session drives.
pub struct Collaborators {
    pub loader: Box<dyn CalculatorLoader>,
    pub relaxer: Box<dyn RelaxerBuilder>,
    pub integrator: Box<dyn IntegratorFactory>,
}

impl Collaborators {
    /// All three services backed by one Python worker.
    pub fn python(interpreter: &str) -> Result<Self, CollaboratorError> {
        let worker = Arc::new(PythonWorker::new(interpreter)?);
        Ok(Self {
            loader: Box::new(WorkerLoader::new(worker.clone())),
            relaxer: Box::new(WorkerRelaxerBuilder::new(worker.clone())),
            integrator: Box::new(WorkerIntegratorFactory::new(worker)),
        })
    }
}

fn checkpoint_store(config: &Config) -> CheckpointStore {
    CheckpointStore::new(
        config.model.model_dir.as_ref().map(PathBuf::from),
        config.model.download_url.clone(),
    )
}

/// What a reload ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reload {
    Rebuilt,
    Reattached,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reload,
    Relax,
    Md,
    Show(Option<Stage>),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || InputError::UnknownToken {
            kind: "command",
            token: s.trim().to_string(),
        };
        let mut words = s.split_whitespace();
        let command = match words.next().map(str::to_lowercase).as_deref() {
            Some("reload") => Command::Reload,
            Some("relax") => Command::Relax,
            Some("md") => Command::Md,
            Some("show") => Command::Show(match words.next() {
                None => None,
                Some("initial") => Some(Stage::Initial),
                Some("relaxed") => Some(Stage::Relaxed),
                Some("md") => Some(Stage::Md),
                Some(_) => return Err(unknown()),
            }),
            Some("help") | Some("?") => Command::Help,
            Some("quit") | Some("exit") => Command::Quit,
            _ => return Err(unknown()),
        };
        if words.next().is_some() {
            return Err(unknown());
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reload => f.write_str("reload"),
            Command::Relax => f.write_str("relax"),
            Command::Md => f.write_str("md"),
            Command::Show(None) => f.write_str("show"),
            Command::Show(Some(stage)) => write!(f, "show {}", stage.name()),
            Command::Help => f.write_str("help"),
            Command::Quit => f.write_str("quit"),
        }
    }
}

const HELP: &str = "\
Commands:
  reload               re-read the configuration file
  relax                relax the initial structure
  md                   run MD on the latest structure
  show [initial|relaxed|md]
                       summarize a stage and write its view (default: latest)
  help                 this text
  quit                 end the session";

pub struct Session {
    config: Config,
    args: Args,
    pipeline: PipelineState,
    factory: StructureFactory,
    registry: CalculatorRegistry,
    relaxer: Box<dyn RelaxerBuilder>,
    integrator: Box<dyn IntegratorFactory>,
}

impl Session {
    pub fn new(config: Config, args: Args, collaborators: Collaborators) -> Self {
        let registry = CalculatorRegistry::new(collaborators.loader, checkpoint_store(&config));
        Self {
            config,
            args,
            pipeline: PipelineState::new(),
            factory: StructureFactory::new(),
            registry,
            relaxer: collaborators.relaxer,
            integrator: collaborators.integrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    /// Build the initial structure from the current configuration, attach
    /// the evaluator and show it. Replaces `initial` and clears `relaxed`.
    pub fn build(&mut self) -> Result<(), StudioError> {
        let structure = match self.build_structure() {
            Ok(structure) => structure,
            Err(err) => {
                if self.pipeline.initial().is_some() {
                    warn!("Structure inputs are invalid, dropping the held structures");
                }
                self.pipeline.clear();
                return Err(err);
            }
        };
        self.pipeline.replace_initial(structure);
        self.show(Some(Stage::Initial))?;
        Ok(())
    }

    fn build_structure(&mut self) -> Result<StructureState, StudioError> {
        let spec = self.config.structure_spec()?;
        let rattle = self.config.rattle()?;
        let mut structure = self.factory.build(&spec, rattle.as_ref())?;
        if let Some(velocities) = &self.config.structure.velocities {
            structure =
                structure.with_velocities(velocities.iter().map(|&v| Vector3::from(v)).collect())?;
        }

        let variant = self.config.model_variant()?;
        let device = self.config.device()?;
        attach_calculator(&mut structure, variant, device, &mut self.registry)?;
        Ok(structure)
    }

    /// Re-read the configuration file and apply it.
    pub fn reload(&mut self) -> Result<Reload, StudioError> {
        info!("Reading configuration from: {}", self.args.config_file);
        let config = load_config(&self.args.config_file)?;
        self.apply_config(config)
    }

    /// Switch to `config`. The structure is rebuilt only when its inputs
    /// changed; a new model or device is attached to the held structures.
    pub fn apply_config(&mut self, mut config: Config) -> Result<Reload, StudioError> {
        config.apply_overrides(&self.args);
        let previous = std::mem::replace(&mut self.config, config);
        self.registry.set_store(checkpoint_store(&self.config));

        if previous.structure != self.config.structure || self.pipeline.initial().is_none() {
            info!("Structure inputs changed, rebuilding");
            self.build()?;
            return Ok(Reload::Rebuilt);
        }
        if previous.model != self.config.model {
            if let Err(err) = self.reattach() {
                // Keep the old selection so the next reload retries.
                self.config.model = previous.model;
                return Err(err);
            }
            return Ok(Reload::Reattached);
        }
        info!("Configuration unchanged for the structure and model");
        Ok(Reload::Unchanged)
    }

    fn reattach(&mut self) -> Result<(), StudioError> {
        let variant = self.config.model_variant()?;
        let resolution = self.registry.resolve(self.config.device()?);
        if let Some(advisory) = resolution.advisory {
            warn!("{}", advisory);
        }
        let handle = self.registry.get_or_load(variant, &resolution)?;
        self.pipeline.attach_everywhere(&handle);
        info!("Model {} on {} attached", variant, resolution.device);
        Ok(())
    }

    /// Relax the initial structure and make the result the relaxed stage.
    pub fn relax(&mut self) -> Result<(), StudioError> {
        let (request, advisory) = self.config.relaxation_request()?;
        if let Some(advisory) = advisory {
            warn!("{}", advisory);
        }
        let initial = self.pipeline.initial().ok_or(StudioError::NoStructure("initial"))?;

        info!("Relaxing structure, this may take a while...");
        let relaxed = relax(initial, &request, self.relaxer.as_ref())?;
        report_relaxation(&request);
        self.pipeline.set_relaxed(relaxed);
        self.show(Some(Stage::Relaxed))?;
        Ok(())
    }

    /// Run MD on the latest structure.
    pub fn md(&mut self) -> Result<(), StudioError> {
        let request = self.config.md_request()?;
        let latest = self.pipeline.latest().ok_or(StudioError::NoStructure("initial"))?;

        info!("Running MD simulation, this may take a while...");
        let trajectory = run_md(latest, &request, self.integrator.as_ref())?;
        report_md(&trajectory);
        self.pipeline.set_trajectory(trajectory);
        self.show(Some(Stage::Md))?;
        Ok(())
    }

    /// Summarize `stage` (the latest one when `None`) and write its view.
    pub fn show(&self, stage: Option<Stage>) -> Result<PathBuf, StudioError> {
        let stage = stage.unwrap_or(match self.pipeline.relaxed() {
            Some(_) => Stage::Relaxed,
            None => Stage::Initial,
        });
        let structure = self
            .pipeline
            .stage(stage)
            .ok_or(StudioError::NoStructure(stage.name()))?;
        self.present(stage, structure)
    }

    fn present(&self, stage: Stage, structure: &StructureState) -> Result<PathBuf, StudioError> {
        let summary = summarize(structure)?;
        report_energy(stage.name(), structure, &summary);
        let dir = Path::new(&self.config.view.output_dir);
        Ok(write_view(structure, stage.name(), dir, &self.config.view_options())?)
    }

    /// Build, then relax and run MD when enabled. The first failure ends the
    /// run.
    pub fn run_once(&mut self) -> Result<(), StudioError> {
        self.build()?;
        if self.config.relaxation.enabled {
            self.relax()?;
        }
        if self.config.md.enabled {
            self.md()?;
        }
        Ok(())
    }

    /// Run one command. Returns `false` when the session should end.
    pub fn execute(&mut self, command: Command) -> Result<bool, StudioError> {
        match command {
            Command::Reload => {
                let outcome = self.reload()?;
                info!("Reload: {:?}", outcome);
            }
            Command::Relax => self.relax()?,
            Command::Md => self.md()?,
            Command::Show(stage) => {
                self.show(stage)?;
            }
            Command::Help => info!("\n{}", HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Read commands from `input` until `quit` or end of input. A failed
    /// command is reported and the session carries on.
    pub fn run_interactive<R: BufRead>(&mut self, input: R) {
        if let Err(e) = self.build() {
            error!("{}", e.user_message());
        }
        info!("\n{}", HELP);

        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Stopped reading commands: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let outcome = line
                .parse::<Command>()
                .map_err(StudioError::from)
                .and_then(|command| self.execute(command));
            match outcome {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => error!("{}", e.user_message()),
            }
        }
        info!("Session ended");
    }
}
