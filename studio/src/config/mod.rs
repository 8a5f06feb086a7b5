//! Configuration management for the studio
//!
//! The YAML file mirrors the form the structure is defined through: model
//! selection, structure inputs, relaxation and MD parameters and the viewer.
//! Tokens stay strings here and are turned into typed values by the
//! conversion methods, so an unknown token surfaces as an input error at the
//! moment it is used.

mod args;

pub use args::Args;

use crate::app::{Device, ModelVariant};
use crate::io::ViewOptions;
use crate::relax_impl::{pressure_advisory, CellFilter, OptimizerKind, PressureAdvisory, RelaxationRequest};
use md::{Ensemble, MdRequest};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use structure::{
    validate_atom_list, BuilderMode, CrystalSpec, FreeformSpec, InputError, LatticeParameters,
    PressureUnit, Rattle, StructureSpec, TemperatureUnit,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub structure: StructureConfig,
    #[serde(default)]
    pub relaxation: RelaxationConfig,
    #[serde(default)]
    pub md: MdConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// `small` (1M) or `large` (5M)
    #[serde(default = "default_variant")]
    pub variant: String,
    /// `cpu` or `cuda`
    #[serde(default = "default_device")]
    pub device: String,
    /// Directory checkpoints are looked up in (and downloaded to)
    #[serde(default)]
    pub model_dir: Option<String>,
    /// Base URL checkpoints are fetched from when missing in `model_dir`
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PbcSetting {
    Uniform(bool),
    PerAxis([bool; 3]),
}

impl PbcSetting {
    pub fn flags(&self) -> [bool; 3] {
        match *self {
            PbcSetting::Uniform(flag) => [flag; 3],
            PbcSetting::PerAxis(flags) => flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RattleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stdev")]
    pub stdev: f64,
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
}

/// Inputs of the Structure Factory. Any change here replaces the initial
/// structure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StructureConfig {
    /// `crystal` or `atoms`
    #[serde(default = "default_builder")]
    pub builder: String,
    /// Comma-separated species, e.g. `"Fe, Pt"`
    #[serde(default = "default_atoms")]
    pub atoms: String,
    /// Fractional (crystal) or Cartesian (atoms) positions
    #[serde(default = "default_basis")]
    pub basis: Vec<[f64; 3]>,
    /// `[a, b, c, alpha, beta, gamma]`; `[a, b, c]` is enough for atoms mode
    #[serde(default = "default_lattice")]
    pub lattice: Vec<f64>,
    #[serde(default = "default_spacegroup")]
    pub spacegroup: i32,
    #[serde(default = "default_pbc")]
    pub pbc: PbcSetting,
    #[serde(default)]
    pub rattle: RattleConfig,
    /// Optional initial velocities (Å/fs), one per atom of the built cell
    #[serde(default)]
    pub velocities: Option<Vec<[f64; 3]>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelaxationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
    #[serde(default = "default_relax_steps")]
    pub steps: usize,
    /// `ExpCellFilter`, `FrechetCellFilter` or `None`
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub constrain_symmetry: bool,
    #[serde(default = "default_fmax")]
    pub fmax: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default = "default_pressure_unit")]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MdConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ensemble")]
    pub ensemble: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_temperature_unit")]
    pub unit: String,
    #[serde(default = "default_timestep")]
    pub timestep: f64,
    /// Thermostat timescale in fs, 1000 x timestep when unset
    #[serde(default)]
    pub taut: Option<f64>,
    #[serde(default = "default_md_steps")]
    pub n_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewConfig {
    #[serde(default = "default_repeat")]
    pub repeat: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_script_url")]
    pub script_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_python")]
    pub python: String,
}

// Default value functions
fn default_variant() -> String {
    "small".to_string()
}
fn default_device() -> String {
    "cpu".to_string()
}
fn default_builder() -> String {
    "crystal".to_string()
}
fn default_atoms() -> String {
    "Fe, Pt".to_string()
}
fn default_basis() -> Vec<[f64; 3]> {
    vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]]
}
fn default_lattice() -> Vec<f64> {
    vec![3.85, 3.85, 3.72, 90.0, 90.0, 90.0]
}
fn default_spacegroup() -> i32 {
    123
}
fn default_pbc() -> PbcSetting {
    PbcSetting::Uniform(true)
}
fn default_stdev() -> f64 {
    0.01
}
fn default_seed() -> Option<u64> {
    Some(structure::factory::DEFAULT_RATTLE_SEED)
}
fn default_optimizer() -> String {
    "BFGS".to_string()
}
fn default_relax_steps() -> usize {
    500
}
fn default_filter() -> String {
    "FrechetCellFilter".to_string()
}
fn default_true() -> bool {
    true
}
fn default_fmax() -> f64 {
    0.01
}
fn default_pressure_unit() -> String {
    "GPa".to_string()
}
fn default_ensemble() -> String {
    "NVT_NOSE_HOOVER".to_string()
}
fn default_temperature() -> f64 {
    300.0
}
fn default_temperature_unit() -> String {
    "K".to_string()
}
fn default_timestep() -> f64 {
    1.0
}
fn default_md_steps() -> usize {
    1000
}
fn default_repeat() -> usize {
    3
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_output_dir() -> String {
    "views".to_string()
}
fn default_script_url() -> String {
    "https://3Dmol.org/build/3Dmol-min.js".to_string()
}
fn default_python() -> String {
    "python3".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            device: default_device(),
            model_dir: None,
            download_url: None,
        }
    }
}

impl Default for RattleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stdev: default_stdev(),
            seed: default_seed(),
        }
    }
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            builder: default_builder(),
            atoms: default_atoms(),
            basis: default_basis(),
            lattice: default_lattice(),
            spacegroup: default_spacegroup(),
            pbc: default_pbc(),
            rattle: RattleConfig::default(),
            velocities: None,
        }
    }
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            optimizer: default_optimizer(),
            steps: default_relax_steps(),
            filter: default_filter(),
            constrain_symmetry: true,
            fmax: default_fmax(),
            pressure: 0.0,
            unit: default_pressure_unit(),
        }
    }
}

impl Default for MdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ensemble: default_ensemble(),
            temperature: default_temperature(),
            unit: default_temperature_unit(),
            timestep: default_timestep(),
            taut: None,
            n_steps: default_md_steps(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            repeat: default_repeat(),
            width: default_width(),
            height: default_height(),
            output_dir: default_output_dir(),
            script_url: default_script_url(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
        }
    }
}

/// Read and parse a YAML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Apply command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(model) = &args.model {
            self.model.variant = model.clone();
        }
        if let Some(device) = &args.device {
            self.model.device = device.clone();
        }
        if let Some(temperature) = args.temperature {
            self.md.temperature = temperature;
        }
        if let Some(pressure) = args.pressure {
            self.relaxation.pressure = pressure;
        }
        if let Some(repeat) = args.repeat {
            self.view.repeat = repeat;
        }
        if let Some(dir) = &args.view_dir {
            self.view.output_dir = dir.clone();
        }
        if args.relax {
            self.relaxation.enabled = true;
        }
        if args.md {
            self.md.enabled = true;
        }
    }

    pub fn model_variant(&self) -> Result<ModelVariant, InputError> {
        self.model.variant.parse()
    }

    pub fn device(&self) -> Result<Device, InputError> {
        self.model.device.parse()
    }

    pub fn builder(&self) -> Result<BuilderMode, InputError> {
        match self.structure.builder.trim().to_lowercase().as_str() {
            "crystal" | "crystal builder" => Ok(BuilderMode::Crystal),
            "atoms" | "atoms builder" | "freeform" => Ok(BuilderMode::Freeform),
            _ => Err(InputError::UnknownToken {
                kind: "structure builder",
                token: self.structure.builder.clone(),
            }),
        }
    }

    /// Validated Structure Factory inputs.
    pub fn structure_spec(&self) -> Result<StructureSpec, InputError> {
        let species = validate_atom_list(&self.structure.atoms)?;
        if self.structure.basis.is_empty() {
            return Err(InputError::MissingInput("basis positions"));
        }
        let lattice = &self.structure.lattice;

        match self.builder()? {
            BuilderMode::Crystal => {
                let parameters = match lattice.as_slice() {
                    &[a, b, c, alpha, beta, gamma] => {
                        LatticeParameters::new(a, b, c, alpha, beta, gamma)
                    }
                    &[a, b, c] => LatticeParameters::orthogonal(a, b, c),
                    other => {
                        return Err(InputError::InvalidParameter {
                            name: "lattice",
                            reason: format!(
                                "crystal mode takes 3 lengths and 3 angles, got {} values",
                                other.len()
                            ),
                        })
                    }
                };
                Ok(StructureSpec::Crystal(CrystalSpec {
                    species,
                    basis: self.structure.basis.clone(),
                    parameters,
                    space_group: self.structure.spacegroup,
                }))
            }
            BuilderMode::Freeform => {
                let &[a, b, c] = lattice.as_slice() else {
                    return Err(InputError::InvalidParameter {
                        name: "lattice",
                        reason: format!("atoms mode takes 3 box lengths, got {}", lattice.len()),
                    });
                };
                Ok(StructureSpec::Freeform(FreeformSpec {
                    species,
                    positions: self.structure.basis.clone(),
                    lengths: [a, b, c],
                    pbc: self.structure.pbc.flags(),
                }))
            }
        }
    }

    pub fn rattle(&self) -> Result<Option<Rattle>, InputError> {
        let rattle = &self.structure.rattle;
        if !rattle.enabled {
            return Ok(None);
        }
        Rattle::new(rattle.stdev, rattle.seed).map(Some)
    }

    /// Relaxation parameters with the pressure normalized to eV/Å³, plus the
    /// advisory for a suspicious pressure unit.
    pub fn relaxation_request(
        &self,
    ) -> Result<(RelaxationRequest, Option<PressureAdvisory>), InputError> {
        let relax = &self.relaxation;
        let optimizer: OptimizerKind = relax.optimizer.parse()?;
        let filter = CellFilter::parse_optional(&relax.filter)?;
        let unit: PressureUnit = relax.unit.parse()?;
        let request = RelaxationRequest::new(
            optimizer,
            filter,
            relax.constrain_symmetry,
            relax.fmax,
            relax.steps,
            relax.pressure,
            unit,
        )?;
        Ok((request, pressure_advisory(relax.pressure, unit)))
    }

    /// MD parameters; the absolute-zero gate runs here.
    pub fn md_request(&self) -> Result<MdRequest, InputError> {
        let md = &self.md;
        let ensemble: Ensemble = md.ensemble.parse()?;
        let unit: TemperatureUnit = md.unit.parse()?;
        MdRequest::new(ensemble, md.temperature, unit, md.timestep, md.taut, md.n_steps)
    }

    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            repeat: self.view.repeat,
            width: self.view.width,
            height: self.view.height,
            script_url: self.view.script_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let file = write_config("{}\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model_variant().unwrap(), ModelVariant::Small);
        assert_eq!(config.device().unwrap(), Device::Cpu);
        assert_eq!(config.view.repeat, 3);
        assert_eq!(config.md.taut, None);
    }

    #[test]
    fn test_default_structure_is_fept() {
        let config = Config::default();
        match config.structure_spec().unwrap() {
            StructureSpec::Crystal(spec) => {
                assert_eq!(spec.species, vec!["Fe", "Pt"]);
                assert_eq!(spec.space_group, 123);
                assert_eq!(spec.parameters.c, 3.72);
            }
            other => panic!("expected crystal mode, got {other:?}"),
        }
        assert_eq!(config.rattle().unwrap(), None);
    }

    #[test]
    fn test_atoms_mode_with_per_axis_pbc() {
        let file = write_config(
            r#"
structure:
  builder: atoms
  atoms: "H, H"
  basis: [[0.0, 0.0, 0.0], [0.0, 0.0, 0.74]]
  lattice: [6.0, 6.0, 6.0]
  pbc: [true, true, false]
  rattle:
    enabled: true
    stdev: 0.02
"#,
        );
        let config = load_config(file.path()).unwrap();
        match config.structure_spec().unwrap() {
            StructureSpec::Freeform(spec) => {
                assert_eq!(spec.pbc, [true, true, false]);
                assert_eq!(spec.lengths, [6.0, 6.0, 6.0]);
            }
            other => panic!("expected atoms mode, got {other:?}"),
        }
        let rattle = config.rattle().unwrap().unwrap();
        assert_eq!(rattle.stdev(), 0.02);
        assert_eq!(rattle.seed(), 42);
    }

    #[test]
    fn test_atoms_mode_takes_exactly_three_lengths() {
        let mut config = Config::default();
        config.structure.builder = "atoms".to_string();
        assert_eq!(config.structure.lattice.len(), 6);
        assert!(matches!(
            config.structure_spec(),
            Err(InputError::InvalidParameter { name: "lattice", .. })
        ));

        config.structure.lattice = vec![4.0, 4.0];
        assert!(config.structure_spec().is_err());

        config.structure.lattice = vec![4.0, 5.0, 6.0];
        match config.structure_spec().unwrap() {
            StructureSpec::Freeform(spec) => assert_eq!(spec.lengths, [4.0, 5.0, 6.0]),
            other => panic!("expected atoms mode, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tokens_are_input_errors() {
        let mut config = Config::default();
        config.relaxation.optimizer = "LBFGS".to_string();
        assert!(matches!(
            config.relaxation_request(),
            Err(InputError::UnknownToken { kind: "optimizer", .. })
        ));

        let mut config = Config::default();
        config.md.unit = "F".to_string();
        assert!(matches!(
            config.md_request(),
            Err(InputError::UnknownToken { .. })
        ));

        let mut config = Config::default();
        config.structure.builder = "molecule".to_string();
        assert!(config.structure_spec().is_err());
    }

    #[test]
    fn test_relaxation_pressure_is_normalized() {
        let mut config = Config::default();
        config.relaxation.pressure = 160.21766208;
        let (request, advisory) = config.relaxation_request().unwrap();
        assert!((request.pressure() - 1.0).abs() < 1e-12);
        assert!(advisory.is_none());

        config.relaxation.unit = "eV/A^3".to_string();
        config.relaxation.pressure = 2.0;
        let (request, advisory) = config.relaxation_request().unwrap();
        assert_eq!(request.pressure(), 2.0);
        assert!(advisory.is_some());
    }

    #[test]
    fn test_md_gate_runs_at_the_boundary() {
        let mut config = Config::default();
        config.md.temperature = -300.0;
        config.md.unit = "deg".to_string();
        assert!(matches!(
            config.md_request(),
            Err(InputError::SubZeroTemperature { .. })
        ));
        config.md.temperature = -1.0;
        let request = config.md_request().unwrap();
        assert!((request.temperature_k() - 272.15).abs() < 1e-9);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        let args = Args {
            model: Some("5M".to_string()),
            temperature: Some(500.0),
            repeat: Some(2),
            relax: true,
            ..Args::default()
        };
        config.apply_overrides(&args);
        assert_eq!(config.model_variant().unwrap(), ModelVariant::Large);
        assert_eq!(config.md.temperature, 500.0);
        assert_eq!(config.view.repeat, 2);
        assert!(config.relaxation.enabled);
        assert!(!config.md.enabled);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_config("/nonexistent/studio.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
