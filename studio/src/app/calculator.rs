use crate::io::CheckpointStore;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use structure::{CalculatorHandle, CalculatorInfo, CollaboratorError, InputError, StructureState};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    Small,
    Large,
}

impl ModelVariant {
    /// Size tag used in checkpoint names.
    pub fn size_tag(&self) -> &'static str {
        match self {
            ModelVariant::Small => "1M",
            ModelVariant::Large => "5M",
        }
    }

    pub fn checkpoint_name(&self) -> String {
        format!("MatterSim-v1.0.0-{}.pth", self.size_tag())
    }
}

impl FromStr for ModelVariant {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" | "1m" => Ok(ModelVariant::Small),
            "large" | "5m" => Ok(ModelVariant::Large),
            _ => Err(InputError::UnknownToken {
                kind: "model variant",
                token: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.size_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Accelerator,
}

impl Device {
    /// Identifier understood by the evaluator.
    pub fn token(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Accelerator => "cuda",
        }
    }
}

impl FromStr for Device {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" | "accelerator" => Ok(Device::Accelerator),
            _ => Err(InputError::UnknownToken {
                kind: "device",
                token: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Non-fatal notes about the device choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAdvisory {
    /// Accelerator requested but not present; running on CPU.
    AcceleratorUnavailable,
    /// Accelerator present but CPU requested.
    AcceleratorIdle,
}

impl fmt::Display for DeviceAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAdvisory::AcceleratorUnavailable => {
                f.write_str("no accelerator available, falling back to CPU")
            }
            DeviceAdvisory::AcceleratorIdle => {
                f.write_str("an accelerator is available but CPU was selected")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResolution {
    pub device: Device,
    pub advisory: Option<DeviceAdvisory>,
}

impl DeviceResolution {
    /// Explicit weight mapping handed to the loader. `None` lets the
    /// evaluator keep weights on the accelerator.
    pub fn map_location(&self) -> Option<&'static str> {
        match self.device {
            Device::Accelerator => None,
            Device::Cpu => Some("cpu"),
        }
    }
}

/// Pure derivation of the effective device.
pub fn resolve_device(requested: Device, accelerator_available: bool) -> DeviceResolution {
    match (requested, accelerator_available) {
        (Device::Accelerator, true) => DeviceResolution {
            device: Device::Accelerator,
            advisory: None,
        },
        (Device::Accelerator, false) => DeviceResolution {
            device: Device::Cpu,
            advisory: Some(DeviceAdvisory::AcceleratorUnavailable),
        },
        (Device::Cpu, true) => DeviceResolution {
            device: Device::Cpu,
            advisory: Some(DeviceAdvisory::AcceleratorIdle),
        },
        (Device::Cpu, false) => DeviceResolution {
            device: Device::Cpu,
            advisory: None,
        },
    }
}

#[derive(Debug, Error)]
pub enum CalculatorAttachError {
    #[error("checkpoint {checkpoint} not found in {dir} and no download URL is configured")]
    MissingCheckpoint { checkpoint: String, dir: String },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("failed to store checkpoint at {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load model {checkpoint} on {device}: {source}")]
    Load {
        checkpoint: String,
        device: String,
        #[source]
        source: CollaboratorError,
    },
}

/// Loads potential evaluators. Implemented by the Python worker and by test
/// fakes.
pub trait CalculatorLoader {
    fn accelerator_available(&self) -> bool;

    fn load(&self, info: &CalculatorInfo) -> Result<CalculatorHandle, CollaboratorError>;
}

/// Caches loaded evaluators per (variant, device) so repeated attachment
/// hands out the same evaluator.
pub struct CalculatorRegistry {
    loader: Box<dyn CalculatorLoader>,
    store: CheckpointStore,
    accelerator: Option<bool>,
    cache: HashMap<(ModelVariant, Device), CalculatorHandle>,
}

impl CalculatorRegistry {
    pub fn new(loader: Box<dyn CalculatorLoader>, store: CheckpointStore) -> Self {
        Self {
            loader,
            store,
            accelerator: None,
            cache: HashMap::new(),
        }
    }

    pub fn set_store(&mut self, store: CheckpointStore) {
        if store != self.store {
            self.store = store;
            self.cache.clear();
        }
    }

    pub fn accelerator_available(&mut self) -> bool {
        if let Some(available) = self.accelerator {
            return available;
        }
        let available = self.loader.accelerator_available();
        info!("Accelerator available: {}", available);
        self.accelerator = Some(available);
        available
    }

    pub fn resolve(&mut self, requested: Device) -> DeviceResolution {
        resolve_device(requested, self.accelerator_available())
    }

    pub fn get_or_load(
        &mut self,
        variant: ModelVariant,
        resolution: &DeviceResolution,
    ) -> Result<CalculatorHandle, CalculatorAttachError> {
        let key = (variant, resolution.device);
        if let Some(handle) = self.cache.get(&key) {
            return Ok(handle.clone());
        }

        let checkpoint = self.store.resolve(variant)?;
        let calculator_info = CalculatorInfo {
            model: variant.to_string(),
            checkpoint: checkpoint.clone(),
            device: resolution.device.token().to_string(),
            map_location: resolution.map_location().map(str::to_string),
        };
        info!(
            "Loading model {} ({}) on {}",
            variant, checkpoint, resolution.device
        );
        let handle = self
            .loader
            .load(&calculator_info)
            .map_err(|source| CalculatorAttachError::Load {
                checkpoint,
                device: resolution.device.to_string(),
                source,
            })?;
        self.cache.insert(key, handle.clone());
        Ok(handle)
    }
}

/// Bind an evaluator for `variant` on the resolved device to `structure`.
/// Returns the device advisory, if any; it never fails the attachment.
pub fn attach_calculator(
    structure: &mut StructureState,
    variant: ModelVariant,
    requested: Device,
    registry: &mut CalculatorRegistry,
) -> Result<Option<DeviceAdvisory>, CalculatorAttachError> {
    let resolution = registry.resolve(requested);
    if let Some(advisory) = resolution.advisory {
        warn!("{}", advisory);
    }
    let handle = registry.get_or_load(variant, &resolution)?;
    structure.attach_calculator(handle);
    Ok(resolution.advisory)
}
