//! Model checkpoint lookup

use crate::app::{CalculatorAttachError, ModelVariant};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Where checkpoints live. Without a directory the bare checkpoint name is
/// handed to the evaluator, which resolves it on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointStore {
    model_dir: Option<PathBuf>,
    download_url: Option<String>,
}

impl CheckpointStore {
    pub fn new(model_dir: Option<PathBuf>, download_url: Option<String>) -> Self {
        Self {
            model_dir,
            download_url,
        }
    }

    /// Checkpoint path (or name) for `variant`, downloading it into the model
    /// directory first when it is missing there.
    pub fn resolve(&self, variant: ModelVariant) -> Result<String, CalculatorAttachError> {
        let name = variant.checkpoint_name();
        let Some(dir) = &self.model_dir else {
            return Ok(name);
        };

        let path = dir.join(&name);
        if path.exists() {
            info!("Using local checkpoint {}", path.display());
            return Ok(path.display().to_string());
        }

        let Some(base) = &self.download_url else {
            return Err(CalculatorAttachError::MissingCheckpoint {
                checkpoint: name,
                dir: dir.display().to_string(),
            });
        };

        let url = format!("{}/{}", base.trim_end_matches('/'), name);
        info!("Checkpoint not found locally, fetching {}", url);
        let download_error = |reason: String| CalculatorAttachError::Download {
            url: url.clone(),
            reason,
        };
        let response = reqwest::blocking::get(&url)
            .and_then(|response| response.error_for_status())
            .map_err(|e| download_error(e.to_string()))?;
        let bytes = response
            .bytes()
            .map_err(|e| download_error(e.to_string()))?;
        info!("Downloaded {} bytes", bytes.len());

        let store_error = |source| CalculatorAttachError::Store {
            path: path.display().to_string(),
            source,
        };
        fs::create_dir_all(dir).map_err(store_error)?;
        fs::write(&path, &bytes).map_err(store_error)?;
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bare_name_without_model_dir() {
        let store = CheckpointStore::default();
        assert_eq!(
            store.resolve(ModelVariant::Small).unwrap(),
            "MatterSim-v1.0.0-1M.pth"
        );
    }

    #[test]
    fn test_local_checkpoint_is_used() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MatterSim-v1.0.0-5M.pth");
        fs::write(&path, b"weights").unwrap();
        let store = CheckpointStore::new(Some(dir.path().to_path_buf()), None);
        assert_eq!(
            store.resolve(ModelVariant::Large).unwrap(),
            path.display().to_string()
        );
    }

    #[test]
    fn test_missing_checkpoint_without_url() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(Some(dir.path().to_path_buf()), None);
        assert!(matches!(
            store.resolve(ModelVariant::Small),
            Err(CalculatorAttachError::MissingCheckpoint { .. })
        ));
    }
}
