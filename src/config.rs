use crate::error::StartupError;
use crate::types::Config;
use anyhow::Result;
use std::fs;

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads the file when present, otherwise falls back to built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self, StartupError> {
        if !std::path::Path::new(path).exists() {
            return Ok(Config::default());
        }
        Self::load_required(path)
    }

    /// A path the operator named must exist and parse. Only the implicit
    /// default file is allowed to be missing.
    pub fn load_for_startup(explicit: Option<&str>) -> Result<Self, StartupError> {
        match explicit {
            Some(path) => Self::load_required(path),
            None => Self::load_or_default(DEFAULT_CONFIG_PATH),
        }
    }

    fn load_required(path: &str) -> Result<Self, StartupError> {
        Self::load(path).map_err(|e| StartupError::Config {
            path: path.to_string(),
            reason: format!("{e:#}"),
        })
    }

    /// Sanity checks that don't need any collaborator to be opened.
    pub fn validate(&self, path: &str) -> Result<(), StartupError> {
        let invalid = |reason: &str| StartupError::Config {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if self.source.working_width == 0 || self.source.working_height == 0 {
            return Err(invalid("source working size must be non-zero"));
        }
        if self.extraction.crop_width == 0 || self.extraction.crop_height == 0 {
            return Err(invalid("extraction crop size must be non-zero"));
        }
        if self.labels.violation == self.labels.identifier {
            return Err(invalid("violation and identifier labels must differ"));
        }
        if self.ocr.model_path.is_some() && self.ocr.keys_path.is_none() {
            return Err(invalid("ocr.model_path requires ocr.keys_path"));
        }
        Ok(())
    }

    /// Filter directive used when `RUST_LOG` isn't set.
    pub fn log_filter(&self) -> String {
        format!("helmet_monitor={},ort=warn", self.logging.level)
    }
}
