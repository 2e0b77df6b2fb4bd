//! Solver configuration.
//!
//! ```toml
//! index_files = ["index-4208.fits", "/data/astrometry/index-4210.fits"]
//! equinox = 2000.0
//! ra_dec_sys = "FK5"
//! data_dir = "/data/astrometry"
//! min_sources = 20
//! verbosity = 1
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable consulted for relative index paths when no `data_dir` is configured.
pub const DATA_DIR_ENV: &str = "ASTROMETRY_NET_DATA_DIR";

pub const DEFAULT_MIN_SOURCES: usize = 20;

pub const MAX_VERBOSITY: u8 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstrometryConfig {
    /// Index files in load order; earlier files win on duplicate identity.
    pub index_files: Vec<PathBuf>,

    #[serde(default = "default_equinox")]
    pub equinox: f64,

    #[serde(default = "default_ra_dec_sys")]
    pub ra_dec_sys: String,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_min_sources")]
    pub min_sources: usize,

    #[serde(default)]
    pub verbosity: u8,
}

fn default_equinox() -> f64 {
    2000.0
}

fn default_ra_dec_sys() -> String {
    "FK5".to_string()
}

fn default_min_sources() -> usize {
    DEFAULT_MIN_SOURCES
}

impl Default for AstrometryConfig {
    fn default() -> Self {
        Self {
            index_files: Vec::new(),
            equinox: default_equinox(),
            ra_dec_sys: default_ra_dec_sys(),
            data_dir: None,
            min_sources: DEFAULT_MIN_SOURCES,
            verbosity: 0,
        }
    }
}

impl AstrometryConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AstrometryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.equinox.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "equinox must be finite, got {}",
                self.equinox
            )));
        }
        if self.ra_dec_sys.trim().is_empty() {
            return Err(ConfigError::Invalid("ra_dec_sys must not be empty".into()));
        }
        if self.verbosity > MAX_VERBOSITY {
            return Err(ConfigError::Invalid(format!(
                "verbosity must be between 0 and {MAX_VERBOSITY}, got {}",
                self.verbosity
            )));
        }
        Ok(())
    }

    /// Index paths in configured order, resolved with [`resolve_index_path`].
    pub fn resolved_index_files(&self) -> Vec<PathBuf> {
        let env_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        let base = self.data_dir.as_deref().or(env_dir.as_deref());
        self.index_files
            .iter()
            .map(|file| resolve_index_path(file, base))
            .collect()
    }
}

/// Absolute paths are kept; relative paths are joined to `base` when that file exists.
pub fn resolve_index_path(file: &Path, base: Option<&Path>) -> PathBuf {
    if file.is_absolute() {
        return file.to_path_buf();
    }
    match base {
        Some(dir) if dir.join(file).exists() => dir.join(file),
        _ => file.to_path_buf(),
    }
}
