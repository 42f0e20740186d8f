//! Process-wide demuxer configuration.
//!
//! Values come from built-in defaults, then an optional TOML file
//! (`ESDEMUX_CONFIG`, else `./esdemux.toml`), then `ESDEMUX_PROBE_SIZE` and
//! `ESDEMUX_RESYNC_LIMIT` environment overrides. [`init`] installs a config
//! for the whole process and may be called once.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{DemuxError, Result};

lazy_static! {
    static ref CONFIG: RwLock<Option<Config>> = RwLock::new(None);
}

const DEFAULT_FILE: &str = "./esdemux.toml";

/// Process-wide demuxer settings.
///
/// Loaded by [`Config::load`] from `esdemux.toml` (or `ESDEMUX_CONFIG`),
/// with `ESDEMUX_*` environment overrides on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes the container may read while discovering the stream layout.
    pub probe_size: usize,
    /// TS packets' worth of bytes skipped while hunting for sync before the
    /// stream is declared corrupt.
    pub resync_limit: usize,
    /// TS packets requested from the input buffer per pull.
    pub read_chunk_size: usize,
    /// Name given to each worker thread.
    pub worker_thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_size: 1 << 20,
            resync_limit: 64,
            read_chunk_size: 16,
            worker_thread_name: String::from("esdemux"),
        }
    }
}

impl Config {
    /// Defaults, then the config file if one is found, then env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML config text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DemuxError::Config(e.to_string()))
    }

    /// Applies overrides looked up through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ESDEMUX_PROBE_SIZE") {
            self.probe_size = value.trim().parse()?;
        }
        if let Some(value) = lookup("ESDEMUX_RESYNC_LIMIT") {
            self.resync_limit = value.trim().parse()?;
        }
        Ok(())
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.probe_size == 0 {
            return Err(DemuxError::Config("probe_size must be positive".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(DemuxError::Config("read_chunk_size must be positive".into()));
        }
        if self.worker_thread_name.is_empty() {
            return Err(DemuxError::Config("worker_thread_name must not be empty".into()));
        }
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("ESDEMUX_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_FILE);
    default.exists().then_some(default)
}

/// Installs the process-wide configuration. A second call fails.
pub fn init(config: Config) -> Result<()> {
    config.validate()?;
    let mut slot = CONFIG
        .write()
        .map_err(|_| DemuxError::Config("configuration lock poisoned".into()))?;
    if slot.is_some() {
        return Err(DemuxError::Config("configuration already initialized".into()));
    }
    log::info!("configuration initialized: {:?}", config);
    *slot = Some(config);
    Ok(())
}

/// The installed configuration, or a freshly loaded one when [`init`] has
/// not been called. Falls back to defaults if loading fails.
pub fn current() -> Config {
    if let Ok(slot) = CONFIG.read() {
        if let Some(config) = slot.as_ref() {
            return config.clone();
        }
    }
    Config::load().unwrap_or_else(|e| {
        log::warn!("using default configuration: {}", e);
        Config::default()
    })
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# esdemux configuration
# Every key is optional; missing keys keep their default.

# Bytes read while discovering the stream layout (1 MiB)
probe_size = 1048576

# TS packets' worth of bytes skipped looking for sync before giving up
resync_limit = 64

# TS packets pulled from the input buffer per read
read_chunk_size = 16

worker_thread_name = "esdemux"
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}
