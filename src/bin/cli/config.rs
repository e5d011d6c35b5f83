use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use wasqlite::{BackendKind, EngineConfig};

/// Engine settings for one CLI run.
///
/// Without a config file the CLI works on the local filesystem, since
/// every command takes a database path.
#[derive(Debug)]
pub struct CliConfig {
    path: Option<PathBuf>,
    engine: EngineConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Missing { path });
            }
            let engine = read_file(&path)?;
            return Ok(Self {
                path: Some(path),
                engine,
            });
        }
        match default_config_path().filter(|path| path.exists()) {
            Some(path) => {
                let engine = read_file(&path)?;
                Ok(Self {
                    path: Some(path),
                    engine,
                })
            }
            None => Ok(Self {
                path: None,
                engine: EngineConfig::local(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn set_backend(&mut self, backend: BackendKind) {
        self.engine.default_backend = backend;
    }
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: wasqlite::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("wasqlite").join("config.toml"))
}
