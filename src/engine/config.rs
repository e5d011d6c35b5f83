use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Error, Result, SQLITE_VERSION_NUMBER};

/// Backend marked default after initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Only the memory-only fallback; file paths fail to open.
    #[default]
    Memory,
    /// The local filesystem.
    Local,
}

/// Cranelift optimization level for compiling the engine module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimizations; fastest compile.
    None,
    /// Optimize for speed.
    #[default]
    Speed,
    /// Optimize for speed and size.
    SpeedAndSize,
}

impl From<OptLevel> for wasmtime::OptLevel {
    fn from(level: OptLevel) -> Self {
        match level {
            OptLevel::None => wasmtime::OptLevel::None,
            OptLevel::Speed => wasmtime::OptLevel::Speed,
            OptLevel::SpeedAndSize => wasmtime::OptLevel::SpeedAndSize,
        }
    }
}

/// Engine instance settings, loadable from TOML.
///
/// ```toml
/// default_backend = "local"
/// cranelift_opt_level = "speed"
/// max_memory_pages = 4096
/// random_seed = 7
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Library version the module must report.
    pub expected_version: i32,
    /// Backend made default after initialization.
    pub default_backend: BackendKind,
    /// Compiler optimization level.
    pub cranelift_opt_level: OptLevel,
    /// Upper bound on linear memory, in 64 KiB pages.
    pub max_memory_pages: Option<u32>,
    /// Seed for the fallback backend's randomness.
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expected_version: SQLITE_VERSION_NUMBER,
            default_backend: BackendKind::Memory,
            cranelift_opt_level: OptLevel::Speed,
            max_memory_pages: None,
            random_seed: None,
        }
    }
}

impl EngineConfig {
    /// Local filesystem as the default backend.
    pub fn local() -> Self {
        Self {
            default_backend: BackendKind::Local,
            ..Self::default()
        }
    }

    /// Reproducible randomness, for tests.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            random_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("reading {}: {err}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.max_memory_pages == Some(0) {
            return Err(Error::Config("max_memory_pages must be positive".into()));
        }
        if self.max_memory_pages.is_some_and(|pages| pages > 65_536) {
            return Err(Error::Config(
                "max_memory_pages exceeds the 4 GiB address space".into(),
            ));
        }
        Ok(())
    }

    /// wasmtime settings derived from this config.
    pub fn wasmtime_config(&self) -> wasmtime::Config {
        let mut config = wasmtime::Config::new();
        config.cranelift_opt_level(self.cranelift_opt_level.into());
        config
    }
}
