//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Nothing in this crate reads environment variables during request handling.

use crate::constants::{CAREPLAN_DIR_NAME, DEFAULT_DATA_DIR};
use crate::{CarePlanError, CarePlanResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which [`CarePlanStore`](crate::store::CarePlanStore) implementation backs the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Git-versioned YAML files under the data directory.
    #[default]
    File,
    /// Process-local storage, lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = CarePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(CarePlanError::InvalidInput(format!(
                "unknown store backend '{other}' (expected 'file' or 'memory')"
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Memory => "memory",
        })
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    store_backend: StoreBackend,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CarePlanError::InvalidInput`] if `data_dir` is empty.
    pub fn new(data_dir: PathBuf, store_backend: StoreBackend) -> CarePlanResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(CarePlanError::InvalidInput(
                "data directory cannot be empty".into(),
            ));
        }
        Ok(Self {
            data_dir,
            store_backend,
        })
    }

    /// Build a config from optional raw values (as read from the environment by a binary).
    ///
    /// Missing values fall back to [`DEFAULT_DATA_DIR`] and [`StoreBackend::File`].
    pub fn from_values(data_dir: Option<String>, store: Option<String>) -> CarePlanResult<Self> {
        let data_dir = data_dir
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let store_backend = match store {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => StoreBackend::default(),
        };
        Self::new(PathBuf::from(data_dir), store_backend)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn careplans_dir(&self) -> PathBuf {
        self.data_dir.join(CAREPLAN_DIR_NAME)
    }

    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_values_missing() {
        let cfg = CoreConfig::from_values(None, None).unwrap();
        assert_eq!(cfg.data_dir(), Path::new(DEFAULT_DATA_DIR));
        assert_eq!(cfg.store_backend(), StoreBackend::File);
        assert_eq!(
            cfg.careplans_dir(),
            Path::new(DEFAULT_DATA_DIR).join(CAREPLAN_DIR_NAME)
        );
    }

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(" file ".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn explicit_values_are_used() {
        let cfg =
            CoreConfig::from_values(Some("/tmp/cpr".into()), Some("memory".into())).unwrap();
        assert_eq!(cfg.data_dir(), Path::new("/tmp/cpr"));
        assert_eq!(cfg.store_backend(), StoreBackend::Memory);
    }
}
