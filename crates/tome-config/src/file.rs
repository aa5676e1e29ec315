//! The on-disk `tome.toml` document, before paths are resolved.

use std::path::Path;

use serde::Deserialize;

use crate::DEFAULT_CACHE_CAPACITY;
use crate::error::ConfigError;
use crate::expand::expand_env;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ConfigFile {
    pub(crate) cache: CacheSection,
    pub(crate) build: BuildSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CacheSection {
    pub(crate) capacity: i64,
    pub(crate) enabled: bool,
    pub(crate) dir: Option<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct BuildSection {
    pub(crate) required_keys: Option<Vec<String>>,
}

impl ConfigFile {
    /// Read and parse `path`, expanding `${VAR}` in the cache directory.
    pub(crate) fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        file.expand()?;
        Ok(file)
    }

    fn expand(&mut self) -> Result<(), ConfigError> {
        if let Some(raw) = self.cache.dir.as_deref() {
            self.cache.dir = Some(expand_env(raw, "cache.dir")?);
        }
        Ok(())
    }
}
