//! Configuration for tome.
//!
//! Settings come from a `tome.toml`, either given explicitly or found by
//! walking up from the working directory. A relative cache directory is
//! anchored at the directory holding the file.
//!
//! ```toml
//! [cache]
//! capacity = 3072          # resident models, <= 0 disables the bound
//! enabled = true           # persist evicted models to disk
//! dir = ".tome/cache"
//!
//! [build]
//! required_keys = ["uid"]
//! ```
//!
//! `cache.dir` may reference the environment as `${VAR}` (must be set) or
//! `${VAR:-fallback}`.

mod error;
mod expand;
mod file;

use std::path::{Path, PathBuf};

pub use error::ConfigError;

use file::ConfigFile;

/// Name of the file [`Config::load`] looks for.
pub const CONFIG_FILENAME: &str = "tome.toml";

/// Resident model bound used when the file does not set one.
pub const DEFAULT_CACHE_CAPACITY: i64 = 0xC00;

const DEFAULT_CACHE_DIR: &str = ".tome/cache";
const UID_KEY: &str = "uid";

/// Fully resolved settings for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cache_resolved: CacheConfig,
    pub build_resolved: BuildConfig,
    /// File the settings came from, `None` when running on defaults.
    pub config_path: Option<PathBuf>,
}

/// Model cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum resident models, `<= 0` for unbounded.
    pub capacity: i64,
    /// Whether evicted models are persisted to `dir`.
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Build settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Header keys every overwrite section must declare. Always has `uid`.
    pub required_keys: Vec<String>,
}

impl Config {
    /// Load settings from `explicit`, or from the nearest `tome.toml` above
    /// the working directory, or fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when `explicit` does not exist, and
    /// any read, parse, expansion or validation error of the chosen file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir().ok().and_then(|cwd| Self::discover(&cwd)),
        };

        match path {
            Some(path) => Self::from_file(&path),
            None => {
                let cwd = std::env::current_dir().unwrap_or_default();
                tracing::debug!(cwd = %cwd.display(), "No {CONFIG_FILENAME}, using defaults");
                Ok(Self::default_with_base(&cwd))
            }
        }
    }

    /// Nearest `tome.toml` in `start` or one of its ancestors.
    #[must_use]
    pub fn discover(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILENAME))
            .find(|candidate| candidate.is_file())
    }

    /// Read one config file and resolve it against its directory.
    ///
    /// # Errors
    ///
    /// Returns the read, parse, expansion or validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = ConfigFile::read(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        let config = Self {
            config_path: Some(path.to_path_buf()),
            ..Self::resolve(file, base)
        };
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Defaults, with the cache directory anchored at `base`.
    #[must_use]
    pub fn default_with_base(base: &Path) -> Self {
        Self::resolve(ConfigFile::default(), base)
    }

    /// Check values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first blank entry of
    /// `build.required_keys`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let blank = self
            .build_resolved
            .required_keys
            .iter()
            .position(|key| key.trim().is_empty());
        match blank {
            Some(index) => Err(ConfigError::Validation(format!(
                "build.required_keys[{index}] is blank"
            ))),
            None => Ok(()),
        }
    }

    fn resolve(file: ConfigFile, base: &Path) -> Self {
        let ConfigFile { cache, build } = file;

        let mut required_keys = build.required_keys.unwrap_or_default();
        if !required_keys.iter().any(|key| key.eq_ignore_ascii_case(UID_KEY)) {
            required_keys.insert(0, UID_KEY.to_owned());
        }

        Self {
            cache_resolved: CacheConfig {
                capacity: cache.capacity,
                enabled: cache.enabled,
                dir: base.join(cache.dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR)),
            },
            build_resolved: BuildConfig { required_keys },
            config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}
