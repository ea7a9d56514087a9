//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration comes from a small TOML file. Everything in it is optional:
//! a missing or unreadable file is logged and replaced by built-in defaults,
//! never a startup failure.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `DLAB_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root (data) folder
pub const ROOT_FOLDER_ENV: &str = "DLAB_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the identity mapping and catalog stores
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default source trees scanned when none are given on the command line
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Frame extraction settings
    #[serde(default)]
    pub frames: FramesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One source tree to scan
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Short stable tag persisted on every item found under `path`
    pub tag: String,
    pub path: PathBuf,
}

/// Frame extraction settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FramesConfig {
    /// Path to the ffmpeg executable used for video-encapsulated DICOM
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Attach per-frame display durations to animated PNG frames
    #[serde(default)]
    pub include_apng_delays: Option<bool>,

    /// Directory for temporary video streams (system temp dir if unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default configuration file location: `<config_dir>/dlab/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dlab").join("config.toml"))
}

/// Read and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Toml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load configuration, degrading to defaults on any problem
///
/// An explicitly requested file that is missing is worth a warning; a missing
/// default file is the normal zero-config case.
pub fn load_or_default(explicit: Option<&Path>) -> TomlConfig {
    let (path, is_explicit) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return TomlConfig::default(),
        },
    };

    if !path.exists() {
        if is_explicit {
            warn!("Config file not found: {} (using defaults)", path.display());
        } else {
            info!("No config file at {} (using defaults)", path.display());
        }
        return TomlConfig::default();
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} (using defaults)", e);
            TomlConfig::default()
        }
    }
}

/// Resolves the root folder from CLI, environment, TOML, then OS default
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: toml_config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// Creates the root folder on first use
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder (and parents) if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if self.root_folder.is_dir() {
            return Ok(());
        }
        if self.root_folder.exists() {
            return Err(Error::Config(format!(
                "Root folder is not a directory: {}",
                self.root_folder.display()
            )));
        }
        std::fs::create_dir_all(&self.root_folder)?;
        info!("Created root folder: {}", self.root_folder.display());
        Ok(())
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("dlab"))
        .unwrap_or_else(|| PathBuf::from("./dlab_data"))
}
