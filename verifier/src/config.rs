//! Verifier configuration loading.
//!
//! Settings are read from TOML. The file named on the command line wins;
//! otherwise `config.toml` in the platform configuration directory is used
//! when present, and built-in defaults apply when it is not. The npm registry
//! environment variable then overrides the file, and an explicit
//! `--registry` overrides both.

use crate::registry::DEFAULT_REGISTRY_URL;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use semver::Version;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variables consulted for a registry override, in order.
pub const REGISTRY_ENV_VARS: [&str; 2] = ["NPM_CONFIG_REGISTRY", "npm_config_registry"];

/// File name looked up in the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// Path of the file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid.
    #[error("invalid configuration {path}: {reason}")]
    Parse {
        /// Path of the file.
        path: Utf8PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The configuration directory is not valid UTF-8.
    #[error("configuration directory is not valid UTF-8: {}", .path.display())]
    NonUtf8Dir {
        /// The offending directory.
        path: PathBuf,
    },
}

/// Locates the per-user configuration directory.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigDirs {
    /// Return the directory holding `config.toml`, if the platform has one.
    fn config_dir(&self) -> Option<PathBuf>;
}

/// Platform configuration directories resolved with `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConfigDirs;

impl ConfigDirs for SystemConfigDirs {
    fn config_dir(&self) -> Option<PathBuf> {
        directories_next::ProjectDirs::from("", "", "provenance-verifier")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }
}

/// Tunable settings for a verification run.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Registry root URL.
    pub registry_url: String,
    /// Version-control program.
    pub git_program: String,
    /// Package tool used to pack and install.
    pub package_tool: String,
    /// Installer binary used below [`Self::clean_install_threshold`].
    pub legacy_installer: String,
    /// Lowest package tool version that provides a clean install command.
    pub clean_install_threshold: Version,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_owned(),
            git_program: "git".to_owned(),
            package_tool: "npm".to_owned(),
            legacy_installer: "cipm".to_owned(),
            clean_install_threshold: Version::new(5, 7, 0),
        }
    }
}

impl VerifierConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, unknown keys, or
    /// invalid versions. `origin` is used only in the message.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use provenance_verifier::config::VerifierConfig;
    ///
    /// let config = VerifierConfig::from_toml_str(
    ///     "package_tool = \"pnpm\"\n",
    ///     Utf8Path::new("inline"),
    /// )?;
    /// assert_eq!(config.package_tool, "pnpm");
    /// assert_eq!(config.git_program, "git");
    /// # Ok::<(), provenance_verifier::config::ConfigError>(())
    /// ```
    pub fn from_toml_str(source: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            path: origin.to_owned(),
            reason: e.to_string().trim().to_owned(),
        })
    }

    /// Load configuration from `explicit`, or the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a file exists but cannot be read or
    /// parsed, or when `explicit` does not exist.
    pub fn load(explicit: Option<&Utf8Path>, dirs: &dyn ConfigDirs) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::read(path);
        }
        let Some(dir) = dirs.config_dir() else {
            debug!("no configuration directory; using defaults");
            return Ok(Self::default());
        };
        let dir = Utf8PathBuf::from_path_buf(dir).map_err(|path| ConfigError::NonUtf8Dir { path })?;
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::read(&path)
        } else {
            debug!("{path} not found; using defaults");
            Ok(Self::default())
        }
    }

    fn read(path: &Utf8Path) -> Result<Self, ConfigError> {
        debug!("loading configuration from {path}");
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source, path)
    }

    /// Apply the registry override from the process environment.
    #[must_use]
    pub fn with_environment(self) -> Self {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Apply the registry override using `lookup` to read variables.
    ///
    /// Blank values are ignored.
    #[must_use]
    pub fn with_env_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let registry = REGISTRY_ENV_VARS
            .iter()
            .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()));
        self.with_registry(registry)
    }

    /// Replace the registry URL when `registry` is given.
    #[must_use]
    pub fn with_registry(mut self, registry: Option<String>) -> Self {
        if let Some(url) = registry {
            self.registry_url = url.trim().to_owned();
        }
        self
    }
}
