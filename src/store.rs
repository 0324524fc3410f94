// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration store.
//!
//! pkgdeploy keeps everything it remembers in one TOML file called the
//! __config store__. The default location is
//! `$XDG_CONFIG_HOME/pkgdeploy/config.toml`.
//!
//! Loading never fails. A missing file simply means that nothing has been
//! registered yet, and an unreadable or malformed file is reported and then
//! treated as an empty configuration. Saving always overwrites the whole file
//! by writing a sibling temporary file first and renaming it over the target,
//! so an interrupted save leaves the previous contents intact.

use crate::config::DeployConfig;

use std::{
    fs::{read_to_string, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Load and save [`DeployConfig`] at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Construct new config store at target path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to configuration file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Load configuration.
    ///
    /// Returns an empty configuration if the file is absent, cannot be read,
    /// or cannot be parsed.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> DeployConfig {
        let data = match read_to_string(&self.path) {
            Ok(data) => data,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no config at {:?}, starting fresh", self.path.display());
                return DeployConfig::default();
            }
            Err(error) => {
                warn!(
                    "cannot read config at {:?}, starting fresh: {error}",
                    self.path.display()
                );
                return DeployConfig::default();
            }
        };

        match data.parse::<DeployConfig>() {
            Ok(config) => config,
            Err(error) => {
                warn!(
                    "malformed config at {:?}, starting fresh: {error}",
                    self.path.display()
                );
                DeployConfig::default()
            }
        }
    }

    /// Save configuration, replacing the whole file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Serialize`] if configuration cannot be
    ///   serialized.
    /// - Return [`StoreError::CreateDir`] if parent directory cannot be
    ///   created.
    /// - Return [`StoreError::Write`] if configuration cannot be written.
    #[instrument(skip(self, config), level = "debug")]
    pub fn save(&self, config: &DeployConfig) -> Result<()> {
        let contents = toml::to_string_pretty(config)?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(|source| StoreError::CreateDir {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        let mut staged = self.path.clone().into_os_string();
        staged.push(".tmp");
        let staged = PathBuf::from(staged);

        write(&staged, contents.as_bytes()).map_err(|source| StoreError::Write {
            source,
            path: staged.clone(),
        })?;
        rename(&staged, &self.path).map_err(|source| StoreError::Write {
            source,
            path: self.path.clone(),
        })?;
        debug!("saved config to {:?}", self.path.display());

        Ok(())
    }
}

/// All possible error types for config store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Configuration cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Parent directory of configuration file cannot be created.
    #[error("failed to create config directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written to.
    #[error("failed to write config to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
