// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/pkgdeploy/config.toml` as
/// the default absolute path for the configuration file. Does not check if the
/// path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("pkgdeploy").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to workspace directory.
///
/// The workspace houses one working copy per repository. Prefers
/// `<documents>/Publish`, and falls back to `$XDG_DATA_HOME/pkgdeploy/workspace`
/// on systems without a documents directory. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_workspace_dir() -> Result<PathBuf> {
    dirs::document_dir()
        .map(|path| path.join("Publish"))
        .or_else(|| dirs::data_dir().map(|path| path.join("pkgdeploy").join("workspace")))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
