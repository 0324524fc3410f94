// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build and copy steps.
//!
//! Building a project is left to an external build tool. pkgdeploy only
//! knows how to ask the tool to build a project directory, and to publish its
//! output into a staging directory. The staged output is then copied into the
//! resolved publish folder with [`copy_tree`].

use crate::syscall::{syscall_interactive, SyscallError};

use ignore::WalkBuilder;
use std::{
    ffi::OsString,
    fs::copy,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Run builds of project directories.
pub trait BuildRunner {
    /// Build project directory in target configuration.
    fn build(&self, project_dir: &Path, configuration: &str) -> Result<()>;

    /// Publish build output of project directory into `output_dir`.
    fn publish(&self, project_dir: &Path, configuration: &str, output_dir: &Path) -> Result<()>;
}

/// Build runner that shells out to a build tool.
///
/// The tool is expected to understand `build <dir> --configuration <cfg>` and
/// `publish <dir> --configuration <cfg> --output <dir>`, like the `dotnet`
/// command line does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRunner {
    program: String,
}

impl CommandRunner {
    /// Construct new runner around build tool program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl BuildRunner for CommandRunner {
    #[instrument(skip(self), level = "debug")]
    fn build(&self, project_dir: &Path, configuration: &str) -> Result<()> {
        info!("build {:?} ({configuration})", project_dir.display());
        let args: Vec<OsString> = vec![
            "build".into(),
            project_dir.into(),
            "--configuration".into(),
            configuration.into(),
        ];
        syscall_interactive(&self.program, args)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn publish(&self, project_dir: &Path, configuration: &str, output_dir: &Path) -> Result<()> {
        info!("publish {:?} ({configuration})", project_dir.display());
        let args: Vec<OsString> = vec![
            "publish".into(),
            project_dir.into(),
            "--configuration".into(),
            configuration.into(),
            "--output".into(),
            output_dir.into(),
        ];
        syscall_interactive(&self.program, args)?;
        Ok(())
    }
}

/// Copy every file below `source` into `dest`.
///
/// Directory structure is mirrored, and existing files at `dest` are
/// overwritten. Files at `dest` that have no counterpart in `source` are left
/// alone. Hidden and ignored files are copied too. Symbolic links are
/// followed, so their targets are copied as regular files and directories.
/// Returns the number of files copied.
///
/// # Errors
///
/// - Return [`BuildError::MissingOutput`] if `source` is not a directory.
/// - Return [`BuildError::Walk`] if `source` cannot be walked.
/// - Return [`BuildError::CreateDir`] or [`BuildError::Copy`] if `dest`
///   cannot be written.
#[instrument(skip(source, dest), level = "debug")]
pub fn copy_tree(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<usize> {
    let source = source.as_ref();
    let dest = dest.as_ref();
    if !source.is_dir() {
        return Err(BuildError::MissingOutput(source.to_path_buf()));
    }

    create_dir(dest)?;
    let mut copied = 0;
    let walker = WalkBuilder::new(source)
        .standard_filters(false)
        .follow_links(true)
        .build();
    for entry in walker {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(relative);
        match entry.file_type() {
            Some(kind) if kind.is_dir() => create_dir(&target)?,
            Some(kind) if kind.is_file() => {
                if let Some(parent) = target.parent() {
                    create_dir(parent)?;
                }
                copy(entry.path(), &target).map_err(|source| BuildError::Copy {
                    source,
                    from: entry.path().to_path_buf(),
                    to: target.clone(),
                })?;
                copied += 1;
            }
            _ => warn!("skip {:?}, not a regular file or directory", entry.path().display()),
        }
    }

    info!("copied {copied} files into {:?}", dest.display());
    Ok(copied)
}

fn create_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|source| BuildError::CreateDir {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(())
}

/// Build and copy error types.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Build tool fails.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Build tool left no output to copy.
    #[error("no build output at {:?}", .0.display())]
    MissingOutput(PathBuf),

    /// Build output cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Destination directory cannot be created.
    #[error("failed to create directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
