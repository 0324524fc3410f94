// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process invocation.
//!
//! Version control and build steps are opaque external commands. They are
//! either run interactively, sharing the terminal with pkgdeploy so their
//! output streams as it happens, or non-interactively, capturing their output
//! for logging. Both block until the command reaches a terminal exit status.

use std::{
    ffi::OsStr,
    process::{Command, ExitStatus},
};
use tracing::debug;

/// Run command that shares stdin, stdout, and stderr with current process.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be started.
/// - Return [`SyscallError::Failed`] if command exits unsuccessfully.
pub fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    let command = render(cmd.as_ref(), &args);
    debug!("run {command}");

    let status = Command::new(cmd.as_ref())
        .args(&args)
        .spawn()
        .and_then(|mut child| child.wait())
        .map_err(|source| SyscallError::Spawn {
            source,
            command: command.clone(),
        })?;

    if !status.success() {
        return Err(SyscallError::Failed {
            command,
            status,
            message: String::new(),
        });
    }

    Ok(())
}

/// Run command while capturing its output.
///
/// Returns stdout and stderr joined together without trailing newline.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if command cannot be started.
/// - Return [`SyscallError::Failed`] if command exits unsuccessfully. The
///   captured output is kept in the error.
pub fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<_>>();
    let command = render(cmd.as_ref(), &args);
    debug!("run {command}");

    let output = Command::new(cmd.as_ref())
        .args(&args)
        .output()
        .map_err(|source| SyscallError::Spawn {
            source,
            command: command.clone(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_string();

    if !output.status.success() {
        return Err(SyscallError::Failed {
            command,
            status: output.status,
            message,
        });
    }

    Ok(message)
}

fn render(cmd: &OsStr, args: &[std::ffi::OsString]) -> String {
    let mut command = cmd.to_string_lossy().into_owned();
    for arg in args {
        command.push(' ');
        command.push_str(arg.to_string_lossy().as_ref());
    }
    command
}

/// External process error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Command could not be started at all.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command ran but exited unsuccessfully.
    #[error("command {command:?} failed with {status}\n{message}")]
    Failed {
        command: String,
        status: ExitStatus,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
