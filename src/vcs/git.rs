// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Working copy management through libgit2 and the Git binary.
//!
//! Cloning goes through libgit2 so that transfer progress can be shown with a
//! progress bar, and so that the repository token can be handed over as
//! credentials. Every other mutating step, i.e., fetching, checking out, and
//! pulling, goes through the `git` binary, which brings along the user's own
//! credential helpers and configuration. Commit logs and the current branch
//! are read directly through libgit2.

use crate::{
    syscall::syscall_non_interactive,
    vcs::{RepoRef, Result, WorkingCopy},
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{build::RepoBuilder, Config, ErrorCode, FetchOptions, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{ffi::OsString, path::Path, time};
use tracing::{debug, info, instrument};

/// Working copy access through libgit2 and the Git binary.
#[derive(Debug, Clone)]
pub struct Git2WorkingCopy {
    clone_url: String,
    show_progress: bool,
}

impl Git2WorkingCopy {
    /// Construct new working copy manager that clones from `clone_url`.
    pub fn new(clone_url: impl Into<String>) -> Self {
        Self {
            clone_url: clone_url.into().trim_end_matches('/').to_string(),
            show_progress: true,
        }
    }

    /// Do not draw progress bars while cloning.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// URL that target repository gets cloned from.
    pub fn remote_url(&self, repo: &RepoRef) -> String {
        format!("{}/{}/{}.git", self.clone_url, repo.owner(), repo.name())
    }

    fn gitcall(
        &self,
        dest: &Path,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Result<String> {
        let mut bin_args: Vec<OsString> = vec!["-C".into(), dest.as_os_str().to_os_string()];
        bin_args.extend(args.into_iter().map(Into::into));
        Ok(syscall_non_interactive("git", bin_args)?)
    }
}

impl WorkingCopy for Git2WorkingCopy {
    /// Clone remote repository with target branch checked out.
    ///
    /// The progress of the clone is displayed through a progress bar. The
    /// repository token is offered as credentials when the remote asks for
    /// them. If no token is stored, or the token is refused, then the user
    /// will be prompted for credentials. The progress bar will be blocked for
    /// user input.
    #[instrument(skip(self, token), level = "debug")]
    fn clone_branch(&self, repo: &RepoRef, token: &str, branch: &str, dest: &Path) -> Result<()> {
        let url = self.remote_url(repo);
        info!("clone {url} ({branch}) into {:?}", dest.display());

        let bar = if self.show_progress {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(format!("{repo} ({branch})"));
        bar.enable_steady_tick(time::Duration::from_millis(100));

        let prompter = IndicatifPrompter::new(bar);
        let mut authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        if !token.is_empty() {
            authenticator = authenticator.add_plaintext_credentials("*", "x-access-token", token);
        }
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fo)
            .clone(url.as_str(), dest);
        prompter.bar.finish_and_clear();
        result?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn fetch_all(&self, dest: &Path) -> Result<()> {
        let output = self.gitcall(dest, ["fetch", "--all"])?;
        debug!("{output}");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn checkout(&self, dest: &Path, branch: &str) -> Result<()> {
        let output = self.gitcall(dest, ["checkout", branch])?;
        debug!("{output}");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn pull(&self, dest: &Path, branch: &str) -> Result<()> {
        // INVARIANT: Never create merge commits in a working copy.
        let output = self.gitcall(dest, ["pull", "--ff-only", "origin", branch])?;
        debug!("{output}");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn local_commit_log(&self, dest: &Path, branch: &str) -> Result<Vec<String>> {
        let repository = Repository::open(dest)?;
        let reference = [
            format!("refs/heads/{branch}"),
            format!("refs/remotes/origin/{branch}"),
        ]
        .iter()
        .find_map(|name| repository.find_reference(name).ok());

        let Some(reference) = reference else {
            debug!("branch {branch} unknown to {:?}", dest.display());
            return Ok(Vec::new());
        };

        let mut walk = repository.revwalk()?;
        walk.push(reference.peel_to_commit()?.id())?;
        let ids = walk
            .map(|oid| oid.map(|oid| oid.to_string()))
            .collect::<Result<Vec<_>, git2::Error>>()?;

        Ok(ids)
    }

    fn head_branch(&self, dest: &Path) -> Result<Option<String>> {
        let repository = Repository::open(dest)?;
        let head = match repository.head() {
            Ok(head) => head,
            Err(error) if error.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        if !head.is_branch() {
            return Ok(None);
        }

        Ok(head.shorthand().map(ToString::to_string))
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}
