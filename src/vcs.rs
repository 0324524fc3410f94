// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control access.
//!
//! pkgdeploy talks to version control in two places. The __remote host__
//! answers questions about what exists upstream, i.e., which branches a
//! repository has and which commits a branch contains. The __working copy__
//! is the local checkout of a repository that gets cloned, fetched, checked
//! out, and pulled so that projects can be built from it.
//!
//! Both sides are traits so that the reconciliation and update logic can be
//! driven by something other than GitHub and a real Git binary. The default
//! implementation, [`GitHubVcs`], pairs the GitHub REST API with libgit2 and
//! the `git` binary.
//!
//! # See Also
//!
//! 1. [`github`]
//! 2. [`git`]

pub mod git;
pub mod github;

use crate::{
    config::Settings,
    syscall::SyscallError,
    vcs::{git::Git2WorkingCopy, github::GitHubClient},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    path::Path,
    str::FromStr,
};

/// Reference to remote repository in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    owner: String,
    name: String,
}

impl RepoRef {
    /// Construct new repository reference.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Owner of repository, e.g., user or organization.
    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Name of repository without its owner.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl FromStr for RepoRef {
    type Err = InvalidRepoRef;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRepoRef(data.to_string());
        let (owner, name) = data.trim().split_once('/').ok_or_else(invalid)?;
        let is_valid = |part: &str| {
            !part.is_empty() && !part.contains('/') && !part.contains(char::is_whitespace)
        };

        if !is_valid(owner) || !is_valid(name) {
            return Err(invalid());
        }

        Ok(Self::new(owner, name))
    }
}

impl Display for RepoRef {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.owner, self.name)
    }
}

/// Repository reference is not of the form `owner/name`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("repository {0:?} is not of the form owner/name")]
pub struct InvalidRepoRef(pub String);

/// Upstream listings of a remote repository.
pub trait RemoteHost {
    /// List names of every branch of remote repository.
    fn list_remote_branches(
        &self,
        repo: &RepoRef,
        token: &str,
    ) -> impl Future<Output = Result<Vec<String>>>;

    /// List commit ids reachable from remote branch, newest first.
    fn list_remote_commits(
        &self,
        repo: &RepoRef,
        token: &str,
        branch: &str,
    ) -> impl Future<Output = Result<Vec<String>>>;
}

/// Operations on the local working copy of a repository.
pub trait WorkingCopy {
    /// Clone remote repository with target branch checked out into `dest`.
    fn clone_branch(&self, repo: &RepoRef, token: &str, branch: &str, dest: &Path) -> Result<()>;

    /// Fetch every remote of working copy.
    fn fetch_all(&self, dest: &Path) -> Result<()>;

    /// Check out target branch.
    fn checkout(&self, dest: &Path, branch: &str) -> Result<()>;

    /// Pull target branch from its remote.
    fn pull(&self, dest: &Path, branch: &str) -> Result<()>;

    /// List commit ids reachable from local branch, newest first.
    ///
    /// A branch that the working copy does not know about yields an empty
    /// listing.
    fn local_commit_log(&self, dest: &Path, branch: &str) -> Result<Vec<String>>;

    /// Name of branch currently checked out, if any.
    fn head_branch(&self, dest: &Path) -> Result<Option<String>>;
}

/// Full version control adapter.
pub trait VcsAdapter: RemoteHost + WorkingCopy {}

impl<T> VcsAdapter for T where T: RemoteHost + WorkingCopy {}

/// GitHub remote host paired with a libgit2 working copy.
#[derive(Debug, Clone)]
pub struct GitHubVcs {
    remote: GitHubClient,
    local: Git2WorkingCopy,
}

impl GitHubVcs {
    /// Construct new adapter from settings.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Http`] if HTTP client cannot be built.
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            remote: GitHubClient::new(settings.api_url.as_str(), settings.commit_depth)?,
            local: Git2WorkingCopy::new(settings.clone_url.as_str()),
        })
    }
}

impl RemoteHost for GitHubVcs {
    async fn list_remote_branches(&self, repo: &RepoRef, token: &str) -> Result<Vec<String>> {
        self.remote.list_remote_branches(repo, token).await
    }

    async fn list_remote_commits(
        &self,
        repo: &RepoRef,
        token: &str,
        branch: &str,
    ) -> Result<Vec<String>> {
        self.remote.list_remote_commits(repo, token, branch).await
    }
}

impl WorkingCopy for GitHubVcs {
    fn clone_branch(&self, repo: &RepoRef, token: &str, branch: &str, dest: &Path) -> Result<()> {
        self.local.clone_branch(repo, token, branch, dest)
    }

    fn fetch_all(&self, dest: &Path) -> Result<()> {
        self.local.fetch_all(dest)
    }

    fn checkout(&self, dest: &Path, branch: &str) -> Result<()> {
        self.local.checkout(dest, branch)
    }

    fn pull(&self, dest: &Path, branch: &str) -> Result<()> {
        self.local.pull(dest, branch)
    }

    fn local_commit_log(&self, dest: &Path, branch: &str) -> Result<Vec<String>> {
        self.local.local_commit_log(dest, branch)
    }

    fn head_branch(&self, dest: &Path) -> Result<Option<String>> {
        self.local.head_branch(dest)
    }
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Remote host cannot be reached, or answers with garbage.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Remote host refuses request, e.g., bad token or unknown repository.
    #[error("request to {url} failed with {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary fails.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
