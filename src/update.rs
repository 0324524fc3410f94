// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Working copy update decisions.
//!
//! Before a project can be built, its working copy must hold the newest
//! commits of the selected branch. There are three ways to get there:
//!
//! - __Clone__: the working copy does not exist yet, or is an empty
//!   directory.
//! - __Update__: the working copy exists but is missing at least one remote
//!   commit, so every remote is fetched, and the branch is checked out and
//!   pulled.
//! - __No-op__: every remote commit is already present locally.
//!
//! Staleness is detected by subtracting the local commit set of the branch
//! from the remote commit set. This avoids needless network traffic when the
//! working copy is current, and avoids destructive re-cloning when an
//! incremental update is enough.
//!
//! # State Machine
//!
//! [`Updater`] carries out a decision as a small state machine:
//!
//! ```text
//! Start -> CloneInProgress  -> Idle
//! Start -> CommitDiffCheck  -> UpdateInProgress -> Idle
//! Start -> CommitDiffCheck  -> Idle
//! ```
//!
//! Any failure sends the machine back to `Start`. Nothing is retried
//! automatically.

use crate::vcs::{RepoRef, VcsError, WorkingCopy};

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Action needed to bring a working copy up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Clone,
    Update,
    NoOp,
}

impl Display for UpdateAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Clone => fmt.write_str("clone"),
            Self::Update => fmt.write_str("update"),
            Self::NoOp => fmt.write_str("no-op"),
        }
    }
}

/// Decide how to bring working copy at `local_path` up to date.
///
/// # Errors
///
/// - Return [`UpdateError::Inspect`] if working copy directory cannot be read.
/// - Return [`UpdateError::Vcs`] if local commit log cannot be read.
pub fn decide(
    working_copy: &impl WorkingCopy,
    local_path: impl AsRef<Path>,
    remote_commits: &[String],
    branch: &str,
) -> Result<UpdateAction> {
    let local_path = local_path.as_ref();
    if is_vacant(local_path)? {
        return Ok(UpdateAction::Clone);
    }

    commit_diff(working_copy, local_path, remote_commits, branch)
}

/// Remote commits that are absent from local commit listing.
pub fn missing_commits<'r>(remote_commits: &'r [String], local_commits: &[String]) -> Vec<&'r str> {
    let local = local_commits.iter().map(String::as_str).collect::<HashSet<_>>();
    remote_commits
        .iter()
        .map(String::as_str)
        .filter(|commit| !local.contains(commit))
        .collect()
}

// INVARIANT: Working copy at `local_path` exists and is not empty.
fn commit_diff(
    working_copy: &impl WorkingCopy,
    local_path: &Path,
    remote_commits: &[String],
    branch: &str,
) -> Result<UpdateAction> {
    let local_commits = working_copy.local_commit_log(local_path, branch)?;
    let missing = missing_commits(remote_commits, &local_commits);
    if missing.is_empty() {
        return Ok(UpdateAction::NoOp);
    }

    info!("{branch} is behind by {} commits", missing.len());
    Ok(UpdateAction::Update)
}

// INVARIANT: A missing directory and an empty directory both need a clone.
fn is_vacant(path: &Path) -> Result<bool> {
    match read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(true),
        Err(source) => Err(UpdateError::Inspect {
            source,
            path: path.to_path_buf(),
        }),
    }
}

/// Phase of an update attempt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    #[default]
    Start,
    CloneInProgress,
    CommitDiffCheck,
    UpdateInProgress,
    Idle,
}

/// Bring working copies up to date.
#[derive(Debug)]
pub struct Updater<'w, W>
where
    W: WorkingCopy,
{
    working_copy: &'w W,
    phase: UpdatePhase,
}

impl<'w, W> Updater<'w, W>
where
    W: WorkingCopy,
{
    /// Construct new updater in [`UpdatePhase::Start`].
    pub fn new(working_copy: &'w W) -> Self {
        Self {
            working_copy,
            phase: UpdatePhase::Start,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Bring working copy of branch up to date with remote commits.
    ///
    /// Returns the action that was carried out. On a no-op, the branch is
    /// still checked out if the working copy currently sits on another
    /// branch.
    ///
    /// # Errors
    ///
    /// - Return [`UpdateError::Inspect`] if working copy directory cannot be
    ///   read.
    /// - Return [`UpdateError::Vcs`] if any version control step fails.
    ///
    /// On error the updater returns to [`UpdatePhase::Start`].
    #[instrument(skip(self, token, remote_commits), level = "debug")]
    pub fn run(
        &mut self,
        repo: &RepoRef,
        token: &str,
        branch: &str,
        local_path: &Path,
        remote_commits: &[String],
    ) -> Result<UpdateAction> {
        self.phase = UpdatePhase::Start;
        let result = self.advance(repo, token, branch, local_path, remote_commits);
        if result.is_err() {
            self.transition(UpdatePhase::Start);
        }
        result
    }

    fn advance(
        &mut self,
        repo: &RepoRef,
        token: &str,
        branch: &str,
        local_path: &Path,
        remote_commits: &[String],
    ) -> Result<UpdateAction> {
        if is_vacant(local_path)? {
            self.transition(UpdatePhase::CloneInProgress);
            self.working_copy
                .clone_branch(repo, token, branch, local_path)?;
            self.transition(UpdatePhase::Idle);
            return Ok(UpdateAction::Clone);
        }

        self.transition(UpdatePhase::CommitDiffCheck);
        let action = commit_diff(self.working_copy, local_path, remote_commits, branch)?;
        if action == UpdateAction::NoOp {
            if self.working_copy.head_branch(local_path)?.as_deref() != Some(branch) {
                info!("switch {repo} to {branch}");
                self.working_copy.checkout(local_path, branch)?;
            }
            self.transition(UpdatePhase::Idle);
            return Ok(UpdateAction::NoOp);
        }

        self.transition(UpdatePhase::UpdateInProgress);
        self.working_copy.fetch_all(local_path)?;
        self.working_copy.checkout(local_path, branch)?;
        self.working_copy.pull(local_path, branch)?;
        self.transition(UpdatePhase::Idle);

        Ok(UpdateAction::Update)
    }

    fn transition(&mut self, next: UpdatePhase) {
        debug!("update phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// Update error types.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Working copy directory cannot be inspected.
    #[error("failed to inspect working copy at {:?}", path.display())]
    Inspect {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Version control step fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::SyscallError;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{cell::RefCell, fs::create_dir_all, fs::write};

    /// Working copy double that records every call.
    #[derive(Debug, Default)]
    struct FakeWorkingCopy {
        local_commits: Vec<String>,
        head: Option<String>,
        fail_on: Option<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeWorkingCopy {
        fn with_commits(commits: &[&str], head: &str) -> Self {
            Self {
                local_commits: commits.iter().map(ToString::to_string).collect(),
                head: Some(head.into()),
                ..Default::default()
            }
        }

        fn record(&self, call: &'static str) -> crate::vcs::Result<()> {
            self.calls.borrow_mut().push(call.into());
            if self.fail_on == Some(call) {
                return Err(VcsError::Syscall(SyscallError::Failed {
                    command: format!("git {call}"),
                    status: failed_status(),
                    message: "fatal: unreachable".into(),
                }));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    #[cfg(unix)]
    fn failed_status() -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(1 << 8)
    }

    #[cfg(windows)]
    fn failed_status() -> std::process::ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(1)
    }

    impl WorkingCopy for FakeWorkingCopy {
        fn clone_branch(&self, _: &RepoRef, _: &str, _: &str, dest: &Path) -> crate::vcs::Result<()> {
            self.record("clone")?;
            create_dir_all(dest.join(".git")).map_err(|source| SyscallError::Spawn {
                source,
                command: "git clone".into(),
            })?;
            Ok(())
        }

        fn fetch_all(&self, _: &Path) -> crate::vcs::Result<()> {
            self.record("fetch")
        }

        fn checkout(&self, _: &Path, _: &str) -> crate::vcs::Result<()> {
            self.record("checkout")
        }

        fn pull(&self, _: &Path, _: &str) -> crate::vcs::Result<()> {
            self.record("pull")
        }

        fn local_commit_log(&self, _: &Path, _: &str) -> crate::vcs::Result<Vec<String>> {
            self.record("log")?;
            Ok(self.local_commits.clone())
        }

        fn head_branch(&self, _: &Path) -> crate::vcs::Result<Option<String>> {
            Ok(self.head.clone())
        }
    }

    fn commits(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    fn populate(path: &str) -> anyhow::Result<()> {
        create_dir_all(path)?;
        write(format!("{path}/README.md"), "# widget")?;
        Ok(())
    }

    #[sealed_test]
    fn missing_working_copy_needs_clone() -> anyhow::Result<()> {
        let working_copy = FakeWorkingCopy::with_commits(&["c1"], "main");

        let result = decide(&working_copy, "widget", &commits(&["c1", "c2"]), "main")?;
        assert_eq!(result, UpdateAction::Clone);
        let result = decide(&working_copy, "widget", &[], "main")?;
        assert_eq!(result, UpdateAction::Clone);
        assert!(working_copy.calls().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn empty_working_copy_needs_clone() -> anyhow::Result<()> {
        create_dir_all("widget")?;
        let working_copy = FakeWorkingCopy::default();

        let result = decide(&working_copy, "widget", &commits(&["c1"]), "main")?;
        assert_eq!(result, UpdateAction::Clone);

        Ok(())
    }

    #[sealed_test]
    fn current_working_copy_needs_nothing() -> anyhow::Result<()> {
        populate("widget")?;
        let working_copy = FakeWorkingCopy::with_commits(&["c3", "c2", "c1"], "main");

        let result = decide(&working_copy, "widget", &commits(&["c3", "c2"]), "main")?;
        assert_eq!(result, UpdateAction::NoOp);

        Ok(())
    }

    #[sealed_test]
    fn stale_working_copy_needs_update() -> anyhow::Result<()> {
        populate("widget")?;
        let working_copy = FakeWorkingCopy::with_commits(&["c1"], "main");

        let result = decide(&working_copy, "widget", &commits(&["c2", "c1"]), "main")?;
        assert_eq!(result, UpdateAction::Update);

        Ok(())
    }

    #[test]
    fn missing_commits_keeps_remote_order() {
        let remote = commits(&["c4", "c3", "c2", "c1"]);
        let local = commits(&["c3", "c1", "c0"]);
        assert_eq!(missing_commits(&remote, &local), vec!["c4", "c2"]);
    }

    #[sealed_test]
    fn updater_carries_out_decided_action() -> anyhow::Result<()> {
        populate("current")?;
        populate("stale")?;
        let repo = RepoRef::new("acme", "widget");
        let cases = [
            ("vacant", commits(&["c1"]), UpdateAction::Clone),
            ("current", commits(&["c1"]), UpdateAction::NoOp),
            ("stale", commits(&["c2", "c1"]), UpdateAction::Update),
        ];

        for (path, remote, expect) in cases {
            let working_copy = FakeWorkingCopy::with_commits(&["c1"], "main");
            let decided = decide(&working_copy, path, &remote, "main")?;
            let result = Updater::new(&working_copy).run(&repo, "", "main", Path::new(path), &remote)?;
            assert_eq!(decided, expect);
            assert_eq!(result, decided);
        }

        Ok(())
    }

    #[sealed_test]
    fn updater_clones_into_vacant_path() -> anyhow::Result<()> {
        let working_copy = FakeWorkingCopy::default();
        let mut updater = Updater::new(&working_copy);

        let result = updater.run(
            &RepoRef::new("acme", "widget"),
            "secret",
            "main",
            Path::new("widget"),
            &commits(&["c1"]),
        )?;
        assert_eq!(result, UpdateAction::Clone);
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert_eq!(working_copy.calls(), vec!["clone"]);

        Ok(())
    }

    #[sealed_test]
    fn updater_fetches_checks_out_and_pulls() -> anyhow::Result<()> {
        populate("widget")?;
        let working_copy = FakeWorkingCopy::with_commits(&["c1"], "dev");
        let mut updater = Updater::new(&working_copy);

        let result = updater.run(
            &RepoRef::new("acme", "widget"),
            "",
            "main",
            Path::new("widget"),
            &commits(&["c2", "c1"]),
        )?;
        assert_eq!(result, UpdateAction::Update);
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert_eq!(working_copy.calls(), vec!["log", "fetch", "checkout", "pull"]);

        Ok(())
    }

    #[sealed_test]
    fn updater_no_op_switches_branch_when_needed() -> anyhow::Result<()> {
        populate("widget")?;
        let on_branch = FakeWorkingCopy::with_commits(&["c1"], "main");
        let mut updater = Updater::new(&on_branch);
        let result = updater.run(
            &RepoRef::new("acme", "widget"),
            "",
            "main",
            Path::new("widget"),
            &commits(&["c1"]),
        )?;
        assert_eq!(result, UpdateAction::NoOp);
        assert_eq!(on_branch.calls(), vec!["log"]);

        let elsewhere = FakeWorkingCopy::with_commits(&["c1"], "dev");
        let mut updater = Updater::new(&elsewhere);
        let result = updater.run(
            &RepoRef::new("acme", "widget"),
            "",
            "main",
            Path::new("widget"),
            &commits(&["c1"]),
        )?;
        assert_eq!(result, UpdateAction::NoOp);
        assert_eq!(elsewhere.calls(), vec!["log", "checkout"]);

        Ok(())
    }

    #[sealed_test]
    fn updater_failure_returns_to_start() -> anyhow::Result<()> {
        populate("widget")?;
        let working_copy = FakeWorkingCopy {
            fail_on: Some("pull"),
            ..FakeWorkingCopy::with_commits(&["c1"], "main")
        };
        let mut updater = Updater::new(&working_copy);

        let result = updater.run(
            &RepoRef::new("acme", "widget"),
            "",
            "main",
            Path::new("widget"),
            &commits(&["c2", "c1"]),
        );
        assert!(matches!(result, Err(UpdateError::Vcs(VcsError::Syscall(_)))));
        assert_eq!(updater.phase(), UpdatePhase::Start);
        assert_eq!(working_copy.calls(), vec!["log", "fetch", "checkout", "pull"]);

        Ok(())
    }
}
