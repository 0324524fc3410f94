// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment sessions.
//!
//! A [`Session`] owns the config tree for the lifetime of the program, and is
//! the only thing that writes it back to the config store. Writes happen at
//! named checkpoints through [`Session::persist`], never implicitly.
//!
//! # Publish Flow
//!
//! [`Session::publish`] walks one repository from remote listing to copied
//! build output:
//!
//! 1. List remote branches.
//! 2. Select a branch, most recently used first.
//! 3. List remote commits, and bring the working copy up to date.
//! 4. Discover projects in the working copy. Reconcile the branch level of
//!    the repository and the project level of the branch, and record usage of
//!    both. __Checkpoint__.
//! 5. Select a project, most recently used first. __Checkpoint__.
//! 6. Resolve the publish folder of the project.
//! 7. Build and publish the project into a staging directory, then copy the
//!    staged output into the publish folder.
//!
//! A failing step aborts the flow. Nothing is reconciled or recorded before
//! the working copy is up to date, so a flow that fails during steps 1 to 3
//! leaves the config tree exactly as it was. Later failures keep whatever the
//! last checkpoint wrote.

use crate::{
    build::{copy_tree, BuildError, BuildRunner},
    config::{DeployConfig, ProjectKey, Repository},
    path::{default_workspace_dir, NoWayHome},
    prompt::{PromptError, Prompter},
    publish::{resolve_publish_folder, PublishError},
    reconcile::{discover_projects, synchronize_branches, synchronize_projects, ReconcileError},
    store::{ConfigStore, StoreError},
    update::{UpdateAction, UpdateError, Updater},
    vcs::{InvalidRepoRef, RepoRef, VcsAdapter, VcsError},
};

use chrono::Utc;
use std::{
    cmp::Reverse,
    collections::BTreeSet,
    fmt::Write as _,
    fs::remove_dir_all,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Directory below a project that build output is staged into.
pub const STAGING_DIR: &str = "bin/pkgdeploy";

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Project that was published.
    pub key: ProjectKey,

    /// Action that brought the working copy up to date.
    pub action: UpdateAction,

    /// Folder that build output was copied into.
    pub publish_folder: PathBuf,

    /// Number of files copied into publish folder.
    pub files_copied: usize,
}

/// Owner of the config tree.
#[derive(Debug)]
pub struct Session {
    store: ConfigStore,
    config: DeployConfig,
}

impl Session {
    /// Construct new session around already loaded config tree.
    pub fn new(store: ConfigStore, config: DeployConfig) -> Self {
        Self { store, config }
    }

    /// Open session by loading config tree from store.
    pub fn open(store: ConfigStore) -> Self {
        let config = store.load();
        Self::new(store, config)
    }

    /// Config tree.
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Mutable config tree.
    ///
    /// Changes stay in memory until the next [`Session::persist`].
    pub fn config_mut(&mut self) -> &mut DeployConfig {
        &mut self.config
    }

    /// Write config tree to store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError`] if config cannot be written.
    pub fn persist(&self) -> Result<(), StoreError> {
        self.store.save(&self.config)
    }

    /// Directory that houses every working copy.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if no workspace is configured and the default
    ///   cannot be determined.
    pub fn workspace_dir(&self) -> Result<PathBuf, NoWayHome> {
        match &self.config.settings.workspace {
            Some(workspace) => Ok(workspace.clone()),
            None => default_workspace_dir(),
        }
    }

    /// Path to working copy of target repository.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if workspace cannot be determined.
    pub fn working_copy_path(&self, repo: &RepoRef) -> Result<PathBuf, NoWayHome> {
        Ok(self.workspace_dir()?.join(repo.owner()).join(repo.name()))
    }

    /// Register repository with access token, replacing token if already
    /// registered.
    ///
    /// Returns `true` if repository was not registered before.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::InvalidRepoRef`] if name is not `owner/name`.
    /// - Return [`SessionError::Store`] if config cannot be persisted.
    #[instrument(skip(self, token), level = "debug")]
    pub fn register_repository(&mut self, name: &str, token: impl Into<String>) -> Result<bool> {
        let repo = name.parse::<RepoRef>()?;
        let name = repo.to_string();
        let is_new = self.config.repository(&name).is_none();
        self.config.register_repository(name.as_str()).token = token.into();
        self.persist()?;

        if is_new {
            info!("registered {name}");
        } else {
            info!("updated token of {name}");
        }

        Ok(is_new)
    }

    /// Replace access token of registered repository.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::UnknownRepository`] if repository is not
    ///   registered.
    /// - Return [`SessionError::Store`] if config cannot be persisted.
    #[instrument(skip(self, token), level = "debug")]
    pub fn update_token(&mut self, name: &str, token: impl Into<String>) -> Result<()> {
        self.repository_mut(name)?.token = token.into();
        self.persist()?;
        info!("updated token of {name}");
        Ok(())
    }

    /// Forget registered repository along with its branches and projects.
    ///
    /// The working copy on disk is left alone.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::UnknownRepository`] if repository is not
    ///   registered.
    /// - Return [`SessionError::Store`] if config cannot be persisted.
    #[instrument(skip(self), level = "debug")]
    pub fn remove_repository(&mut self, name: &str) -> Result<Repository> {
        let removed = self
            .config
            .remove_repository(name)
            .ok_or_else(|| SessionError::UnknownRepository(name.to_string()))?;
        self.persist()?;
        info!("removed {name}");
        Ok(removed)
    }

    /// Publish one project of target repository.
    ///
    /// See [module level documentation](self) for the steps taken.
    ///
    /// # Errors
    ///
    /// - Return [`SessionError::UnknownRepository`] if repository is not
    ///   registered.
    /// - Return [`SessionError::NoBranches`] or [`SessionError::NoProjects`]
    ///   if there is nothing to select.
    /// - Return any error of the steps taken, see [`SessionError`].
    #[instrument(skip(self, vcs, runner, prompter), level = "debug")]
    pub async fn publish<V, B, P>(
        &mut self,
        name: &str,
        vcs: &V,
        runner: &B,
        prompter: &mut P,
    ) -> Result<PublishReport>
    where
        V: VcsAdapter,
        B: BuildRunner,
        P: Prompter,
    {
        let (repo, token) = {
            let repository = self.repository(name)?;
            (repository.name.parse::<RepoRef>()?, repository.token.clone())
        };

        info!("list branches of {repo}");
        let remote_branches = vcs.list_remote_branches(&repo, &token).await?;
        let branches = branch_choices(self.repository(name)?, &remote_branches);
        if branches.is_empty() {
            return Err(SessionError::NoBranches(repo.to_string()));
        }
        let branch = prompter.select(&format!("Select branch of {repo}:"), branches)?;

        info!("list commits of {repo} ({branch})");
        let remote_commits = vcs.list_remote_commits(&repo, &token, &branch).await?;
        let local_path = self.working_copy_path(&repo)?;
        let action = Updater::new(vcs).run(&repo, &token, &branch, &local_path, &remote_commits)?;
        info!("{repo} ({branch}): {action}");
        let discovered = discover_projects(
            &local_path,
            &self.config.settings.build.descriptor_extension,
        )?;

        // INVARIANT: Tree is reconciled only once working copy is up to date.
        let now = Utc::now();
        let repository = self.repository_mut(name)?;
        synchronize_branches(repository, &remote_branches);
        repository.touch(now);
        let branch_entry = repository.branch_entry(branch.as_str());
        branch_entry.touch(now);
        if let Some(latest) = remote_commits.first() {
            branch_entry.latest_commit = Some(latest.clone());
        }
        synchronize_projects(branch_entry, discovered.iter().map(|project| project.name.as_str()));
        let projects = branch_entry.project_names_by_recent_use();
        self.persist()?;

        if projects.is_empty() {
            return Err(SessionError::NoProjects {
                repository: repo.to_string(),
                branch,
            });
        }
        let selected = prompter.select(&format!("Select project of {repo} ({branch}):"), projects)?;
        let project = discovered
            .iter()
            .find(|project| project.name == selected)
            .ok_or_else(|| SessionError::UnknownProject(selected.clone()))?;

        let key = ProjectKey::new(name, branch.as_str(), selected.as_str());
        self.config.project_entry(&key).touch(now);
        self.persist()?;

        let publish_folder = resolve_publish_folder(self, &key, prompter)?;

        let configuration = self.config.settings.build.configuration.clone();
        let staging = project.dir().join(STAGING_DIR);
        clear_dir(&staging)?;
        runner.build(project.dir(), &configuration)?;
        runner.publish(project.dir(), &configuration, &staging)?;
        let files_copied = copy_tree(&staging, &publish_folder)?;
        info!("published {key} to {:?}", publish_folder.display());

        Ok(PublishReport {
            key,
            action,
            publish_folder,
            files_copied,
        })
    }

    /// Render config tree as indented listing.
    pub fn describe(&self) -> String {
        let mut listing = String::new();
        for repository in self.config.repositories_by_recent_use() {
            let _ = writeln!(listing, "{}{}", repository.name, last_used(repository.last_used));
            for branch in repository.branches.values() {
                let _ = writeln!(listing, "  {}{}", branch.name, last_used(branch.last_used));
                for project in branch.projects.values() {
                    let folder = project
                        .publish_folder
                        .as_ref()
                        .map_or_else(|| "<unresolved>".to_string(), |path| path.display().to_string());
                    let _ = writeln!(
                        listing,
                        "    {} -> {folder}{}",
                        project.name,
                        last_used(project.last_used)
                    );
                }
            }
        }
        listing
    }

    fn repository(&self, name: &str) -> Result<&Repository> {
        self.config
            .repository(name)
            .ok_or_else(|| SessionError::UnknownRepository(name.to_string()))
    }

    fn repository_mut(&mut self, name: &str) -> Result<&mut Repository> {
        self.config
            .repository_mut(name)
            .ok_or_else(|| SessionError::UnknownRepository(name.to_string()))
    }
}

/// Remote branch names, most recently used first according to stored records.
fn branch_choices(repository: &Repository, remote_branches: &[String]) -> Vec<String> {
    let mut names = remote_branches
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    names.sort_by_key(|name| {
        Reverse(repository.branches.get(name).and_then(|branch| branch.last_used))
    });
    names
}

fn last_used(time: Option<chrono::DateTime<Utc>>) -> String {
    time.map(|time| format!(" (last used {})", time.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default()
}

// INVARIANT: Staging directory never holds output of an earlier build.
fn clear_dir(path: &Path) -> Result<()> {
    match remove_dir_all(path) {
        Ok(()) => debug!("cleared {:?}", path.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SessionError::Staging {
                source,
                path: path.to_path_buf(),
            })
        }
    }
    Ok(())
}

/// Session error types.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Repository is not registered.
    #[error("repository {0:?} is not registered")]
    UnknownRepository(String),

    /// Repository name is malformed.
    #[error(transparent)]
    InvalidRepoRef(#[from] InvalidRepoRef),

    /// Remote repository has no branches.
    #[error("repository {0:?} has no branches")]
    NoBranches(String),

    /// Working copy has no buildable projects.
    #[error("no projects found in {repository:?} ({branch})")]
    NoProjects { repository: String, branch: String },

    /// Selected project vanished from working copy.
    #[error("project {0:?} not found in working copy")]
    UnknownProject(String),

    /// Workspace cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),

    /// Remote host or working copy access fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Working copy cannot be brought up to date.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Projects cannot be discovered.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// User cannot be asked.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// Publish folder cannot be resolved.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Build or copy fails.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Config cannot be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Staging directory cannot be cleared.
    #[error("failed to clear staging directory {:?}", path.display())]
    Staging {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
