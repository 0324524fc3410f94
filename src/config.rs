// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that pkgdeploy uses to
//! remember repositories, their branches, their projects, and where each
//! project gets published. File I/O is left to [`ConfigStore`].
//!
//! # General Layout
//!
//! The configuration is composed of two basic parts: settings and the
//! __config tree__. The settings section defines where working copies live,
//! where remote listings come from, and how projects get built. The config
//! tree is a three-level hierarchy of repository, branch, and project records.
//!
//! Each level of the tree is keyed by name. Repository names are unique in the
//! tree, branch names are unique within their repository, and project names
//! are unique within their branch. On disk every level is written as a list of
//! records instead, e.g., `[[repository]]`, `[[repository.branch]]`, and
//! `[[repository.branch.project]]`.
//!
//! [`ConfigStore`]: crate::store::ConfigStore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Reverse,
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};
use uuid::Uuid;

/// Complete configuration of pkgdeploy.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DeployConfig {
    /// General settings.
    #[serde(default)]
    pub settings: Settings,

    /// Registered repositories keyed by `owner/name`.
    #[serde(
        default,
        rename = "repository",
        with = "keyed",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub repositories: BTreeMap<String, Repository>,
}

impl DeployConfig {
    /// Get repository entry by name.
    pub fn repository(&self, name: impl AsRef<str>) -> Option<&Repository> {
        self.repositories.get(name.as_ref())
    }

    /// Get mutable repository entry by name.
    pub fn repository_mut(&mut self, name: impl AsRef<str>) -> Option<&mut Repository> {
        self.repositories.get_mut(name.as_ref())
    }

    /// Register repository by name, or get it if already registered.
    pub fn register_repository(&mut self, name: impl Into<String>) -> &mut Repository {
        let name = name.into();
        self.repositories
            .entry(name.clone())
            .or_insert_with(|| Repository::new(name))
    }

    /// Remove repository entry along with all of its branches and projects.
    pub fn remove_repository(&mut self, name: impl AsRef<str>) -> Option<Repository> {
        self.repositories.remove(name.as_ref())
    }

    /// List repositories, most recently used first.
    ///
    /// Repositories that were never used come last in name order.
    pub fn repositories_by_recent_use(&self) -> Vec<&Repository> {
        let mut repositories = self.repositories.values().collect::<Vec<_>>();
        repositories.sort_by_key(|repository| Reverse(repository.last_used));
        repositories
    }

    /// Find project entry at given key.
    pub fn project(&self, key: &ProjectKey) -> Option<&Project> {
        self.repositories
            .get(&key.repository)
            .and_then(|repository| repository.branches.get(&key.branch))
            .and_then(|branch| branch.projects.get(&key.project))
    }

    /// Get project entry at given key, creating any missing link of the chain.
    ///
    /// Missing repository, branch, or project records are created with
    /// default fields. Existing records are left untouched.
    pub fn project_entry(&mut self, key: &ProjectKey) -> &mut Project {
        self.register_repository(key.repository.as_str())
            .branch_entry(key.branch.as_str())
            .project_entry(key.project.as_str())
    }
}

impl FromStr for DeployConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: DeployConfig = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on workspace field.
        if let Some(workspace) = config.settings.workspace.take() {
            let expanded = shellexpand::full(workspace.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
            config.settings.workspace = Some(PathBuf::from(expanded));
        }

        Ok(config)
    }
}

impl Display for DeployConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// General settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory that houses working copies.
    ///
    /// Falls back to [`default_workspace_dir`] when unset.
    ///
    /// [`default_workspace_dir`]: crate::path::default_workspace_dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Base URL of the GitHub REST API.
    pub api_url: String,

    /// Base URL that repositories get cloned from.
    pub clone_url: String,

    /// Maximum number of remote commit ids compared against a working copy.
    pub commit_depth: u32,

    /// Build tool settings.
    pub build: BuildSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: None,
            api_url: "https://api.github.com".into(),
            clone_url: "https://github.com".into(),
            commit_depth: 100,
            build: BuildSettings::default(),
        }
    }
}

/// Build tool settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Build tool binary.
    pub program: String,

    /// Build configuration handed to the build tool.
    pub configuration: String,

    /// File extension of build descriptors that mark a project.
    pub descriptor_extension: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            program: "dotnet".into(),
            configuration: "Release".into(),
            descriptor_extension: "csproj".into(),
        }
    }
}

/// Registered remote repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Repository {
    /// Stable identity.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Name in `owner/name` form.
    pub name: String,

    /// Access token for the remote host.
    #[serde(default)]
    pub token: String,

    /// Last time repository was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    /// Known branches keyed by name.
    #[serde(
        default,
        rename = "branch",
        with = "keyed",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub branches: BTreeMap<String, Branch>,
}

impl Repository {
    /// Construct new repository entry without token or branches.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            token: String::new(),
            last_used: None,
            branches: BTreeMap::new(),
        }
    }

    /// Get branch entry, creating it if missing.
    pub fn branch_entry(&mut self, name: impl Into<String>) -> &mut Branch {
        let name = name.into();
        self.branches
            .entry(name.clone())
            .or_insert_with(|| Branch::new(name))
    }

    /// List branch names, most recently used first.
    pub fn branch_names_by_recent_use(&self) -> Vec<String> {
        let mut branches = self.branches.values().collect::<Vec<_>>();
        branches.sort_by_key(|branch| Reverse(branch.last_used));
        branches.into_iter().map(|branch| branch.name.clone()).collect()
    }

    /// Mark repository as used at given time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        advance(&mut self.last_used, now);
    }
}

/// Branch of a registered repository.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Branch {
    /// Stable identity.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Name that mirrors remote branch name.
    pub name: String,

    /// Last time branch was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    /// Newest remote commit observed during the last update check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_commit: Option<String>,

    /// Known projects keyed by name.
    #[serde(
        default,
        rename = "project",
        with = "keyed",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub projects: BTreeMap<String, Project>,
}

impl Branch {
    /// Construct new branch entry without projects.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            last_used: None,
            latest_commit: None,
            projects: BTreeMap::new(),
        }
    }

    /// Get project entry, creating it if missing.
    pub fn project_entry(&mut self, name: impl Into<String>) -> &mut Project {
        let name = name.into();
        self.projects
            .entry(name.clone())
            .or_insert_with(|| Project::new(name))
    }

    /// List project names, most recently used first.
    pub fn project_names_by_recent_use(&self) -> Vec<String> {
        let mut projects = self.projects.values().collect::<Vec<_>>();
        projects.sort_by_key(|project| Reverse(project.last_used));
        projects.into_iter().map(|project| project.name.clone()).collect()
    }

    /// Mark branch as used at given time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        advance(&mut self.last_used, now);
    }
}

/// Buildable project found on a branch.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Project {
    /// Stable identity.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Build descriptor file name without its extension.
    pub name: String,

    /// Cached destination of build output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_folder: Option<PathBuf>,

    /// Last time project was selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

impl Project {
    /// Construct new project entry without a publish folder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            publish_folder: None,
            last_used: None,
        }
    }

    /// Mark project as used at given time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        advance(&mut self.last_used, now);
    }
}

/// Full address of a project in the config tree.
///
/// Publish folders are cached per key, so two branches or two repositories
/// with identically named projects never share a destination.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct ProjectKey {
    pub repository: String,
    pub branch: String,
    pub project: String,
}

impl ProjectKey {
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            project: project.into(),
        }
    }
}

impl Display for ProjectKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}@{}:{}", self.repository, self.branch, self.project)
    }
}

// INVARIANT: Usage timestamps never move backwards.
fn advance(last_used: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) {
    *last_used = Some(last_used.map_or(now, |previous| previous.max(now)));
}

/// Record type that is stored in a map under its own name.
pub(crate) trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Repository {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Keyed for Branch {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Keyed for Project {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Serialize keyed maps as plain lists of records.
mod keyed {
    use super::Keyed;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;
    use tracing::warn;

    pub(super) fn serialize<S, T>(map: &BTreeMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub(super) fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Keyed,
    {
        let records = Vec::<T>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for record in records {
            // INVARIANT: First record of a given name wins.
            if map.contains_key(record.key()) {
                warn!("ignoring duplicate entry {:?}", record.key());
                continue;
            }
            map.insert(record.key().to_owned(), record);
        }

        Ok(map)
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}
