// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Config tree reconciliation.
//!
//! The branch and project levels of the config tree mirror an external source
//! of truth. Branches mirror the branch listing of the remote repository.
//! Projects mirror the build descriptors found in the working copy of a
//! branch. __Reconciliation__ brings a level back in line with its source by
//! adding records for names that are new upstream, and pruning records whose
//! names vanished upstream. Records that survive are never replaced, so their
//! usage timestamps and cached publish folders carry over.
//!
//! Pruning a project throws away its cached publish folder. A project that
//! comes back later is treated as brand new, and must have its publish folder
//! resolved again.

use crate::config::{Branch, Project, Repository};

use glob::{glob_with, MatchOptions, Pattern};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Names added and pruned by one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl Reconciliation {
    /// Check if reconciliation changed nothing.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Synchronize branches of repository with remote branch names.
pub fn synchronize_branches(
    repository: &mut Repository,
    remote_branch_names: impl IntoIterator<Item = impl AsRef<str>>,
) -> Reconciliation {
    let result = synchronize(&mut repository.branches, remote_branch_names, |name| {
        Branch::new(name)
    });
    if !result.is_unchanged() {
        debug!(
            "{}: added branches {:?}, pruned branches {:?}",
            repository.name, result.added, result.removed
        );
    }
    result
}

/// Synchronize projects of branch with project names discovered on disk.
pub fn synchronize_projects(
    branch: &mut Branch,
    discovered_project_names: impl IntoIterator<Item = impl AsRef<str>>,
) -> Reconciliation {
    let result = synchronize(&mut branch.projects, discovered_project_names, |name| {
        Project::new(name)
    });
    if !result.is_unchanged() {
        debug!(
            "{}: added projects {:?}, pruned projects {:?}",
            branch.name, result.added, result.removed
        );
    }
    result
}

fn synchronize<T>(
    entries: &mut BTreeMap<String, T>,
    upstream: impl IntoIterator<Item = impl AsRef<str>>,
    create: impl Fn(&str) -> T,
) -> Reconciliation {
    let upstream = upstream
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect::<BTreeSet<_>>();
    let mut result = Reconciliation::default();

    for name in &upstream {
        if !entries.contains_key(name) {
            entries.insert(name.clone(), create(name));
            result.added.push(name.clone());
        }
    }

    entries.retain(|name, _| {
        let keep = upstream.contains(name);
        if !keep {
            result.removed.push(name.clone());
        }
        keep
    });

    result
}

/// Buildable project found in a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProject {
    /// Build descriptor file name without its extension.
    pub name: String,

    /// Path to build descriptor.
    pub descriptor: PathBuf,
}

impl DiscoveredProject {
    /// Directory that contains the project.
    pub fn dir(&self) -> &Path {
        self.descriptor.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Find every build descriptor with given extension below working copy.
///
/// Results are sorted by project name. When two descriptors share a name,
/// the first one in path order is kept.
///
/// # Errors
///
/// - Return [`ReconcileError::Pattern`] if search pattern is invalid.
/// - Return [`ReconcileError::Walk`] if part of working copy cannot be read.
pub fn discover_projects(
    working_copy: impl AsRef<Path>,
    extension: impl AsRef<str>,
) -> Result<Vec<DiscoveredProject>> {
    let root = Pattern::escape(working_copy.as_ref().to_string_lossy().as_ref());
    let extension = Pattern::escape(extension.as_ref().trim_start_matches('.'));
    let pattern = format!("{root}/**/*.{extension}");
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut descriptors = glob_with(&pattern, options)?.collect::<std::result::Result<Vec<_>, _>>()?;
    descriptors.sort();

    let mut projects: BTreeMap<String, DiscoveredProject> = BTreeMap::new();
    for descriptor in descriptors.into_iter().filter(|path| path.is_file()) {
        let Some(name) = descriptor.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
            continue;
        };

        if let Some(existing) = projects.get(&name) {
            warn!(
                "project {name:?} at {:?} shadowed by {:?}",
                descriptor.display(),
                existing.descriptor.display()
            );
            continue;
        }

        projects.insert(name.clone(), DiscoveredProject { name, descriptor });
    }

    Ok(projects.into_values().collect())
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Descriptor search pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Working copy cannot be walked.
    #[error(transparent)]
    Walk(#[from] glob::GlobError),
}

/// Friendly result alias :3
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
