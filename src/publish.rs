// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish folder resolution.
//!
//! Every project remembers the folder that its build output was last
//! published to. The cache lives on the project record of the config tree, so
//! it is scoped to the full (repository, branch, project) triple. Two branches
//! with identically named projects never share a destination by accident.
//!
//! Resolution is split in two. [`lookup`] decides whether a cached folder is
//! available, and [`resolve_publish_folder`] asks the user to confirm or
//! override it through a [`Prompter`]. Whatever folder comes out of
//! resolution exists as a directory on return.

use crate::{
    config::{DeployConfig, ProjectKey},
    prompt::{PromptError, Prompter},
    session::Session,
    store::StoreError,
};

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Cached publish folder lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedFolder {
    /// Folder was resolved before; confirm or override it.
    Cached(PathBuf),

    /// Folder was never resolved for this project.
    Missing,
}

/// Look up cached publish folder of project at given key.
pub fn lookup(config: &DeployConfig, key: &ProjectKey) -> CachedFolder {
    config
        .project(key)
        .and_then(|project| project.publish_folder.as_ref())
        .filter(|folder| !folder.as_os_str().is_empty())
        .map_or(CachedFolder::Missing, |folder| CachedFolder::Cached(folder.clone()))
}

/// Resolve publish folder of project at given key.
///
/// A cached folder is offered for confirmation first. If it is accepted, it
/// is returned unchanged. If it is rejected, or if nothing is cached, then a
/// new folder is asked for, written into the config tree (creating any missing
/// repository, branch, or project record), and persisted right away.
///
/// # Errors
///
/// - Return [`PublishError::Prompt`] if the user cannot be asked.
/// - Return [`PublishError::CreateDir`] or [`PublishError::NotADirectory`]
///   if folder cannot be made into a directory.
/// - Return [`PublishError::Store`] if config cannot be persisted.
#[instrument(skip(session, prompter), level = "debug")]
pub fn resolve_publish_folder(
    session: &mut Session,
    key: &ProjectKey,
    prompter: &mut impl Prompter,
) -> Result<PathBuf> {
    if let CachedFolder::Cached(folder) = lookup(session.config(), key) {
        let message = format!("Publish {} to {}?", key.project, folder.display());
        if prompter.confirm(&message, true)? {
            debug!("reuse cached publish folder of {key}");
            ensure_dir(&folder)?;
            return Ok(folder);
        }
    }

    let folder = ask_folder(prompter, key)?;
    ensure_dir(&folder)?;

    session.config_mut().project_entry(key).publish_folder = Some(folder.clone());
    session.persist()?;
    info!("publish folder of {key} set to {:?}", folder.display());

    Ok(folder)
}

fn ask_folder(prompter: &mut impl Prompter, key: &ProjectKey) -> Result<PathBuf> {
    let message = format!("Destination folder for {key}:");
    loop {
        let answer = prompter.text(&message)?;
        let answer = answer.trim();
        if answer.is_empty() {
            warn!("destination folder cannot be empty");
            continue;
        }

        match shellexpand::full(answer) {
            Ok(expanded) => return Ok(PathBuf::from(expanded.into_owned())),
            Err(error) => warn!("cannot expand {answer:?}: {error}"),
        }
    }
}

// INVARIANT: Resolved folder is an existing directory.
fn ensure_dir(folder: &Path) -> Result<()> {
    mkdirp::mkdirp(folder).map_err(|source| PublishError::CreateDir {
        source,
        path: folder.to_path_buf(),
    })?;

    if !folder.is_dir() {
        return Err(PublishError::NotADirectory(folder.to_path_buf()));
    }

    Ok(())
}

/// Publish folder resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// User cannot be asked.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// Folder cannot be created.
    #[error("failed to create publish folder at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Folder exists but is not a directory.
    #[error("publish folder {:?} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Config cannot be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Friendly result alias :3
pub type Result<T, E = PublishError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prompt::scripted::{Answer, ScriptedPrompter},
        store::ConfigStore,
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::write;

    fn session() -> Session {
        Session::new(ConfigStore::new("config.toml"), DeployConfig::default())
    }

    fn stored_folder(key: &ProjectKey) -> Option<PathBuf> {
        ConfigStore::new("config.toml")
            .load()
            .project(key)
            .and_then(|project| project.publish_folder.clone())
    }

    #[sealed_test]
    fn first_resolution_asks_creates_and_persists() -> anyhow::Result<()> {
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        let mut prompter = ScriptedPrompter::new([Answer::Text("srv/deploys/widget-api".into())]);

        let result = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        assert_eq!(result, PathBuf::from("srv/deploys/widget-api"));
        assert!(result.is_dir());
        assert_eq!(stored_folder(&key), Some(result));

        Ok(())
    }

    #[sealed_test]
    fn accepted_cache_is_returned_without_asking_for_folder() -> anyhow::Result<()> {
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        let mut prompter = ScriptedPrompter::new([
            Answer::Text("srv/deploys/widget-api".into()),
            Answer::Confirm(true),
        ]);

        let first = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        let second = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        assert_eq!(first, second);
        assert!(prompter.is_exhausted());
        assert_eq!(
            prompter.asked,
            vec![
                "text: Destination folder for acme/widget@main:Api:",
                "confirm: Publish Api to srv/deploys/widget-api?",
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn rejected_cache_is_overwritten() -> anyhow::Result<()> {
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        session.config_mut().project_entry(&key).publish_folder = Some("old".into());
        let mut prompter =
            ScriptedPrompter::new([Answer::Confirm(false), Answer::Text("new".into())]);

        let result = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        assert_eq!(result, PathBuf::from("new"));
        assert_eq!(stored_folder(&key), Some(PathBuf::from("new")));
        assert!(!Path::new("old").exists());

        Ok(())
    }

    #[sealed_test]
    fn branches_and_repositories_do_not_share_folders() -> anyhow::Result<()> {
        let mut session = session();
        let main = ProjectKey::new("acme/widget", "main", "Api");
        let dev = ProjectKey::new("acme/widget", "dev", "Api");
        let other = ProjectKey::new("acme/gadget", "main", "Api");
        let mut prompter = ScriptedPrompter::new([
            Answer::Text("deploys/main-api".into()),
            Answer::Text("deploys/dev-api".into()),
            Answer::Text("deploys/gadget-api".into()),
        ]);

        assert_eq!(lookup(session.config(), &dev), CachedFolder::Missing);
        resolve_publish_folder(&mut session, &main, &mut prompter)?;
        assert_eq!(lookup(session.config(), &dev), CachedFolder::Missing);
        assert_eq!(lookup(session.config(), &other), CachedFolder::Missing);
        resolve_publish_folder(&mut session, &dev, &mut prompter)?;
        resolve_publish_folder(&mut session, &other, &mut prompter)?;

        assert_eq!(stored_folder(&main), Some(PathBuf::from("deploys/main-api")));
        assert_eq!(stored_folder(&dev), Some(PathBuf::from("deploys/dev-api")));
        assert_eq!(stored_folder(&other), Some(PathBuf::from("deploys/gadget-api")));

        Ok(())
    }

    #[sealed_test]
    fn empty_answer_is_asked_again() -> anyhow::Result<()> {
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        let mut prompter =
            ScriptedPrompter::new([Answer::Text("   ".into()), Answer::Text("deploys".into())]);

        let result = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        assert_eq!(result, PathBuf::from("deploys"));
        assert_eq!(prompter.asked.len(), 2);

        Ok(())
    }

    #[sealed_test(env = [("DEPLOY_ROOT", "deploys")])]
    fn entered_folder_is_shell_expanded() -> anyhow::Result<()> {
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        let mut prompter = ScriptedPrompter::new([Answer::Text("$DEPLOY_ROOT/api".into())]);

        let result = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        assert_eq!(result, PathBuf::from("deploys/api"));

        Ok(())
    }

    #[sealed_test]
    fn undefined_variable_is_asked_again() -> anyhow::Result<()> {
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        let mut prompter = ScriptedPrompter::new([
            Answer::Text("$PKGDEPLOY_UNDEFINED_ROOT/api".into()),
            Answer::Text("deploys/api".into()),
        ]);

        let result = resolve_publish_folder(&mut session, &key, &mut prompter)?;
        assert_eq!(result, PathBuf::from("deploys/api"));
        assert!(prompter.is_exhausted());
        assert_eq!(stored_folder(&key), Some(PathBuf::from("deploys/api")));

        Ok(())
    }

    #[sealed_test]
    fn file_in_the_way_is_not_cached() -> anyhow::Result<()> {
        write("taken", "not a directory")?;
        let mut session = session();
        let key = ProjectKey::new("acme/widget", "main", "Api");
        let mut prompter = ScriptedPrompter::new([Answer::Text("taken".into())]);

        let result = resolve_publish_folder(&mut session, &key, &mut prompter);
        assert!(matches!(
            result,
            Err(PublishError::CreateDir { .. } | PublishError::NotADirectory(_))
        ));
        assert_eq!(lookup(session.config(), &key), CachedFolder::Missing);
        assert!(!Path::new("config.toml").exists());

        Ok(())
    }
}
