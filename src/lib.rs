// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build and publish projects straight from their GitHub repositories.
//!
//! pkgdeploy remembers a tree of __repositories__, their __branches__, and
//! the buildable __projects__ found on each branch. Publishing walks that tree
//! from the top: pick a repository, pick a branch, bring its working copy up
//! to date, pick a project, then build it and copy the output into the
//! project's __publish folder__. The publish folder is asked for once per
//! (repository, branch, project) triple and remembered afterwards.
//!
//! The branch and project levels of the tree are never edited by hand. They
//! are reconciled against the remote branch listing and the working copy
//! contents every time they are visited.
//!
//! # See Also
//!
//! - [`session::Session`] for the publish flow.
//! - [`config::DeployConfig`] for the persisted tree.

pub mod build;
pub mod config;
pub mod path;
pub mod prompt;
pub mod publish;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod syscall;
pub mod update;
pub mod vcs;
