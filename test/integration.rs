// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RepoFixture, RepoKind};

use pkgdeploy::{
    reconcile::discover_projects,
    update::{decide, UpdateAction, UpdatePhase, Updater},
    vcs::{git::Git2WorkingCopy, RepoRef, WorkingCopy},
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{env::current_dir, path::Path};

fn remote_fixture() -> Result<(RepoFixture, Git2WorkingCopy)> {
    let root = current_dir()?.join("remote");
    let fixture = RepoFixture::new(root.join("acme").join("widget.git"), RepoKind::Bare)?;
    fixture.stage_and_commit("src/Api/Api.csproj", "<Project />")?;
    fixture.stage_and_commit("src/Worker/Worker.csproj", "<Project />")?;
    let working_copy = Git2WorkingCopy::new(format!("file://{}", root.display())).quiet();
    Ok((fixture, working_copy))
}

#[sealed_test]
fn clone_missing_working_copy() -> Result<()> {
    let (fixture, working_copy) = remote_fixture()?;
    let repo = RepoRef::new("acme", "widget");
    let dest = Path::new("work/acme/widget");
    let remote_commits = fixture.commit_log("main")?;

    assert_eq!(decide(&working_copy, dest, &remote_commits, "main")?, UpdateAction::Clone);

    let mut updater = Updater::new(&working_copy);
    let action = updater.run(&repo, "", "main", dest, &remote_commits)?;
    assert_eq!(action, UpdateAction::Clone);
    assert_eq!(updater.phase(), UpdatePhase::Idle);
    assert_eq!(working_copy.local_commit_log(dest, "main")?, remote_commits);
    assert_eq!(working_copy.head_branch(dest)?, Some("main".into()));

    let projects = discover_projects(dest, "csproj")?;
    let names = projects.iter().map(|project| project.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Api", "Worker"]);

    assert_eq!(decide(&working_copy, dest, &remote_commits, "main")?, UpdateAction::NoOp);

    Ok(())
}

#[sealed_test]
fn update_stale_working_copy() -> Result<()> {
    let (fixture, working_copy) = remote_fixture()?;
    let repo = RepoRef::new("acme", "widget");
    let dest = Path::new("work/acme/widget");
    working_copy.clone_branch(&repo, "", "main", dest)?;

    fixture.stage_and_commit("src/Web/Web.csproj", "<Project />")?;
    let remote_commits = fixture.commit_log("main")?;
    assert_eq!(decide(&working_copy, dest, &remote_commits, "main")?, UpdateAction::Update);

    let mut updater = Updater::new(&working_copy);
    let action = updater.run(&repo, "", "main", dest, &remote_commits)?;
    assert_eq!(action, UpdateAction::Update);
    assert_eq!(updater.phase(), UpdatePhase::Idle);
    assert_eq!(working_copy.local_commit_log(dest, "main")?, remote_commits);
    assert!(dest.join("src/Web/Web.csproj").is_file());

    Ok(())
}

#[sealed_test]
fn clone_other_branch() -> Result<()> {
    let (fixture, working_copy) = remote_fixture()?;
    fixture.switch_to_new_branch("dev")?;
    fixture.stage_and_commit("src/Tools/Tools.csproj", "<Project />")?;
    let repo = RepoRef::new("acme", "widget");
    let dest = Path::new("work/acme/widget");

    working_copy.clone_branch(&repo, "", "dev", dest)?;
    assert_eq!(working_copy.head_branch(dest)?, Some("dev".into()));
    assert_eq!(working_copy.local_commit_log(dest, "dev")?, fixture.commit_log("dev")?);

    // INVARIANT: Branches not checked out locally are read from remote tracking refs.
    assert_eq!(working_copy.local_commit_log(dest, "main")?, fixture.commit_log("main")?);
    assert!(working_copy.local_commit_log(dest, "gone")?.is_empty());

    Ok(())
}

#[sealed_test]
fn unborn_working_copy_has_no_head_branch() -> Result<()> {
    RepoFixture::new("fresh", RepoKind::Normal)?;
    let working_copy = Git2WorkingCopy::new("file:///nowhere").quiet();
    assert_eq!(working_copy.head_branch(Path::new("fresh"))?, None);

    Ok(())
}

#[sealed_test]
fn clone_from_unknown_remote_fails_and_resets_updater() -> Result<()> {
    let (_fixture, working_copy) = remote_fixture()?;
    let repo = RepoRef::new("acme", "gadget");
    let dest = Path::new("work/acme/gadget");

    let mut updater = Updater::new(&working_copy);
    let result = updater.run(&repo, "", "main", dest, &["abc".to_string()]);
    assert!(result.is_err());
    assert_eq!(updater.phase(), UpdatePhase::Start);

    Ok(())
}
