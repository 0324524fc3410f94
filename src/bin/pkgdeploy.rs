// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use pkgdeploy::{
    build::CommandRunner,
    path::default_config_path,
    prompt::{InquirePrompter, Prompter},
    session::Session,
    store::ConfigStore,
    vcs::GitHubVcs,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ADD_REPOSITORY: &str = "Add new repository";
const MANAGE_REPOSITORY: &str = "Manage repository";
const EXIT: &str = "Exit";
const UPDATE_TOKEN: &str = "Update token";
const REMOVE_REPOSITORY: &str = "Remove repository";
const BACK: &str = "Back";

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  pkgdeploy [options]\n  pkgdeploy [options] <pkgdeploy-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = "PKGDEPLOY_CONFIG", value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };
        let mut session = Session::open(ConfigStore::new(path));
        let mut prompter = InquirePrompter;

        match self.command {
            None => run_menu(&mut session, &mut prompter).await,
            Some(Command::Add(opts)) => run_add(&mut session, &mut prompter, opts),
            Some(Command::Publish(opts)) => run_publish(&mut session, &mut prompter, opts).await,
            Some(Command::List) => run_list(&session),
            Some(Command::Token(opts)) => run_token(&mut session, &mut prompter, opts),
            Some(Command::Remove(opts)) => run_remove(&mut session, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Register repository to publish from.
    #[command(override_usage = "pkgdeploy add [options] <owner/name>")]
    Add(AddOptions),

    /// Build project of repository and publish it to its publish folder.
    #[command(override_usage = "pkgdeploy publish [options] [<owner/name>]")]
    Publish(PublishOptions),

    /// List registered repositories, branches, and projects.
    #[command(override_usage = "pkgdeploy list [options]")]
    List,

    /// Replace access token of registered repository.
    #[command(override_usage = "pkgdeploy token [options] <owner/name>")]
    Token(TokenOptions),

    /// Forget registered repositories.
    #[command(override_usage = "pkgdeploy remove [options] <owner/name>...")]
    Remove(RemoveOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Repository to register.
    #[arg(required = true, value_name = "owner/name")]
    pub repository: String,

    /// Access token, prompted for when omitted.
    #[arg(short, long, value_name = "token")]
    pub token: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PublishOptions {
    /// Repository to publish from, selected interactively when omitted.
    #[arg(value_name = "owner/name")]
    pub repository: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TokenOptions {
    /// Repository to replace access token of.
    #[arg(required = true, value_name = "owner/name")]
    pub repository: String,

    /// New access token, prompted for when omitted.
    #[arg(short, long, value_name = "token")]
    pub token: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Repositories to forget.
    #[arg(required = true, value_name = "owner/name")]
    pub repositories: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn run_menu(session: &mut Session, prompter: &mut InquirePrompter) -> Result<()> {
    loop {
        let mut options = session
            .config()
            .repositories_by_recent_use()
            .into_iter()
            .map(|repository| repository.name.clone())
            .collect::<Vec<_>>();
        options.extend([ADD_REPOSITORY, MANAGE_REPOSITORY, EXIT].map(String::from));

        let choice = prompter.select("What would you like to do?", options)?;
        let result = match choice.as_str() {
            EXIT => return Ok(()),
            ADD_REPOSITORY => add_interactive(session, prompter),
            MANAGE_REPOSITORY => manage_interactive(session, prompter),
            name => publish(session, prompter, name).await,
        };

        // INVARIANT: A failed session never ends the menu.
        if let Err(error) = result {
            error!("{error:?}");
        }
    }
}

fn add_interactive(session: &mut Session, prompter: &mut InquirePrompter) -> Result<()> {
    let repository = prompter.text("Repository (owner/name):")?;
    let token = prompter.secret("Access token:")?;
    session.register_repository(repository.as_str(), token)?;
    Ok(())
}

fn manage_interactive(session: &mut Session, prompter: &mut InquirePrompter) -> Result<()> {
    let mut options = session
        .config()
        .repositories_by_recent_use()
        .into_iter()
        .map(|repository| repository.name.clone())
        .collect::<Vec<_>>();
    if options.is_empty() {
        info!("no repositories registered yet");
        return Ok(());
    }
    options.push(BACK.into());

    let repository = prompter.select("Select repository to manage:", options)?;
    if repository == BACK {
        return Ok(());
    }

    let action = prompter.select(
        &format!("Manage {repository}:"),
        vec![UPDATE_TOKEN.into(), REMOVE_REPOSITORY.into(), BACK.into()],
    )?;
    match action.as_str() {
        UPDATE_TOKEN => {
            let token = prompter.secret("New access token:")?;
            session.update_token(repository.as_str(), token)?;
        }
        REMOVE_REPOSITORY => {
            if prompter.confirm(&format!("Remove {repository}?"), false)? {
                session.remove_repository(repository.as_str())?;
            }
        }
        _ => {}
    }

    Ok(())
}

async fn publish(session: &mut Session, prompter: &mut InquirePrompter, name: &str) -> Result<()> {
    let settings = &session.config().settings;
    let vcs = GitHubVcs::new(settings)?;
    let runner = CommandRunner::new(settings.build.program.as_str());
    let report = session
        .publish(name, &vcs, &runner, prompter)
        .await
        .with_context(|| format!("failed to publish from {name}"))?;
    info!(
        "{} ({}): copied {} files into {:?}",
        report.key,
        report.action,
        report.files_copied,
        report.publish_folder.display()
    );
    Ok(())
}

fn run_add(session: &mut Session, prompter: &mut InquirePrompter, opts: AddOptions) -> Result<()> {
    let token = match opts.token {
        Some(token) => token,
        None => prompter.secret("Access token:")?,
    };
    session.register_repository(opts.repository.as_str(), token)?;
    Ok(())
}

async fn run_publish(
    session: &mut Session,
    prompter: &mut InquirePrompter,
    opts: PublishOptions,
) -> Result<()> {
    let name = match opts.repository {
        Some(name) => name,
        None => {
            let options = session
                .config()
                .repositories_by_recent_use()
                .into_iter()
                .map(|repository| repository.name.clone())
                .collect::<Vec<_>>();
            prompter.select("Select repository:", options)?
        }
    };
    publish(session, prompter, name.as_str()).await
}

fn run_list(session: &Session) -> Result<()> {
    let listing = session.describe();
    if listing.is_empty() {
        info!("no repositories registered yet");
    } else {
        print!("{listing}");
    }
    Ok(())
}

fn run_token(session: &mut Session, prompter: &mut InquirePrompter, opts: TokenOptions) -> Result<()> {
    let token = match opts.token {
        Some(token) => token,
        None => prompter.secret("New access token:")?,
    };
    session.update_token(opts.repository.as_str(), token)?;
    Ok(())
}

fn run_remove(session: &mut Session, opts: RemoveOptions) -> Result<()> {
    for repository in opts.repositories {
        session.remove_repository(repository.as_str())?;
    }

    Ok(())
}
