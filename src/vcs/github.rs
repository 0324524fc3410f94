// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub remote host.
//!
//! Lists branches and commits of a repository through the GitHub REST API.
//! Requests carry the repository's token as a bearer token when one is
//! stored. Branch listings are paginated until exhausted. Commit listings stop
//! once the configured commit depth is reached, because the update check only
//! needs to know whether the newest remote commits are present locally.
//!
//! # See Also
//!
//! - [List branches](https://docs.github.com/en/rest/branches/branches#list-branches)
//! - [List commits](https://docs.github.com/en/rest/commits/commits#list-commits)

use crate::vcs::{RemoteHost, RepoRef, Result, VcsError};

use reqwest::{header::ACCEPT, Client};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, instrument};

const PER_PAGE: usize = 100;

/// Client for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    commit_depth: usize,
}

impl GitHubClient {
    /// Construct new GitHub client.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Http`] if HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, commit_depth: u32) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("pkgdeploy/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_client(http, api_url, commit_depth))
    }

    pub(crate) fn with_client(http: Client, api_url: impl Into<String>, commit_depth: u32) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            commit_depth: commit_depth.max(1) as usize,
        }
    }

    fn endpoint(&self, repo: &RepoRef, resource: &str) -> String {
        format!(
            "{}/repos/{}/{}/{resource}",
            self.api_url,
            repo.owner(),
            repo.name()
        )
    }

    async fn get_page<T>(&self, url: &str, token: &str, query: &[(&str, String)]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .query(query);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VcsError::Status {
                url: url.to_string(),
                status,
            });
        }

        Ok(response.json::<Vec<T>>().await?)
    }
}

impl RemoteHost for GitHubClient {
    #[instrument(skip(self, token), level = "debug")]
    async fn list_remote_branches(&self, repo: &RepoRef, token: &str) -> Result<Vec<String>> {
        let url = self.endpoint(repo, "branches");
        let mut names = Vec::new();

        for page in 1_usize.. {
            let listing: Vec<BranchListing> = self
                .get_page(
                    &url,
                    token,
                    &[("per_page", PER_PAGE.to_string()), ("page", page.to_string())],
                )
                .await?;
            let count = listing.len();
            names.extend(listing.into_iter().map(|branch| branch.name));

            // INVARIANT: A short page is the last page.
            if count < PER_PAGE {
                break;
            }
        }

        debug!("{repo} has {} remote branches", names.len());
        Ok(names)
    }

    #[instrument(skip(self, token), level = "debug")]
    async fn list_remote_commits(
        &self,
        repo: &RepoRef,
        token: &str,
        branch: &str,
    ) -> Result<Vec<String>> {
        let url = self.endpoint(repo, "commits");
        let per_page = self.commit_depth.min(PER_PAGE);
        let mut ids = Vec::new();

        for page in 1_usize.. {
            let listing: Vec<CommitListing> = self
                .get_page(
                    &url,
                    token,
                    &[
                        ("sha", branch.to_string()),
                        ("per_page", per_page.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let count = listing.len();
            ids.extend(listing.into_iter().map(|commit| commit.sha));

            if count < per_page || ids.len() >= self.commit_depth {
                break;
            }
        }

        ids.truncate(self.commit_depth);
        debug!("{repo}@{branch} lists {} remote commits", ids.len());
        Ok(ids)
    }
}

#[derive(Debug, Deserialize)]
struct BranchListing {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CommitListing {
    sha: String,
}
