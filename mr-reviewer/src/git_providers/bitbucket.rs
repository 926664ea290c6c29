//! Bitbucket Cloud provider (REST 2.0) for PR metadata/commits/diffs and
//! review comments.
//!
//! Endpoints used:
//! - GET  /2.0/repositories/{workspace}/{repo_slug}/pullrequests/{id}
//! - GET  /2.0/repositories/{workspace}/{repo_slug}/pullrequests/{id}/commits
//! - GET  /2.0/repositories/{workspace}/{repo_slug}/pullrequests/{id}/diff   (plain-text unified diff)
//! - GET  /2.0/repositories/{workspace}/{repo_slug}/src/{ref}/{path}
//! - POST /2.0/repositories/{workspace}/{repo_slug}/pullrequests/{id}/comments

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MrResult;
use crate::git_providers::ProviderKind;
use crate::git_providers::types::*;
use crate::parser::{looks_like_binary_patch, parse_unified_diff_advanced};

#[derive(Debug, Clone)]
pub struct BitbucketClient {
    http: Client,
    base_api: String, // "https://api.bitbucket.org" (no trailing /2.0)
    token: String,    // app password / access token, sent as Bearer
}

fn split_workspace_repo(project: &str) -> MrResult<(&str, &str)> {
    project.split_once('/').ok_or_else(|| {
        crate::errors::Error::Validation(format!("invalid Bitbucket project id: {project}"))
    })
}

impl BitbucketClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api,
            token,
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub async fn get_meta(&self, id: &ChangeRequestId) -> MrResult<ChangeRequest> {
        let (workspace, repo) = split_workspace_repo(&id.project)?;
        let url = format!(
            "{}/2.0/repositories/{workspace}/{repo}/pullrequests/{}",
            self.base_api, id.iid
        );
        let resp: BitbucketPr = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let diff_refs = DiffRefs {
            base_sha: resp.destination.commit.hash.clone(),
            start_sha: None,
            head_sha: resp.source.commit.hash.clone(),
        };

        let author = AuthorInfo {
            id: resp.author.account_id.clone(),
            username: resp.author.nickname.clone(),
            name: Some(resp.author.display_name.clone()),
            web_url: resp.author.links.html.as_ref().map(|l| l.href.clone()),
            avatar_url: None,
        };

        Ok(ChangeRequest {
            provider: ProviderKind::Bitbucket,
            id: id.clone(),
            title: resp.title,
            description: Some(resp.description),
            author,
            state: resp.state,
            web_url: resp.links.html.map(|l| l.href).unwrap_or_else(|| {
                format!(
                    "{}/2.0/repositories/{workspace}/{repo}/pullrequests/{}",
                    self.base_api, id.iid
                )
            }),
            created_at: resp.created_on,
            updated_at: resp.updated_on,
            source_branch: Some(resp.source.branch.name),
            target_branch: Some(resp.destination.branch.name),
            diff_refs,
        })
    }

    pub async fn get_commits(&self, id: &ChangeRequestId) -> MrResult<Vec<CrCommit>> {
        let (workspace, repo) = split_workspace_repo(&id.project)?;
        let url = format!(
            "{}/2.0/repositories/{workspace}/{repo}/pullrequests/{}/commits",
            self.base_api, id.iid
        );
        let page: BitbucketPage<BitbucketCommit> = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(page
            .values
            .into_iter()
            .map(|c| CrCommit {
                id: c.hash,
                title: c.message.lines().next().unwrap_or("").to_string(),
                message: Some(c.message),
                author_name: c.author.user.as_ref().map(|u| u.display_name.clone()),
                authored_at: Some(c.date),
                web_url: c.links.html.map(|l| l.href),
            })
            .collect())
    }

    /// Fetches the combined unified diff for the whole PR and splits it into
    /// per-file chunks on `diff --git ` boundaries.
    pub async fn get_changeset(&self, id: &ChangeRequestId) -> MrResult<ChangeSet> {
        let (workspace, repo) = split_workspace_repo(&id.project)?;
        let url = format!(
            "{}/2.0/repositories/{workspace}/{repo}/pullrequests/{}/diff",
            self.base_api, id.iid
        );
        let raw = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut files = Vec::new();
        for part in raw.split("\ndiff --git ").filter(|p| !p.trim().is_empty()) {
            let old_path = part
                .lines()
                .find_map(|l| l.strip_prefix("--- a/"))
                .map(|s| s.to_string());
            let new_path = part
                .lines()
                .find_map(|l| l.strip_prefix("+++ b/"))
                .map(|s| s.to_string());
            let is_binary = looks_like_binary_patch(part);
            let hunks = if is_binary {
                Vec::new()
            } else {
                parse_unified_diff_advanced(part)
            };

            files.push(FileChange {
                is_new: old_path.is_none(),
                is_deleted: new_path.is_none(),
                is_renamed: false,
                old_path,
                new_path,
                is_binary,
                hunks,
                raw_unidiff: Some(part.to_string()),
            });
        }

        Ok(ChangeSet {
            files,
            is_truncated: false,
        })
    }

    /// Bitbucket's `/diff` endpoint already returns the full unified diff;
    /// there is no separate truncation-enrichment endpoint.
    pub async fn try_enrich_changeset(&self, _id: &ChangeRequestId) -> MrResult<Option<ChangeSet>> {
        Ok(None)
    }

    pub async fn get_file_raw(
        &self,
        id: &ChangeRequestId,
        repo_relative_path: &str,
        git_ref: &str,
    ) -> MrResult<Option<Vec<u8>>> {
        let (workspace, repo) = split_workspace_repo(&id.project)?;
        let url = format!(
            "{}/2.0/repositories/{workspace}/{repo}/src/{git_ref}/{repo_relative_path}",
            self.base_api
        );
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = resp.error_for_status()?.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }

    pub async fn post_comment(&self, id: &ChangeRequestId, body: &str) -> MrResult<()> {
        let (workspace, repo) = split_workspace_repo(&id.project)?;
        let url = format!(
            "{}/2.0/repositories/{workspace}/{repo}/pullrequests/{}/comments",
            self.base_api, id.iid
        );
        self.http
            .post(url)
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "content": { "raw": body } }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// --- Bitbucket response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct BitbucketPage<T> {
    values: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct BitbucketLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketLinks {
    html: Option<BitbucketLink>,
}

#[derive(Debug, Deserialize)]
struct BitbucketUser {
    account_id: String,
    nickname: Option<String>,
    display_name: String,
    links: BitbucketLinks,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranchRef {
    branch: BitbucketBranch,
    commit: BitbucketCommitRef,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommitRef {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketPr {
    title: String,
    #[serde(default)]
    description: String,
    state: String,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
    author: BitbucketUser,
    source: BitbucketBranchRef,
    destination: BitbucketBranchRef,
    links: BitbucketLinks,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommitAuthor {
    user: Option<BitbucketUser>,
}

#[derive(Debug, Deserialize)]
struct BitbucketCommit {
    hash: String,
    message: String,
    date: DateTime<Utc>,
    author: BitbucketCommitAuthor,
    links: BitbucketLinks,
}
