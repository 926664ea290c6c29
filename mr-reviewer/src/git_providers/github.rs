//! GitHub provider (REST v3) for PR metadata/commits/diffs and review
//! comments.
//!
//! Endpoints used:
//! - GET  /repos/{owner}/{repo}/pulls/{number}
//! - GET  /repos/{owner}/{repo}/pulls/{number}/commits
//! - GET  /repos/{owner}/{repo}/pulls/{number}/files  (`patch` is a per-file unified diff)
//! - GET  /repos/{owner}/{repo}/contents/{path}?ref=   (AGENTS.md / raw file bytes)
//! - POST /repos/{owner}/{repo}/issues/{number}/comments

use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MrResult;
use crate::git_providers::ProviderKind;
use crate::git_providers::types::*;
use crate::parser::{looks_like_binary_patch, parse_unified_diff_advanced};

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // "https://api.github.com"
    token: String,    // PAT, sent as "Bearer <token>"
}

/// Splits `ChangeRequestId::project` ("owner/repo") into its two halves.
fn split_owner_repo(project: &str) -> MrResult<(&str, &str)> {
    project
        .split_once('/')
        .ok_or_else(|| crate::errors::Error::Validation(format!("invalid GitHub project id: {project}")))
}

impl GitHubClient {
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
        let (owner, repo) = split_owner_repo(&id.project)?;
        let url = format!("{}/repos/{owner}/{repo}/pulls/{}", self.base_api, id.iid);
        let resp: GitHubPr = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let diff_refs = DiffRefs {
            base_sha: resp.base.sha,
            start_sha: None,
            head_sha: resp.head.sha,
        };

        let author = AuthorInfo {
            id: resp.user.id.to_string(),
            username: Some(resp.user.login.clone()),
            name: Some(resp.user.login),
            web_url: resp.user.html_url,
            avatar_url: resp.user.avatar_url,
        };

        Ok(ChangeRequest {
            provider: ProviderKind::GitHub,
            id: id.clone(),
            title: resp.title,
            description: resp.body,
            author,
            state: resp.state,
            web_url: resp.html_url,
            created_at: resp.created_at,
            updated_at: resp.updated_at,
            source_branch: Some(resp.head.r#ref),
            target_branch: Some(resp.base.r#ref),
            diff_refs,
        })
    }

    pub async fn get_commits(&self, id: &ChangeRequestId) -> MrResult<Vec<CrCommit>> {
        let (owner, repo) = split_owner_repo(&id.project)?;
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls/{}/commits",
            self.base_api, id.iid
        );
        let raw: Vec<GitHubCommit> = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(raw
            .into_iter()
            .map(|c| CrCommit {
                id: c.sha,
                title: c.commit.message.lines().next().unwrap_or("").to_string(),
                message: Some(c.commit.message),
                author_name: c.commit.author.as_ref().map(|a| a.name.clone()),
                authored_at: c.commit.author.and_then(|a| a.date),
                web_url: c.html_url,
            })
            .collect())
    }

    /// Fetches the file list via `/pulls/{number}/files`, where each entry's
    /// `patch` field is already a per-file unified diff (GitHub never returns
    /// a single combined diff the way GitLab/Bitbucket do).
    pub async fn get_changeset(&self, id: &ChangeRequestId) -> MrResult<ChangeSet> {
        let (owner, repo) = split_owner_repo(&id.project)?;
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls/{}/files?per_page=100",
            self.base_api, id.iid
        );
        let files: Vec<GitHubFile> = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut changes = Vec::with_capacity(files.len());
        for f in files {
            let is_binary = f.patch.is_none() || f.patch.as_deref().is_some_and(looks_like_binary_patch);
            let hunks = match &f.patch {
                Some(p) if !is_binary => parse_unified_diff_advanced(p),
                _ => Vec::new(),
            };

            changes.push(FileChange {
                old_path: f.previous_filename.clone().or_else(|| Some(f.filename.clone())),
                new_path: Some(f.filename),
                is_new: f.status == "added",
                is_deleted: f.status == "removed",
                is_renamed: f.status == "renamed",
                is_binary,
                hunks,
                raw_unidiff: f.patch,
            });
        }

        let is_truncated = changes.iter().any(|f| f.raw_unidiff.is_none() && !f.is_binary);
        Ok(ChangeSet {
            files: changes,
            is_truncated,
        })
    }

    /// GitHub's `/files` response already has per-file patches; there is no
    /// separate truncated-diff enrichment endpoint.
    pub async fn try_enrich_changeset(&self, _id: &ChangeRequestId) -> MrResult<Option<ChangeSet>> {
        Ok(None)
    }

    /// Fetches raw file bytes at `git_ref` via the contents API.
    ///
    /// Returns `Ok(None)` for a 404 (file doesn't exist at that ref).
    pub async fn get_file_raw(
        &self,
        id: &ChangeRequestId,
        repo_relative_path: &str,
        git_ref: &str,
    ) -> MrResult<Option<Vec<u8>>> {
        let (owner, repo) = split_owner_repo(&id.project)?;
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{repo_relative_path}?ref={git_ref}",
            self.base_api
        );
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let content: GitHubContent = resp.error_for_status()?.json().await?;
        if content.encoding != "base64" {
            return Ok(Some(content.content.into_bytes()));
        }
        let cleaned: String = content.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| crate::errors::Error::Other(format!("bad base64 from GitHub contents API: {e}")))?;
        Ok(Some(bytes))
    }

    /// Posts a single issue-style comment on the PR (GitHub represents PRs
    /// as issues for the general comment thread).
    pub async fn post_comment(&self, id: &ChangeRequestId, body: &str) -> MrResult<()> {
        let (owner, repo) = split_owner_repo(&id.project)?;
        let url = format!(
            "{}/repos/{owner}/{repo}/issues/{}/comments",
            self.base_api, id.iid
        );
        self.http
            .post(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// --- GitHub response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GitHubPr {
    title: String,
    body: Option<String>,
    html_url: String,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user: GitHubUser,
    head: GitHubRef,
    base: GitHubRef,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    r#ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    html_url: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
    html_url: Option<String>,
    commit: GitHubCommitDetail,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    message: String,
    author: Option<GitHubCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitAuthor {
    name: String,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitHubFile {
    filename: String,
    #[serde(default)]
    previous_filename: Option<String>,
    status: String,
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubContent {
    content: String,
    encoding: String,
}
