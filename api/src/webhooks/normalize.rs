//! Normalizes each provider's webhook payload into the canonical `PrEvent`
//! (SPEC_FULL.md §3, §4.9 step 2).
//!
//! The exact GitHub/GitLab/Bitbucket webhook schemas are treated as a thin
//! wrapper the way SPEC_FULL.md's §1 scopes "HTTP webhook parsing" — we pull
//! out only the fields `PrEvent` needs via `serde_json::Value`, rather than
//! modeling each provider's full payload as a typed struct (that modeling
//! already lives, for the REST *response* shapes, in
//! `mr-reviewer::git_providers::types`).
//!
//! Returns `None` for payloads that don't represent a reviewable PR/MR
//! action (e.g. a GitLab `note` event, a GitHub `closed` that isn't a
//! merge-intent close followed by synchronize, or an unrecognized
//! Bitbucket event key) — the route maps that to HTTP 200 "ignored".

use review_core::types::{PrAction, PrEvent, ProviderTag};
use serde_json::Value;

fn split_repo_slug(slug: &str) -> (String, String) {
    match slug.rsplit_once('/') {
        Some((owner, name)) => (owner.to_string(), name.to_string()),
        None => (String::new(), slug.to_string()),
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn normalize_github(body: &Value) -> Option<PrEvent> {
    let action_raw = str_field(body, "action")?;
    let pr = body.get("pull_request")?;
    let merged = pr.get("merged").and_then(Value::as_bool).unwrap_or(false);

    let action = match action_raw.as_str() {
        "opened" => PrAction::Opened,
        "synchronize" => PrAction::Synchronize,
        "reopened" => PrAction::Reopened,
        "edited" => PrAction::Edited,
        "closed" if merged => PrAction::Merged,
        "closed" => PrAction::Closed,
        _ => return None,
    };

    let repo = body.get("repository")?;
    let repo_owner = repo.get("owner").and_then(|o| str_field(o, "login"))?;
    let repo_name = str_field(repo, "name")?;

    Some(PrEvent {
        provider: ProviderTag::Github,
        repo_owner,
        repo_name,
        pr_number: pr.get("number")?.as_u64()?,
        action,
        source_branch: pr.get("head").and_then(|h| str_field(h, "ref"))?,
        target_branch: pr.get("base").and_then(|b| str_field(b, "ref"))?,
        commit_sha: pr.get("head").and_then(|h| str_field(h, "sha"))?,
        title: str_field(pr, "title").unwrap_or_default(),
        body: str_field(pr, "body"),
        author: pr.get("user").and_then(|u| str_field(u, "login")).unwrap_or_default(),
        url: str_field(pr, "html_url"),
        raw_payload: body.clone(),
    })
}

pub fn normalize_gitlab(body: &Value) -> Option<PrEvent> {
    if str_field(body, "object_kind").as_deref() != Some("merge_request") {
        return None;
    }
    let attrs = body.get("object_attributes")?;
    let action = match str_field(attrs, "action")?.as_str() {
        "open" => PrAction::Opened,
        "update" => PrAction::Synchronize,
        "reopen" => PrAction::Reopened,
        "close" => PrAction::Closed,
        "merge" => PrAction::Merged,
        _ => return None,
    };

    let project = body.get("project")?;
    let (repo_owner, repo_name) = split_repo_slug(&str_field(project, "path_with_namespace")?);

    Some(PrEvent {
        provider: ProviderTag::Gitlab,
        repo_owner,
        repo_name,
        pr_number: attrs.get("iid")?.as_u64()?,
        action,
        source_branch: str_field(attrs, "source_branch")?,
        target_branch: str_field(attrs, "target_branch")?,
        commit_sha: attrs.get("last_commit").and_then(|c| str_field(c, "id")).unwrap_or_default(),
        title: str_field(attrs, "title").unwrap_or_default(),
        body: str_field(attrs, "description"),
        author: body.get("user").and_then(|u| str_field(u, "username")).unwrap_or_default(),
        url: str_field(attrs, "url"),
        raw_payload: body.clone(),
    })
}

pub fn normalize_bitbucket(event_key: &str, body: &Value) -> Option<PrEvent> {
    let action = match event_key {
        "pullrequest:created" => PrAction::Opened,
        "pullrequest:updated" => PrAction::Synchronize,
        "pullrequest:fulfilled" => PrAction::Merged,
        "pullrequest:rejected" => PrAction::Closed,
        _ => return None,
    };

    let pr = body.get("pullrequest")?;
    let repo = body.get("repository")?;
    let (repo_owner, repo_name) = split_repo_slug(&str_field(repo, "full_name")?);

    let source = pr.get("source")?;
    let destination = pr.get("destination")?;

    Some(PrEvent {
        provider: ProviderTag::Bitbucket,
        repo_owner,
        repo_name,
        pr_number: pr.get("id")?.as_u64()?,
        action,
        source_branch: source.get("branch").and_then(|b| str_field(b, "name"))?,
        target_branch: destination.get("branch").and_then(|b| str_field(b, "name"))?,
        commit_sha: source.get("commit").and_then(|c| str_field(c, "hash")).unwrap_or_default(),
        title: str_field(pr, "title").unwrap_or_default(),
        body: str_field(pr, "description"),
        author: pr
            .get("author")
            .and_then(|a| str_field(a, "username").or_else(|| str_field(a, "display_name")))
            .unwrap_or_default(),
        url: pr
            .get("links")
            .and_then(|l| l.get("html"))
            .and_then(|h| str_field(h, "href")),
        raw_payload: body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn github_opened_normalizes() {
        let body = json!({
            "action": "opened",
            "pull_request": {
                "number": 7, "title": "t", "body": "b",
                "head": {"ref": "feature", "sha": "abc"},
                "base": {"ref": "main"},
                "user": {"login": "dev"},
                "html_url": "https://github.com/acme/widgets/pull/7",
                "merged": false
            },
            "repository": {"owner": {"login": "acme"}, "name": "widgets"}
        });
        let event = normalize_github(&body).unwrap();
        assert_eq!(event.action, PrAction::Opened);
        assert_eq!(event.repo_slug(), "acme/widgets");
        assert_eq!(event.pr_number, 7);
    }

    #[test]
    fn github_closed_without_merge_is_closed_not_merged() {
        let body = json!({
            "action": "closed",
            "pull_request": {
                "number": 1, "title": "t", "body": null,
                "head": {"ref": "f", "sha": "a"}, "base": {"ref": "main"},
                "user": {"login": "d"}, "html_url": null, "merged": false
            },
            "repository": {"owner": {"login": "a"}, "name": "b"}
        });
        assert_eq!(normalize_github(&body).unwrap().action, PrAction::Closed);
    }

    #[test]
    fn github_closed_with_merge_is_merged() {
        let body = json!({
            "action": "closed",
            "pull_request": {
                "number": 1, "title": "t", "body": null,
                "head": {"ref": "f", "sha": "a"}, "base": {"ref": "main"},
                "user": {"login": "d"}, "html_url": null, "merged": true
            },
            "repository": {"owner": {"login": "a"}, "name": "b"}
        });
        assert_eq!(normalize_github(&body).unwrap().action, PrAction::Merged);
    }

    #[test]
    fn github_unknown_action_is_ignored() {
        let body = json!({
            "action": "labeled",
            "pull_request": {
                "number": 1, "head": {"ref": "f", "sha": "a"}, "base": {"ref": "main"},
                "user": {"login": "d"}, "merged": false
            },
            "repository": {"owner": {"login": "a"}, "name": "b"}
        });
        assert!(normalize_github(&body).is_none());
    }

    #[test]
    fn gitlab_update_maps_to_synchronize() {
        let body = json!({
            "object_kind": "merge_request",
            "object_attributes": {
                "iid": 3, "action": "update", "source_branch": "f", "target_branch": "main",
                "last_commit": {"id": "sha1"}, "title": "t", "description": "d", "url": "u"
            },
            "project": {"path_with_namespace": "group/proj"},
            "user": {"username": "u"}
        });
        let event = normalize_gitlab(&body).unwrap();
        assert_eq!(event.action, PrAction::Synchronize);
        assert_eq!(event.repo_owner, "group");
        assert_eq!(event.repo_name, "proj");
    }

    #[test]
    fn gitlab_non_merge_request_event_is_ignored() {
        let body = json!({"object_kind": "note"});
        assert!(normalize_gitlab(&body).is_none());
    }

    #[test]
    fn bitbucket_created_maps_to_opened() {
        let body = json!({
            "pullrequest": {
                "id": 9, "title": "t", "description": "d",
                "source": {"branch": {"name": "f"}, "commit": {"hash": "h"}},
                "destination": {"branch": {"name": "main"}},
                "author": {"username": "u"},
                "links": {"html": {"href": "https://bitbucket.org/x"}}
            },
            "repository": {"full_name": "workspace/repo"}
        });
        let event = normalize_bitbucket("pullrequest:created", &body).unwrap();
        assert_eq!(event.action, PrAction::Opened);
        assert_eq!(event.repo_slug(), "workspace/repo");
    }

    #[test]
    fn bitbucket_unknown_event_key_is_ignored() {
        let body = json!({"pullrequest": {}, "repository": {"full_name": "a/b"}});
        assert!(normalize_bitbucket("pullrequest:comment_created", &body).is_none());
    }
}
