//! LLM judge: validates, ranks, and resolves conflicts between findings.
//!
//! Every model call here is advisory — a judge failure never blocks a
//! review, it just falls back to the pre-judge ordering/selection. Grounded
//! on `original_source/src/llm/judge.py`'s `LLMJudge`.

use serde::Deserialize;
use serde_json::json;

use crate::errors::Error;
use crate::model_router::{self, ModelClient, ModelTier, RouteTask};
use crate::severity::sort_by_severity;
use crate::types::Suggestion;

const MAX_RANK_CANDIDATES: usize = 50;

/// Asks the model whether a single suggestion is worth surfacing. Any model
/// or parse failure fails open (`true`) — the judge only removes things it
/// is confident about.
pub async fn validate<C: ModelClient>(
    client: &C,
    map_err: impl Fn(&C::Error) -> Error,
    suggestion: &Suggestion,
) -> bool {
    let prompt = format!(
        "Suggestion to validate:\nfile: {}\nline: {}\nseverity: {}\ncategory: {}\nmessage: {}\n\n\
         Respond with JSON: {{\"valid\": true|false, \"reason\": \"...\"}}.",
        suggestion.file_path,
        suggestion.line_number,
        suggestion.severity.as_str(),
        suggestion.category.as_str(),
        suggestion.message,
    );

    #[derive(Deserialize)]
    struct ValidateResponse {
        valid: bool,
    }

    match model_router::route_json(client, ModelTier::HighQuality, &prompt, &map_err).await {
        Ok(value) => match serde_json::from_value::<ValidateResponse>(value) {
            Ok(resp) => resp.valid,
            Err(_) => true,
        },
        Err(_) => true,
    }
}

/// Ranks suggestions and returns the top `k`, asking the model to choose
/// indices among the first `MAX_RANK_CANDIDATES` (in original/input order)
/// and topping up from the remainder, in original order, if the model
/// selects fewer than `k`.
///
/// Falls back to a severity-sorted truncation if the model call or response
/// parsing fails; the success path never reorders the input.
pub async fn rank<C: ModelClient>(
    client: &C,
    map_err: impl Fn(&C::Error) -> Error,
    suggestions: Vec<Suggestion>,
    k: usize,
) -> Vec<Suggestion> {
    if suggestions.len() <= k {
        return suggestions;
    }

    let candidate_count = suggestions.len().min(MAX_RANK_CANDIDATES);
    let candidates = &suggestions[..candidate_count];
    let listing: Vec<serde_json::Value> = candidates
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "index": i,
                "file": s.file_path,
                "line": s.line_number,
                "severity": s.severity.as_str(),
                "category": s.category.as_str(),
                "message": s.message,
            })
        })
        .collect();

    let prompt = format!(
        "Given these {count} findings, select the {k} most important by index. \
         Respond with a JSON array of integer indices, most important first.\n\n{listing}",
        count = candidates.len(),
        k = k,
        listing = serde_json::to_string(&listing).unwrap_or_default(),
    );

    // Parse liberally: the model may respond with a bare JSON array of
    // indices, or an object wrapping them as `{"indices": [...]}`.
    let raw_indices = match model_router::route_json(client, ModelTier::Balanced, &prompt, &map_err).await {
        Ok(serde_json::Value::Array(values)) => Some(values),
        Ok(serde_json::Value::Object(mut obj)) => match obj.remove("indices") {
            Some(serde_json::Value::Array(values)) => Some(values),
            _ => None,
        },
        _ => None,
    };

    let selected_indices = match raw_indices {
        Some(values) => values
            .into_iter()
            .filter_map(|v| v.as_u64())
            .map(|v| v as usize)
            .filter(|i| *i < candidate_count)
            .collect::<Vec<_>>(),
        None => {
            let mut suggestions = suggestions;
            sort_by_severity(&mut suggestions);
            suggestions.truncate(k);
            return suggestions;
        }
    };

    let mut seen = std::collections::HashSet::new();
    let mut ranked: Vec<Suggestion> = Vec::with_capacity(k);
    for idx in selected_indices {
        if seen.insert(idx) && ranked.len() < k {
            ranked.push(suggestions[idx].clone());
        }
    }

    // Top up from the unselected remainder, in original order, if the model
    // picked fewer than k.
    if ranked.len() < k {
        for (idx, s) in suggestions.iter().enumerate() {
            if ranked.len() >= k {
                break;
            }
            if !seen.contains(&idx) {
                ranked.push(s.clone());
                seen.insert(idx);
            }
        }
    }

    ranked
}

/// Groups suggestions by exact `(file, line)`; singleton groups always pass
/// through untouched. Every suggestion belonging to a group of 2+ is
/// collected into one set and presented to the model in a single call,
/// which returns the indices to keep — a colliding group may keep more than
/// one finding if the model judges them each independently valid. Falls
/// back to keeping every conflicting suggestion on any model/parse failure.
pub async fn check_conflicts<C: ModelClient>(
    client: &C,
    map_err: impl Fn(&C::Error) -> Error,
    suggestions: Vec<Suggestion>,
) -> Vec<Suggestion> {
    use std::collections::HashMap;

    let mut groups: HashMap<(String, u32), Vec<Suggestion>> = HashMap::new();
    let mut order: Vec<(String, u32)> = Vec::new();
    for s in suggestions {
        let key = (s.file_path.clone(), s.line_number);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(s);
    }

    let mut out = Vec::new();
    let mut conflicting: Vec<Suggestion> = Vec::new();
    for key in order {
        let group = groups.remove(&key).unwrap();
        if group.len() == 1 {
            out.extend(group);
        } else {
            conflicting.extend(group);
        }
    }

    if conflicting.is_empty() {
        return out;
    }

    let listing: Vec<serde_json::Value> = conflicting
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "index": i,
                "file": s.file_path,
                "line": s.line_number,
                "analyzer": s.analyzer,
                "severity": s.severity.as_str(),
                "category": s.category.as_str(),
                "message": s.message,
            })
        })
        .collect();

    let prompt = format!(
        "These findings conflict with at least one other finding at the same file and line. \
         Return a JSON array of the indices to keep; a conflicting group may keep more than \
         one index if each finding is independently valid.\n\n{}",
        serde_json::to_string(&listing).unwrap_or_default(),
    );

    // Parse liberally: the model may respond with a bare JSON array of
    // indices, or an object wrapping them as `{"indices": [...]}`.
    let raw_indices = match model_router::route_json(client, ModelTier::HighQuality, &prompt, &map_err).await {
        Ok(serde_json::Value::Array(values)) => Some(values),
        Ok(serde_json::Value::Object(mut obj)) => match obj.remove("indices") {
            Some(serde_json::Value::Array(values)) => Some(values),
            _ => None,
        },
        _ => None,
    };

    match raw_indices {
        Some(values) => {
            let keep: std::collections::HashSet<usize> = values
                .into_iter()
                .filter_map(|v| v.as_u64())
                .map(|v| v as usize)
                .filter(|i| *i < conflicting.len())
                .collect();
            for (i, s) in conflicting.into_iter().enumerate() {
                if keep.contains(&i) {
                    out.push(s);
                }
            }
        }
        None => out.extend(conflicting),
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Severity};

    struct ScriptedClient {
        response: String,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("scripted client error")]
    struct ScriptedError;

    impl ModelClient for ScriptedClient {
        type Error = ScriptedError;

        async fn complete(&self, _tier: ModelTier, _prompt: &str) -> Result<String, Self::Error> {
            Ok(self.response.clone())
        }
    }

    struct FailingClient;

    impl ModelClient for FailingClient {
        type Error = ScriptedError;

        async fn complete(&self, _tier: ModelTier, _prompt: &str) -> Result<String, Self::Error> {
            Err(ScriptedError)
        }
    }

    fn map_err(_: &ScriptedError) -> Error {
        Error::Other("scripted".to_string())
    }

    fn suggestion(file: &str, line: u32, sev: Severity) -> Suggestion {
        Suggestion::new(file, line, "msg", sev, None, "analyzer", 0.8, Category::Style)
    }

    #[tokio::test]
    async fn validate_fails_open_when_model_errors() {
        let client = FailingClient;
        let s = suggestion("a.py", 1, Severity::Warning);
        assert!(validate(&client, map_err, &s).await);
    }

    #[tokio::test]
    async fn validate_respects_model_verdict() {
        let client = ScriptedClient {
            response: r#"{"valid": false, "reason": "not applicable"}"#.to_string(),
        };
        let s = suggestion("a.py", 1, Severity::Warning);
        assert!(!validate(&client, map_err, &s).await);
    }

    #[tokio::test]
    async fn rank_falls_back_to_severity_truncation_on_model_failure() {
        let client = FailingClient;
        let suggestions = vec![
            suggestion("a.py", 1, Severity::Note),
            suggestion("a.py", 2, Severity::Error),
            suggestion("a.py", 3, Severity::Warning),
        ];
        let ranked = rank(&client, map_err, suggestions, 2).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn rank_is_a_no_op_when_under_k() {
        let client = FailingClient;
        let suggestions = vec![suggestion("a.py", 1, Severity::Note)];
        let ranked = rank(&client, map_err, suggestions, 5).await;
        assert_eq!(ranked.len(), 1);
    }

    #[tokio::test]
    async fn check_conflicts_keeps_singletons_untouched() {
        let client = FailingClient;
        let suggestions = vec![
            suggestion("a.py", 1, Severity::Warning),
            suggestion("b.py", 2, Severity::Note),
        ];
        let out = check_conflicts(&client, map_err, suggestions).await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn check_conflicts_keeps_only_model_selected_indices() {
        let client = ScriptedClient {
            response: r#"[1]"#.to_string(),
        };
        let suggestions = vec![
            suggestion("a.py", 1, Severity::Note),
            suggestion("a.py", 1, Severity::Error),
        ];
        let out = check_conflicts(&client, map_err, suggestions).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn check_conflicts_can_keep_more_than_one_per_colliding_group() {
        let client = ScriptedClient {
            response: r#"{"indices": [0, 1]}"#.to_string(),
        };
        let suggestions = vec![
            suggestion("a.py", 1, Severity::Note),
            suggestion("a.py", 1, Severity::Error),
        ];
        let out = check_conflicts(&client, map_err, suggestions).await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn check_conflicts_keeps_all_on_model_failure() {
        let client = FailingClient;
        let suggestions = vec![
            suggestion("a.py", 1, Severity::Note),
            suggestion("a.py", 1, Severity::Error),
        ];
        let out = check_conflicts(&client, map_err, suggestions).await;
        assert_eq!(out.len(), 2);
    }
}
