//! Deduplicator: collapse near-duplicate findings within a file.
//!
//! The line-bucket signature (`line_number / line_tolerance`) is a genuine
//! asymmetry around bucket boundaries — lines 9 and 10 collide at
//! `line_tolerance=3` (bucket 3) but lines 8 and 9 do not (buckets 2 and 3).
//! This is preserved literally rather than "improved" to a sliding window.

use std::collections::{HashMap, HashSet};

use crate::types::{Category, Suggestion};

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub line_tolerance: u32,
    pub message_similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 3,
            message_similarity_threshold: 0.8,
        }
    }
}

/// Collapses near-duplicate suggestions within each file independently.
///
/// For each file: sort by line number, compute a signature per suggestion,
/// and keep only the first of each run of colliding signatures.
pub fn deduplicate(suggestions: Vec<Suggestion>, cfg: DedupConfig) -> Vec<Suggestion> {
    let mut by_file: HashMap<String, Vec<Suggestion>> = HashMap::new();
    let mut file_order: Vec<String> = Vec::new();
    for s in suggestions {
        if !by_file.contains_key(&s.file_path) {
            file_order.push(s.file_path.clone());
        }
        by_file.entry(s.file_path.clone()).or_default().push(s);
    }

    let mut out = Vec::new();
    for file in file_order {
        let mut group = by_file.remove(&file).unwrap();
        group.sort_by_key(|s| s.line_number);

        let mut kept: Vec<Suggestion> = Vec::new();
        let mut kept_sigs: Vec<(String, u32, HashSet<String>)> = Vec::new();

        'outer: for s in group {
            let bucket = s.line_number / cfg.line_tolerance.max(1);
            let normalized = normalize_message(&s.message);
            let words: HashSet<String> = normalized.split_whitespace().map(String::from).collect();

            for (cat, buck, prev_words) in &kept_sigs {
                if *cat == s.category.as_str() && *buck == bucket {
                    let sim = jaccard(prev_words, &words);
                    if sim >= cfg.message_similarity_threshold {
                        continue 'outer;
                    }
                }
            }

            kept_sigs.push((s.category.as_str().to_string(), bucket, words));
            kept.push(s);
        }

        out.extend(kept);
    }

    out
}

/// Lower-cases and collapses whitespace, truncating to 100 chars — matches
/// the signature's `normalized_message[:100]` slice.
fn normalize_message(message: &str) -> String {
    let collapsed = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    collapsed.chars().take(100).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Groups by `(file, exact line)`, keeping the suggestion with the minimum
/// `(severity_priority, category_priority, -confidence)` tuple per group.
pub fn deduplicate_by_priority(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
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
    for key in order {
        let mut group = groups.remove(&key).unwrap();
        group.sort_by(|a, b| {
            let a_key = (a.severity as u8, a.category.priority(), -(a.confidence));
            let b_key = (b.severity as u8, b.category.priority(), -(b.confidence));
            a_key
                .0
                .cmp(&b_key.0)
                .then_with(|| a_key.1.cmp(&b_key.1))
                .then_with(|| a_key.2.partial_cmp(&b_key.2).unwrap())
        });
        out.push(group.into_iter().next().unwrap());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn suggestion(file: &str, line: u32, msg: &str, cat: Category) -> Suggestion {
        Suggestion::new(file, line, msg, Severity::Suggestion, None, "style", 0.9, cat)
    }

    #[test]
    fn collapses_near_duplicates_within_tolerance() {
        let suggestions = vec![
            suggestion("a.py", 10, "line too long", Category::Style),
            suggestion("a.py", 12, "line too long", Category::Style),
        ];
        let out = deduplicate(suggestions, DedupConfig::default());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn bucket_boundary_asymmetry_is_preserved() {
        // lines 9, 10 -> bucket 3, 3 (collide); lines 8, 9 -> bucket 2, 3 (do not)
        let collide = vec![
            suggestion("a.py", 9, "trailing whitespace", Category::Style),
            suggestion("a.py", 10, "trailing whitespace", Category::Style),
        ];
        assert_eq!(deduplicate(collide, DedupConfig::default()).len(), 1);

        let no_collide = vec![
            suggestion("a.py", 8, "trailing whitespace", Category::Style),
            suggestion("a.py", 9, "trailing whitespace", Category::Style),
        ];
        assert_eq!(deduplicate(no_collide, DedupConfig::default()).len(), 2);
    }

    #[test]
    fn deduplicate_is_idempotent_and_never_grows() {
        let suggestions = vec![
            suggestion("a.py", 1, "a", Category::Style),
            suggestion("b.py", 5, "b", Category::Logic),
            suggestion("b.py", 6, "b", Category::Logic),
        ];
        let once = deduplicate(suggestions.clone(), DedupConfig::default());
        let twice = deduplicate(once.clone(), DedupConfig::default());
        assert_eq!(once.len(), twice.len());
        assert!(once.len() <= suggestions.len());
    }

    #[test]
    fn empty_stays_empty() {
        assert!(deduplicate(vec![], DedupConfig::default()).is_empty());
    }

    #[test]
    fn priority_dedup_keeps_most_severe_per_exact_line() {
        let suggestions = vec![
            suggestion("a.py", 1, "style issue", Category::Style),
            Suggestion::new(
                "a.py",
                1,
                "security issue",
                Severity::Error,
                None,
                "security",
                0.95,
                Category::Security,
            ),
        ];
        let out = deduplicate_by_priority(suggestions);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category, Category::Security);
    }
}
