//! Severity classification and threshold filtering.
//!
//! Severity is totally ordered: `Error < Warning < Suggestion < Note` (lower
//! variant = more severe), matching the derived `Ord` on [`Severity`].

use std::collections::HashMap;

use crate::types::{Category, Severity, Suggestion};

/// Reclassifies a single suggestion's severity without mutating it in
/// place. Rules, applied in order:
/// 1. `category ∈ {security, logic}` and `confidence >= 0.9` → `Error`.
/// 2. incoming severity is `Error` and `confidence < 0.7` → `Warning`.
/// 3. else the incoming severity.
pub fn classify(s: &Suggestion) -> Severity {
    if matches!(s.category, Category::Security | Category::Logic) && s.confidence >= 0.9 {
        return Severity::Error;
    }
    if s.severity == Severity::Error && s.confidence < 0.7 {
        return Severity::Warning;
    }
    s.severity
}

/// Reclassifies every suggestion (writing the classified severity back into
/// `severity`), then keeps those whose classified priority is `<=` the
/// threshold's priority. An invalid threshold string defaults to
/// `Suggestion`, matching [`Severity::parse_or_default`].
pub fn filter_by_threshold(suggestions: Vec<Suggestion>, threshold: Severity) -> Vec<Suggestion> {
    suggestions
        .into_iter()
        .map(|mut s| {
            s.severity = classify(&s);
            s
        })
        .filter(|s| s.severity <= threshold)
        .collect()
}

/// Stable sort by `(classified severity asc, confidence desc, category asc)`.
///
/// Sorts in place and also writes the classified severity back, since the
/// spec defines sort order in terms of the classified value.
pub fn sort_by_severity(suggestions: &mut [Suggestion]) {
    for s in suggestions.iter_mut() {
        s.severity = classify(s);
    }
    suggestions.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap())
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
}

/// True iff any suggestion classifies as `Error`.
pub fn should_block_merge(suggestions: &[Suggestion]) -> bool {
    suggestions.iter().any(|s| classify(s) == Severity::Error)
}

/// Most severe classified severity; `Note` when the list is empty.
pub fn get_max_severity(suggestions: &[Suggestion]) -> Severity {
    suggestions
        .iter()
        .map(classify)
        .min()
        .unwrap_or(Severity::Note)
}

/// Per-severity counts and integer-rounded percentages (1 decimal place).
/// Returns `None` when the total is zero.
pub fn get_severity_stats(suggestions: &[Suggestion]) -> Option<HashMap<String, SeverityStat>> {
    let total = suggestions.len();
    if total == 0 {
        return None;
    }

    let mut counts: HashMap<Severity, u32> = HashMap::new();
    for s in suggestions {
        *counts.entry(classify(s)).or_insert(0) += 1;
    }

    let mut out = HashMap::new();
    for sev in [
        Severity::Error,
        Severity::Warning,
        Severity::Suggestion,
        Severity::Note,
    ] {
        let count = *counts.get(&sev).unwrap_or(&0);
        let percentage = (count as f64 * 1000.0 / total as f64).round() / 10.0;
        out.insert(
            sev.as_str().to_string(),
            SeverityStat { count, percentage },
        );
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityStat {
    pub count: u32,
    pub percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity as Sev;

    fn s(cat: Category, sev: Sev, conf: f32) -> Suggestion {
        Suggestion::new("a.py", 1, "msg", sev, None, "test", conf, cat)
    }

    #[test]
    fn security_high_confidence_promotes_to_error() {
        let sug = s(Category::Security, Sev::Suggestion, 0.9);
        assert_eq!(classify(&sug), Sev::Error);
    }

    #[test]
    fn security_just_under_threshold_does_not_promote() {
        let sug = s(Category::Security, Sev::Suggestion, 0.89);
        assert_eq!(classify(&sug), Sev::Suggestion);
    }

    #[test]
    fn low_confidence_error_downgrades_to_warning() {
        let sug = s(Category::Style, Sev::Error, 0.5);
        assert_eq!(classify(&sug), Sev::Warning);
    }

    #[test]
    fn filter_by_threshold_is_idempotent() {
        let suggestions = vec![
            s(Category::Security, Sev::Suggestion, 0.95),
            s(Category::Style, Sev::Note, 1.0),
            s(Category::Logic, Sev::Warning, 0.4),
        ];
        let once = filter_by_threshold(suggestions.clone(), Sev::Warning);
        let twice = filter_by_threshold(once.clone(), Sev::Warning);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.severity, b.severity);
        }
    }

    #[test]
    fn filter_by_threshold_is_monotone() {
        let suggestions = vec![
            s(Category::Style, Sev::Warning, 0.5),
            s(Category::Style, Sev::Note, 0.5),
        ];
        let strict = filter_by_threshold(suggestions.clone(), Sev::Warning);
        let loose = filter_by_threshold(suggestions, Sev::Note);
        assert!(loose.len() >= strict.len());
    }

    #[test]
    fn empty_list_has_no_stats() {
        assert!(get_severity_stats(&[]).is_none());
    }

    #[test]
    fn max_severity_of_empty_is_note() {
        assert_eq!(get_max_severity(&[]), Sev::Note);
    }
}
