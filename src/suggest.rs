//! Near-miss hints for required rules that matched nothing.
//!
//! A required literal rule usually misses because the target drifted
//! slightly (renamed variable, retabbed line, changed quotes). Pointing
//! at the closest surviving line saves the rule author a manual diff.

use crate::pipeline::{PatchResult, RuleStatus};
use crate::rule::{Matcher, PatchRule};
use serde::Serialize;
use std::fmt;

/// Minimum similarity before a line is worth suggesting.
const MIN_SIMILARITY: f64 = 0.6;

/// The line most similar to what a missed rule was looking for.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchHint {
    pub rule_id: String,
    /// 1-based line number in the unpatched content
    pub line: usize,
    /// Similarity in [0, 1]
    pub similarity: f64,
    pub text: String,
}

impl fmt::Display for MatchHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule '{}': line {} is {:.0}% similar: {:?}",
            self.rule_id,
            self.line,
            self.similarity * 100.0,
            self.text
        )
    }
}

/// Scan `content` for the line closest to what each missed required
/// rule was searching for.
///
/// `rules` and `results` must be the parallel slices a pipeline run
/// produces. Only literal matchers yield hints; a regex has no single
/// expected text to compare against. Multi-line matchers are compared
/// by their first non-empty line.
pub fn collect_hints(
    rules: &[PatchRule],
    results: &[PatchResult],
    content: &str,
) -> Vec<MatchHint> {
    rules
        .iter()
        .zip(results)
        .filter(|(_, result)| matches!(result.status, RuleStatus::MissingRequiredMatch))
        .filter_map(|(rule, _)| match &rule.matcher {
            Matcher::Literal { search } => nearest_line(&rule.id, search, content),
            Matcher::Pattern { .. } => None,
        })
        .collect()
}

fn nearest_line(rule_id: &str, search: &str, content: &str) -> Option<MatchHint> {
    let needle = search.lines().find(|line| !line.trim().is_empty())?;

    let mut best: Option<MatchHint> = None;
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let similarity = strsim::normalized_levenshtein(needle, line);
        if similarity < MIN_SIMILARITY {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |hint| similarity > hint.similarity)
        {
            best = Some(MatchHint {
                rule_id: rule_id.to_string(),
                line: idx + 1,
                similarity,
                text: line.to_string(),
            });
        }
    }
    best
}
