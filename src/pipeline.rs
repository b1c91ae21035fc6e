//! The patch pipeline: an ordered list of rules applied to one text buffer.
//!
//! Rules run strictly in declared order and each sees the buffer the
//! previous rule produced. A rule that matches nothing leaves the buffer
//! exactly as it found it; the pipeline never aborts early, so the report
//! always carries one result per rule.

use crate::cache;
use crate::rule::{Matcher, Occurrences, PatchRule};
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Classification of one rule's application.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleStatus {
    /// Matches were found and replaced
    Replaced,
    /// No matches and none were demanded; nothing happened
    NoMatch,
    /// A required rule matched nothing
    MissingRequiredMatch,
    /// The match count differed from the declared expectation
    AmbiguousMatch {
        expected: usize,
        found: usize,
        /// Whether the replacement went through anyway
        applied: bool,
    },
    /// The matcher is unusable (empty, or the pattern failed to compile)
    InvalidMatcher { message: String },
}

/// Outcome of one rule against the buffer state it saw.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub struct PatchResult {
    pub rule_id: String,
    pub required: bool,
    /// Matches counted before the replacement ran; zero when nothing
    /// was applied
    pub occurrences_replaced: usize,
    /// Whether the rule met its expectations
    pub succeeded: bool,
    pub status: RuleStatus,
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RuleStatus::Replaced => {
                write!(f, "replaced {} occurrence(s)", self.occurrences_replaced)
            }
            RuleStatus::NoMatch => write!(f, "no occurrences found"),
            RuleStatus::MissingRequiredMatch => write!(f, "required rule matched nothing"),
            RuleStatus::AmbiguousMatch {
                expected,
                found,
                applied,
            } => {
                let action = if *applied {
                    "applied anyway"
                } else {
                    "not applied"
                };
                write!(
                    f,
                    "found {} occurrence(s), expected {} ({})",
                    found, expected, action
                )
            }
            RuleStatus::InvalidMatcher { message } => write!(f, "invalid matcher: {}", message),
        }
    }
}

/// Full account of one pipeline run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[must_use = "PipelineReport should be checked before acting on the output"]
pub struct PipelineReport {
    /// One result per rule, in declared order
    pub results: Vec<PatchResult>,
    /// Buffer state after the last rule
    pub final_text: String,
    /// True iff every required rule succeeded (every rule, in strict mode)
    pub succeeded: bool,
}

impl PipelineReport {
    /// Results for rules that did not meet their expectations.
    pub fn failures(&self) -> impl Iterator<Item = &PatchResult> {
        self.results.iter().filter(|result| !result.succeeded)
    }
}

/// An ordered sequence of patch rules over a single text buffer.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    rules: Vec<PatchRule>,
    strict: bool,
}

impl Pipeline {
    pub fn new(rules: Vec<PatchRule>) -> Self {
        Self {
            rules,
            strict: false,
        }
    }

    /// Treat occurrence-count mismatches as rule failure instead of
    /// applying anyway and reporting the anomaly. Strict failures count
    /// against the report even on optional rules.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Run every rule in order against `source`.
    ///
    /// The source itself is never modified; callers decide what to do
    /// with `final_text` based on the report.
    pub fn apply(&self, source: &str) -> PipelineReport {
        let mut buffer = source.to_string();
        let mut results = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let (next, result) = apply_rule(buffer, rule, self.strict);
            buffer = next;
            results.push(result);
        }

        // Optional failures are tolerated in lenient mode only; strict
        // mode holds every rule to its expectation.
        let succeeded = results
            .iter()
            .all(|result| result.succeeded || (!result.required && !self.strict));

        PipelineReport {
            results,
            final_text: buffer,
            succeeded,
        }
    }
}

/// A matcher readied against a specific buffer generation.
enum CompiledMatcher<'a> {
    Literal(&'a str),
    Pattern(Regex),
}

impl CompiledMatcher<'_> {
    fn count(&self, buffer: &str) -> usize {
        match self {
            CompiledMatcher::Literal(search) => buffer.match_indices(*search).count(),
            CompiledMatcher::Pattern(re) => re.find_iter(buffer).count(),
        }
    }

    fn replace_all(&self, buffer: &str, replacement: &str) -> String {
        match self {
            CompiledMatcher::Literal(search) => buffer.replace(*search, replacement),
            CompiledMatcher::Pattern(re) => re.replace_all(buffer, replacement).into_owned(),
        }
    }
}

fn compile(matcher: &Matcher) -> Result<CompiledMatcher<'_>, String> {
    match matcher {
        Matcher::Literal { search } => {
            if search.is_empty() {
                return Err("literal matcher is empty".to_string());
            }
            Ok(CompiledMatcher::Literal(search))
        }
        Matcher::Pattern { pattern } => {
            if pattern.is_empty() {
                return Err("pattern matcher is empty".to_string());
            }
            let re = cache::get_or_compile(pattern).map_err(|e| e.to_string())?;
            Ok(CompiledMatcher::Pattern(re))
        }
    }
}

/// Apply one rule, consuming the buffer and returning its next state
/// alongside the rule's result.
///
/// Matches are counted against the buffer as the rule first sees it,
/// so a replacement that would itself match never inflates the count.
fn apply_rule(buffer: String, rule: &PatchRule, strict: bool) -> (String, PatchResult) {
    let compiled = match compile(&rule.matcher) {
        Ok(compiled) => compiled,
        Err(message) => {
            let result = PatchResult {
                rule_id: rule.id.clone(),
                required: rule.required,
                occurrences_replaced: 0,
                succeeded: false,
                status: RuleStatus::InvalidMatcher { message },
            };
            return (buffer, result);
        }
    };

    let found = compiled.count(&buffer);

    if found == 0 {
        // A zero-expectation rule asserting absence has met its
        // expectation; any other rule is a miss, fatal only if required.
        let (status, succeeded) = if rule.required && rule.occurrences != Occurrences::Zero {
            (RuleStatus::MissingRequiredMatch, false)
        } else {
            (RuleStatus::NoMatch, true)
        };
        let result = PatchResult {
            rule_id: rule.id.clone(),
            required: rule.required,
            occurrences_replaced: 0,
            succeeded,
            status,
        };
        return (buffer, result);
    }

    if rule.occurrences.admits(found) {
        let next = compiled.replace_all(&buffer, &rule.replacement);
        let result = PatchResult {
            rule_id: rule.id.clone(),
            required: rule.required,
            occurrences_replaced: found,
            succeeded: true,
            status: RuleStatus::Replaced,
        };
        return (next, result);
    }

    let expected = rule
        .occurrences
        .expected()
        .expect("count mismatch implies a fixed expectation");

    if strict {
        let result = PatchResult {
            rule_id: rule.id.clone(),
            required: rule.required,
            occurrences_replaced: 0,
            succeeded: false,
            status: RuleStatus::AmbiguousMatch {
                expected,
                found,
                applied: false,
            },
        };
        (buffer, result)
    } else {
        let next = compiled.replace_all(&buffer, &rule.replacement);
        let result = PatchResult {
            rule_id: rule.id.clone(),
            required: rule.required,
            occurrences_replaced: found,
            succeeded: true,
            status: RuleStatus::AmbiguousMatch {
                expected,
                found,
                applied: true,
            },
        };
        (next, result)
    }
}
