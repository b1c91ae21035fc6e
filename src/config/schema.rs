use crate::cache;
use crate::rule::{Matcher, Occurrences, PatchRule};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// A TOML rule set: shared metadata plus the files it patches.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSet {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub files: Vec<FileTarget>,
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.files.is_empty() {
            issues.push(ValidationIssue::EmptyFileList);
        }

        for file in &self.files {
            if file.path.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: None,
                    field: "path",
                });
            }
            if file.rules.is_empty() {
                issues.push(ValidationIssue::EmptyRuleList {
                    path: file.path.clone(),
                });
            }
            if let Some(hash) = &file.expect_hash {
                if parse_hash(hash).is_none() {
                    issues.push(ValidationIssue::InvalidHash {
                        path: file.path.clone(),
                        value: hash.clone(),
                    });
                }
            }

            let mut seen = HashSet::new();
            for rule in &file.rules {
                if rule.id.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        rule_id: None,
                        field: "id",
                    });
                } else if !seen.insert(rule.id.as_str()) {
                    issues.push(ValidationIssue::DuplicateRuleId {
                        path: file.path.clone(),
                        rule_id: rule.id.clone(),
                    });
                }

                match &rule.matcher {
                    Matcher::Literal { search } => {
                        if search.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                rule_id: Some(rule.id.clone()),
                                field: "matcher.search",
                            });
                        }
                    }
                    Matcher::Pattern { pattern } => {
                        if pattern.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                rule_id: Some(rule.id.clone()),
                                field: "matcher.pattern",
                            });
                        } else if let Err(e) = cache::get_or_compile(pattern) {
                            issues.push(ValidationIssue::InvalidPattern {
                                rule_id: rule.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }

                if rule.required && rule.occurrences == Occurrences::Zero {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule_id: Some(rule.id.clone()),
                        message: "required rule cannot expect zero occurrences".to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Meta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve target paths against the root passed to the runner
    #[serde(default)]
    pub root_relative: bool,
    #[serde(default)]
    pub write: WritePolicy,
    /// Treat occurrence-count mismatches as failures
    #[serde(default)]
    pub strict: bool,
}

/// When the runner writes a changed buffer back to disk.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Only when every required rule succeeded
    #[default]
    OnSuccess,
    /// Unconditionally; failures are still reported
    Always,
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::OnSuccess => f.write_str("on-success"),
            WritePolicy::Always => f.write_str("always"),
        }
    }
}

/// One target file and the ordered rules that patch it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileTarget {
    pub path: String,
    /// Optional xxh3 fingerprint the content must have before rules run
    #[serde(default)]
    pub expect_hash: Option<String>,
    #[serde(default)]
    pub rules: Vec<PatchRule>,
}

/// Parse an xxh3 fingerprint, with or without a `0x` prefix.
pub fn parse_hash(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16).ok()
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyFileList,
    EmptyRuleList {
        path: String,
    },
    MissingField {
        rule_id: Option<String>,
        field: &'static str,
    },
    DuplicateRuleId {
        path: String,
        rule_id: String,
    },
    InvalidPattern {
        rule_id: String,
        message: String,
    },
    InvalidCombo {
        rule_id: Option<String>,
        message: String,
    },
    InvalidHash {
        path: String,
        value: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyFileList => write!(f, "rule set targets no files"),
            ValidationIssue::EmptyRuleList { path } => {
                write!(f, "file '{path}' has no rules")
            }
            ValidationIssue::MissingField { rule_id, field } => match rule_id {
                Some(id) => write!(f, "rule '{id}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::DuplicateRuleId { path, rule_id } => {
                write!(f, "file '{path}' declares rule id '{rule_id}' more than once")
            }
            ValidationIssue::InvalidPattern { rule_id, message } => {
                write!(f, "rule '{rule_id}' has an invalid pattern: {message}")
            }
            ValidationIssue::InvalidCombo { rule_id, message } => match rule_id {
                Some(id) => write!(f, "rule '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid rule configuration: {message}"),
            },
            ValidationIssue::InvalidHash { path, value } => {
                write!(f, "file '{path}' has malformed expect_hash '{value}'")
            }
        }
    }
}
