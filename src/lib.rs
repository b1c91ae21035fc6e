//! Ordered text patching with per-rule verification.
//!
//! repatch applies a sequence of search/replace rules to text files and
//! reports exactly what each rule did. Rules run in declared order against
//! an evolving buffer, so later rules see the output of earlier ones.
//! Rules can be pinned to an expected occurrence count, marked required,
//! and written as literal strings or regular expressions.
//!
//! # Architecture
//!
//! - [`rule`] - rule model: matchers, occurrence contracts, builders
//! - [`pipeline`] - the in-memory engine and its per-rule results
//! - [`config`] - TOML rule sets: schema, loading, validation
//! - [`runner`] - file orchestration: read, patch, atomic write-back
//! - [`safety`] - workspace root confinement for target paths
//! - [`suggest`] - near-miss hints for required rules that missed
//! - [`cache`] - thread-local compiled pattern cache
//!
//! # Safety
//!
//! The engine itself is pure: [`Pipeline::apply`] maps a string to a new
//! string plus a report and never touches the filesystem. All writes go
//! through the runner, which confines target paths to the workspace root,
//! withholds writes when the report failed, and replaces files
//! atomically (tempfile + fsync + rename).
//!
//! # Example
//!
//! ```
//! use repatch::{PatchRule, Pipeline};
//!
//! let rules = vec![
//!     PatchRule::literal("greet", "hello", "goodbye").require(),
//! ];
//! let report = Pipeline::new(rules).apply("hello world");
//!
//! assert!(report.succeeded);
//! assert_eq!(report.final_text, "goodbye world");
//! ```

pub mod cache;
pub mod config;
pub mod pipeline;
pub mod rule;
pub mod runner;
pub mod safety;
pub mod suggest;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, PatchSet};
pub use pipeline::{PatchResult, Pipeline, PipelineReport, RuleStatus};
pub use rule::{Matcher, Occurrences, PatchRule};
pub use runner::{fingerprint, run_patch_set, FileOutcome, FileReport, WriteMode};
pub use safety::{RootGuard, SafetyError};
pub use suggest::MatchHint;
