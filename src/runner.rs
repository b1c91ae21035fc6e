//! Runs rule sets against files on disk.
//!
//! The pipeline itself never touches the filesystem. This module owns the
//! read / patch / decide / write cycle for each target: read the whole
//! file once, run the rules in memory, then either write the result back
//! atomically or withhold it, depending on the report and the set's write
//! policy. One file's failure never affects its siblings.

use crate::config::schema::{parse_hash, FileTarget, PatchSet, WritePolicy};
use crate::pipeline::{PatchResult, Pipeline};
use crate::safety::{RootGuard, SafetyError};
use crate::suggest::{collect_hints, MatchHint};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// Whether the runner is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write changed buffers back per the set's write policy
    Apply,
    /// Evaluate everything, write nothing
    DryRun,
}

/// What happened to one target file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FileOutcome {
    /// Buffer changed and was written back
    Patched,
    /// Dry run: buffer changed, nothing written
    WouldPatch,
    /// Every rule left the buffer as it found it
    Unchanged,
    /// The run failed and the write policy gates on success
    Withheld,
    /// Content fingerprint did not match `expect_hash`; rules never ran
    Drifted { expected: String, found: String },
    /// The file could not be read or written
    Failed { reason: String },
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Patched => write!(f, "patched"),
            FileOutcome::WouldPatch => write!(f, "would patch"),
            FileOutcome::Unchanged => write!(f, "unchanged"),
            FileOutcome::Withheld => write!(f, "withheld (rule failures)"),
            FileOutcome::Drifted { expected, found } => {
                write!(f, "fingerprint drift (expected {expected}, found {found})")
            }
            FileOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Report for one target file: the pipeline results plus what the runner
/// did about them.
#[derive(Debug, Clone, Serialize)]
#[must_use = "FileReport should be checked for success/failure"]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
    /// One result per rule, in declared order; empty when the rules
    /// never ran against the file
    pub results: Vec<PatchResult>,
    /// True iff the pipeline succeeded and nothing failed at the file
    /// level
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<MatchHint>,
    /// Pre- and post-pipeline texts, kept for diff rendering
    #[serde(skip)]
    pub original: String,
    #[serde(skip)]
    pub patched: String,
}

impl FileReport {
    fn failed(path: PathBuf, reason: String) -> Self {
        FileReport {
            path,
            outcome: FileOutcome::Failed { reason },
            results: Vec::new(),
            succeeded: false,
            hints: Vec::new(),
            original: String::new(),
            patched: String::new(),
        }
    }
}

/// Run every file target in a rule set.
///
/// Files are processed sequentially in declared order and the returned
/// reports preserve that order. A failure on one file is recorded in its
/// report and never stops the others. The only hard error is a root that
/// cannot be resolved at all.
pub fn run_patch_set(
    set: &PatchSet,
    root: &Path,
    mode: WriteMode,
) -> Result<Vec<FileReport>, SafetyError> {
    let guard = RootGuard::new(root)?;

    let mut reports = Vec::with_capacity(set.files.len());
    for target in &set.files {
        reports.push(run_file(set, target, &guard, root, mode));
    }
    Ok(reports)
}

fn run_file(
    set: &PatchSet,
    target: &FileTarget,
    guard: &RootGuard,
    root: &Path,
    mode: WriteMode,
) -> FileReport {
    let declared = if set.meta.root_relative {
        root.join(&target.path)
    } else {
        PathBuf::from(&target.path)
    };

    let path = match guard.validate_path(&declared) {
        Ok(canonical) => canonical,
        Err(e) => return FileReport::failed(declared, e.to_string()),
    };

    let original = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => return FileReport::failed(path, format!("read failed: {e}")),
    };

    // Fingerprint pin: refuse to patch content that drifted from what
    // the rule author wrote the rules against.
    if let Some(declared_hash) = &target.expect_hash {
        let expected = match parse_hash(declared_hash) {
            Some(hash) => hash,
            None => {
                return FileReport::failed(
                    path,
                    format!("malformed expect_hash '{declared_hash}'"),
                );
            }
        };
        let found = xxh3_64(original.as_bytes());
        if found != expected {
            return FileReport {
                path,
                outcome: FileOutcome::Drifted {
                    expected: format!("{expected:016x}"),
                    found: format!("{found:016x}"),
                },
                results: Vec::new(),
                succeeded: false,
                hints: Vec::new(),
                original,
                patched: String::new(),
            };
        }
    }

    let pipeline = Pipeline::new(target.rules.clone()).strict(set.meta.strict);
    let report = pipeline.apply(&original);
    let hints = collect_hints(pipeline.rules(), &report.results, &original);

    let changed = report.final_text != original;

    let outcome = if !changed {
        FileOutcome::Unchanged
    } else if !report.succeeded && set.meta.write == WritePolicy::OnSuccess {
        // Checked before the mode so a dry run reports the withhold too.
        FileOutcome::Withheld
    } else if mode == WriteMode::DryRun {
        FileOutcome::WouldPatch
    } else {
        match write_back(guard, &path, &report.final_text) {
            Ok(()) => FileOutcome::Patched,
            Err(reason) => FileOutcome::Failed {
                reason: format!("write failed: {reason}"),
            },
        }
    };

    let file_failed = matches!(outcome, FileOutcome::Failed { .. });
    FileReport {
        path,
        outcome,
        succeeded: report.succeeded && !file_failed,
        hints,
        original,
        patched: report.final_text,
        results: report.results,
    }
}

/// xxh3 fingerprint of a file's current content, for `expect_hash` pins.
pub fn fingerprint(path: impl AsRef<Path>) -> Result<u64, std::io::Error> {
    let content = fs::read(path)?;
    Ok(xxh3_64(&content))
}

fn write_back(guard: &RootGuard, path: &Path, content: &str) -> Result<(), String> {
    // Re-validate right before writing to close the TOCTOU window
    guard.revalidate(path).map_err(|e| e.to_string())?;
    atomic_write(path, content).map_err(|e| e.to_string())
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the previous content survives.
fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;

    // Flush to disk (fsync)
    temp.as_file().sync_all()?;

    // Atomic rename
    temp.persist(path).map_err(|e| e.error)?;

    // Bump mtime so file watchers and incremental builds notice
    filetime::set_file_mtime(path, filetime::FileTime::now())?;

    Ok(())
}
