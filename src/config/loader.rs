use crate::config::schema::{PatchSet, ValidationError, ValidationIssue};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Why a rule set could not be loaded.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read at all.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The document is not the TOML shape a rule set requires.
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    /// The document parsed but violates the rule-set contract.
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    /// The offending file, when the rule set came from disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } => Some(path),
            ConfigError::Toml { path, .. } | ConfigError::Validation { path, .. } => {
                path.as_deref()
            }
        }
    }

    /// Every validation issue found, when validation failed.
    pub fn issues(&self) -> Option<&[ValidationIssue]> {
        match self {
            ConfigError::Validation { source, .. } => Some(&source.issues),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = |path: &Option<PathBuf>| {
            path.as_ref()
                .map(|p| format!(" {}", p.display()))
                .unwrap_or_default()
        };

        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read rule set {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "rule set{} is not valid TOML: {}", origin(path), source)
            }
            ConfigError::Validation { path, source } => {
                write!(
                    f,
                    "rule set{} failed validation with {} issue(s):",
                    origin(path),
                    source.issues.len()
                )?;
                for issue in &source.issues {
                    write!(f, "\n  - {issue}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchSet, ConfigError> {
    parse_rule_set(input, None)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rule_set(&contents, Some(path))
}

/// Parse and validate in one pass, attaching the originating file to
/// whichever phase rejects the set.
fn parse_rule_set(input: &str, origin: Option<&Path>) -> Result<PatchSet, ConfigError> {
    let owned = || origin.map(Path::to_path_buf);

    let set: PatchSet = toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml {
        path: owned(),
        source,
    })?;

    set.validate().map_err(|source| ConfigError::Validation {
        path: owned(),
        source,
    })?;

    Ok(set)
}
