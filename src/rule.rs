use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

/// How a rule locates the text it replaces.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Matcher {
    /// Exact substring search
    Literal {
        /// The exact text to search for
        search: String,
    },
    /// Regular expression search
    Pattern {
        /// The pattern to compile; capture groups are available to the
        /// replacement as `$1` / `${name}`
        pattern: String,
    },
}

impl Matcher {
    /// The raw search text or pattern source.
    pub fn source(&self) -> &str {
        match self {
            Matcher::Literal { search } => search,
            Matcher::Pattern { pattern } => pattern,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Matcher::Literal { .. })
    }
}

/// Expected match count for a rule.
///
/// Rule sets spell these as `0`, `1`, or `"any"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Occurrences {
    /// The matcher must not appear (guard against double application)
    Zero,
    /// Exactly one match expected
    One,
    /// Any number of matches; all are replaced
    #[default]
    Any,
}

impl Occurrences {
    /// Whether a match count satisfies this expectation.
    pub fn admits(&self, found: usize) -> bool {
        match self {
            Occurrences::Zero => found == 0,
            Occurrences::One => found == 1,
            Occurrences::Any => true,
        }
    }

    /// The fixed count this expectation demands, if it has one.
    pub fn expected(&self) -> Option<usize> {
        match self {
            Occurrences::Zero => Some(0),
            Occurrences::One => Some(1),
            Occurrences::Any => None,
        }
    }
}

impl fmt::Display for Occurrences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrences::Zero => f.write_str("0"),
            Occurrences::One => f.write_str("1"),
            Occurrences::Any => f.write_str("any"),
        }
    }
}

impl<'de> Deserialize<'de> for Occurrences {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OccurrencesVisitor;

        impl Visitor<'_> for OccurrencesVisitor {
            type Value = Occurrences;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("0, 1, or \"any\"")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value {
                    0 => Ok(Occurrences::Zero),
                    1 => Ok(Occurrences::One),
                    other => Err(E::invalid_value(de::Unexpected::Signed(other), &self)),
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value {
                    0 => Ok(Occurrences::Zero),
                    1 => Ok(Occurrences::One),
                    other => Err(E::invalid_value(de::Unexpected::Unsigned(other), &self)),
                }
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value {
                    "any" => Ok(Occurrences::Any),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }
        }

        deserializer.deserialize_any(OccurrencesVisitor)
    }
}

/// One declarative find-and-replace transformation.
///
/// The replacement is verbatim text for literal matchers. For pattern
/// matchers it is a template: `$1` and `${name}` expand to capture
/// groups, `$$` produces a literal dollar sign.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PatchRule {
    /// Identifier unique within its pipeline
    pub id: String,
    pub matcher: Matcher,
    pub replacement: String,
    /// Expected match count; mismatch is reported as an anomaly
    #[serde(default)]
    pub occurrences: Occurrences,
    /// Whether a miss fails the whole pipeline
    #[serde(default)]
    pub required: bool,
}

impl PatchRule {
    /// Rule with an exact-substring matcher.
    pub fn literal(
        id: impl Into<String>,
        search: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            matcher: Matcher::Literal {
                search: search.into(),
            },
            replacement: replacement.into(),
            occurrences: Occurrences::Any,
            required: false,
        }
    }

    /// Rule with a regex matcher.
    pub fn pattern(
        id: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            matcher: Matcher::Pattern {
                pattern: pattern.into(),
            },
            replacement: replacement.into(),
            occurrences: Occurrences::Any,
            required: false,
        }
    }

    /// Mark the rule required: a miss fails the pipeline.
    pub fn require(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the expected match count.
    pub fn expect(mut self, occurrences: Occurrences) -> Self {
        self.occurrences = occurrences;
        self
    }
}
