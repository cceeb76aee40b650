/*!
Exclusion rules for archive entries.

Patterns are regular expressions searched anywhere in the entry's path
relative to the backup source: `\.log$` excludes every log file, `cache`
excludes every path containing "cache".

Patterns use the `regex` crate syntax, which has no lookaround and no
backreferences. A pattern such as `^(?!keep/)` or `(a)\1` fails to compile
and is reported as [`VolsnapError::InvalidPattern`] before any archive work
starts; express such rules as several positive patterns instead.
*/

use regex::Regex;

use crate::{Result, VolsnapError};

/// Compiled exclusion patterns of one backup target
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    patterns: Vec<Regex>,
}

impl ExclusionMatcher {
    /// Compile `patterns`; the first invalid one is reported
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| VolsnapError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True if any pattern matches somewhere in `relative_path`
    pub fn matches(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(relative_path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
