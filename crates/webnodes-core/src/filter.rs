//! Glob-style path filtering applied before emission

use glob::{MatchOptions, Pattern};

use crate::domain::DomainError;

/// Optional glob filter over item identifiers
///
/// An empty or absent pattern matches everything. `*` does not cross `/`
/// boundaries, so `*.txt` matches `a.txt` but not `dir/a.txt`; use
/// `**/*.txt` for nested keys.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    pattern: Option<Pattern>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl PathFilter {
    /// A filter that accepts every identifier
    pub fn any() -> Self {
        Self::default()
    }

    /// Compiles a filter from an optional pattern
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPattern`] if the pattern does not compile
    pub fn new(pattern: Option<&str>) -> Result<Self, DomainError> {
        let pattern = match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(Pattern::new(p).map_err(|e| DomainError::InvalidPattern {
                pattern: p.to_string(),
                reason: e.msg.to_string(),
            })?),
            None => None,
        };
        Ok(Self { pattern })
    }

    /// Returns true if the identifier should produce events
    ///
    /// A leading `/` on the identifier is ignored when the pattern itself is
    /// relative, so Dropbox paths (`/a.txt`) and S3 keys (`a.txt`) behave the
    /// same.
    pub fn matches(&self, item_id: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(p) => {
                let candidate = if p.as_str().starts_with('/') {
                    item_id
                } else {
                    item_id.trim_start_matches('/')
                };
                p.matches_with(candidate, MATCH_OPTIONS)
            }
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Pattern::as_str)
    }
}
