use glob::{MatchOptions, Pattern};

use crate::Result;

/// Decides which top-level source entries take part in a build.
pub trait Matcher: Send + Sync {
    fn matches(&self, name: &str) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, name: &str) -> bool {
        self(name)
    }
}

/// Accepts every name.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl Matcher for MatchAll {
    fn matches(&self, _name: &str) -> bool {
        true
    }
}

/// Accepts names matching any of a set of glob patterns.
///
/// An empty pattern set accepts everything. Wildcards never cross a path
/// separator and a leading `.` must be matched explicitly, so `*` skips
/// hidden files.
#[derive(Debug, Clone, Default)]
pub struct GlobMatcher {
    patterns: Vec<Pattern>,
}

impl GlobMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| Pattern::new(pattern.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

impl Matcher for GlobMatcher {
    fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
    }
}
