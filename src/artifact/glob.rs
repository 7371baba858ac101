//! Ant-style path patterns for choosing which workspace files go into a bundle.
//!
//! Patterns are compiled with [`glob::Pattern`] and matched with literal
//! separators, so:
//! - `*` matches within one path segment, `?` one character, `[..]` a class;
//! - `**` matches any number of segments (including none);
//! - a pattern ending in `/` matches everything below that directory;
//! - several patterns are separated by commas.
//!
//! Paths are relative to the bundle root and use `/` separators.

use glob::{MatchOptions, Pattern};

use crate::error::{DeployError, DeployResult};

/// Version-control metadata never shipped in a bundle.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    "**/CVS/**",
    "**/.DS_Store",
];

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A set of compiled patterns; matches when any pattern does.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobSet {
    patterns: Vec<Pattern>,
}

impl GlobSet {
    /// Parses a comma-separated pattern list. Blank entries are ignored.
    pub fn parse(raw: &str) -> DeployResult<Self> {
        let patterns = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(compile)
            .collect::<DeployResult<_>>()?;
        Ok(Self { patterns })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, OPTIONS))
    }
}

/// Include/exclude pair applied to every file of a directory bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileFilter {
    includes: GlobSet,
    excludes: GlobSet,
}

impl FileFilter {
    /// Empty `includes` means every file. Default excludes always apply.
    pub fn new(includes: &str, excludes: &str) -> DeployResult<Self> {
        let mut filter = Self::default();
        filter.includes = GlobSet::parse(includes)?;
        filter.excludes.patterns.extend(GlobSet::parse(excludes)?.patterns);
        Ok(filter)
    }

    pub fn accepts(&self, path: &str) -> bool {
        (self.includes.is_empty() || self.includes.matches(path)) && !self.excludes.matches(path)
    }
}

impl Default for FileFilter {
    /// Every file except version-control metadata.
    fn default() -> Self {
        let excludes = DEFAULT_EXCLUDES
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        Self {
            includes: GlobSet::default(),
            excludes: GlobSet { patterns: excludes },
        }
    }
}

fn compile(pattern: &str) -> DeployResult<Pattern> {
    let mut normalized = pattern.replace('\\', "/");
    if normalized.ends_with('/') {
        normalized.push_str("**");
    }
    Pattern::new(&normalized)
        .map_err(|e| DeployError::config(format!("invalid file pattern '{pattern}': {e}")))
}
