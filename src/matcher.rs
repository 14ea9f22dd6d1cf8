//! Tag pattern matching.
//!
//! Patterns are case-insensitive and come in four shapes:
//! - `semver`: `1.2.3`, `v1.2.3`, `1.2.3-rc1`, ...
//! - `?*`: alphanumeric-only tags with at least one digit (short commit hashes)
//! - plain strings: exact comparison
//! - globs: `*` matches any run of characters, `?` exactly one

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use glob::{MatchOptions, Pattern};
use log::debug;

const SEMVER_PATTERN: &str = "semver";
const HASH_PATTERN: &str = "?*";

/// Default number of compiled patterns kept by [`PatternCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Bounded cache of compiled glob patterns.
///
/// Malformed patterns are cached as `None` so they are rejected without
/// recompiling. The whole cache is dropped once it reaches capacity.
pub struct PatternCache {
    capacity: usize,
    entries: Mutex<HashMap<String, Option<Pattern>>>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Returns the compiled form of a normalized wildcard pattern.
    fn get_or_compile(&self, pattern: &str) -> Option<Pattern> {
        let Ok(mut entries) = self.entries.lock() else {
            // A poisoned lock only loses caching, not correctness
            return compile_wildcard(pattern);
        };

        if let Some(compiled) = entries.get(pattern) {
            return compiled.clone();
        }

        if entries.len() >= self.capacity {
            debug!("Pattern cache full ({} entries), clearing", entries.len());
            entries.clear();
        }

        let compiled = compile_wildcard(pattern);
        entries.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Matches tags against include/exclude patterns.
#[derive(Clone)]
pub struct WildcardMatcher {
    cache: Arc<PatternCache>,
}

impl WildcardMatcher {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(PatternCache::default()))
    }

    pub fn with_cache(cache: Arc<PatternCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    /// Returns true if `tag` matches `pattern`. Never panics; a pattern that
    /// cannot be compiled matches nothing.
    pub fn matches(&self, tag: &str, pattern: &str) -> bool {
        let t = tag.to_lowercase();
        let p = pattern.to_lowercase();

        if p == SEMVER_PATTERN {
            return is_semver_like(&t);
        }

        if p == HASH_PATTERN {
            return is_hash_like(&t);
        }

        if !p.contains('*') && !p.contains('?') {
            return t == p;
        }

        match self.cache.get_or_compile(&p) {
            Some(compiled) => compiled.matches_with(&t, MATCH_OPTIONS),
            None => {
                debug!("Pattern {:?} could not be compiled, treating as no match", p);
                false
            }
        }
    }

    /// Returns true if `tag` matches any of `patterns`.
    pub fn matches_any<S: AsRef<str>>(&self, tag: &str, patterns: &[S]) -> bool {
        patterns.iter().any(|p| self.matches(tag, p.as_ref()))
    }
}

impl Default for WildcardMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles a wildcard pattern into a glob where only `*` and `?` are special.
fn compile_wildcard(pattern: &str) -> Option<Pattern> {
    let mut glob = String::with_capacity(pattern.len() + 8);
    let mut previous_star = false;

    for c in pattern.chars() {
        match c {
            // `**` is a path wildcard in glob syntax; a run of stars means the same as one here
            '*' if previous_star => continue,
            '*' => glob.push('*'),
            '?' => glob.push('?'),
            '[' => glob.push_str("[[]"),
            ']' => glob.push_str("[]]"),
            other => glob.push(other),
        }
        previous_star = c == '*';
    }

    Pattern::new(&glob).ok()
}

/// `^v?\d+\.\d+\.\d+` followed by anything.
fn is_semver_like(tag: &str) -> bool {
    let rest = tag.strip_prefix('v').unwrap_or(tag);
    let mut parts = rest.splitn(3, '.');

    let (Some(major), Some(minor), Some(tail)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    let patch_len = tail.chars().take_while(|c| c.is_ascii_digit()).count();

    is_number(major) && is_number(minor) && patch_len > 0
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn is_hash_like(tag: &str) -> bool {
    !tag.is_empty()
        && tag.chars().all(|c| c.is_ascii_alphanumeric())
        && tag.chars().any(|c| c.is_ascii_digit())
}
