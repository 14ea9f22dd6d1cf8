//! Runtime abstraction for process-level side effects.
//!
//! Environment lookups, the step-summary file and the clock go through
//! [`Runtime`] so the command layer can be tested with a mock.
//!
//! # Structure
//!
//! - `env` - Environment variables and the current time
//! - `fs` - Appending to files

mod env;
mod fs;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::env as std_env;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    /// Current wall-clock time in UTC.
    fn now(&self) -> DateTime<Utc>;

    // File System
    /// Append `contents` to `path`, creating the file if needed.
    fn append_to_file(&self, path: &Path, contents: &str) -> Result<()>;
}

/// First non-empty value among `keys`, in order.
pub fn first_env_var<R: Runtime + ?Sized>(runtime: &R, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| runtime.env_var(key).ok())
        .find(|value| !value.trim().is_empty())
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn now(&self) -> DateTime<Utc> {
        self.now_impl()
    }

    fn append_to_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.append_to_file_impl(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_env_var_skips_missing_and_empty() {
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(|key| match key {
            "PACKAGE_TOKEN" => Ok("  ".to_string()),
            "GITHUB_TOKEN" => Ok("ghp_fallback".to_string()),
            _ => Err(std_env::VarError::NotPresent),
        });

        assert_eq!(
            first_env_var(&runtime, &["MISSING", "PACKAGE_TOKEN", "GITHUB_TOKEN"]),
            Some("ghp_fallback".to_string())
        );
        assert_eq!(first_env_var(&runtime, &["MISSING"]), None);
    }
}
