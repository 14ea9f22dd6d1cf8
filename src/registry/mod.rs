//! Registry abstraction for package hosting services.
//!
//! The retention engine only talks to a registry through the [`Registry`]
//! trait: listing packages and versions, resolving manifest digests for a
//! tag, and deleting a version by id.

mod auth;
mod github;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use github::GitHubRegistry;

/// Kind of package hosted in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Container,
    Maven,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Container => "container",
            PackageType::Maven => "maven",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "container" => Ok(PackageType::Container),
            "maven" => Ok(PackageType::Maven),
            _ => anyhow::bail!(
                "Unsupported package type: {}. Expected container or maven.",
                s
            ),
        }
    }
}

/// A package as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: u64,
    pub name: String,
    pub package_type: PackageType,
    /// Full name (`owner/repo`) of the repository the package is linked to
    pub repository: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    /// Repository name without the owner part.
    pub fn repository_name(&self) -> Option<&str> {
        self.repository
            .as_deref()
            .map(|full| full.rsplit('/').next().unwrap_or(full))
    }
}

/// A single version of a package.
///
/// For container packages `name` is the manifest digest (`sha256:...`).
/// For Maven packages it is the version string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Version {
    pub fn digest(&self) -> &str {
        &self.name
    }

    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// Case-insensitive check for a literal tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// A package together with all of its versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageWithVersions {
    pub package: Package,
    pub versions: Vec<Version>,
}

/// Operations the retention engine needs from a package registry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Whether the owner is an organization (as opposed to a user account).
    async fn is_organization(&self, owner: &str) -> Result<bool>;

    /// List every package of the given type owned by `owner`.
    async fn list_packages(
        &self,
        owner: &str,
        package_type: PackageType,
        is_organization: bool,
    ) -> Result<Vec<Package>>;

    /// List every version of a package.
    async fn list_versions(
        &self,
        owner: &str,
        package_type: PackageType,
        package_name: &str,
        is_organization: bool,
    ) -> Result<Vec<Version>>;

    /// Resolve the platform manifest digests referenced by a tag.
    async fn get_manifest_digests(
        &self,
        owner: &str,
        package_name: &str,
        tag: &str,
    ) -> Result<Vec<String>>;

    /// Delete a single package version.
    async fn delete_package_version(
        &self,
        owner: &str,
        package_type: PackageType,
        package_name: &str,
        version_id: u64,
        is_organization: bool,
    ) -> Result<()>;
}
