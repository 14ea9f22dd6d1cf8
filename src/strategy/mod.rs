//! Retention strategies.
//!
//! A strategy looks at every version of every package and decides which ones
//! to delete. The result is a [`DeletionPlan`]: one entry per package that has
//! something to delete, with versions in the order they should be reported.

mod container;
mod maven;

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matcher::WildcardMatcher;
use crate::registry::{Package, PackageType, PackageWithVersions, Registry, Version};

pub use container::ContainerStrategy;
pub use maven::MavenStrategy;

/// Default inclusion pattern seeded for Maven packages.
pub const MAVEN_SNAPSHOT_PATTERN: &str = "*SNAPSHOT*";

/// Identity of a package inside a deletion plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRef {
    pub id: u64,
    pub name: String,
    pub package_type: PackageType,
}

impl From<&Package> for PackageRef {
    fn from(p: &Package) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            package_type: p.package_type,
        }
    }
}

/// Versions selected for deletion in one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersions {
    pub package: PackageRef,
    pub versions: Vec<Version>,
}

pub type DeletionPlan = Vec<PackageVersions>;

/// Total number of versions across a plan.
pub fn plan_version_count(plan: &[PackageVersions]) -> usize {
    plan.iter().map(|p| p.versions.len()).sum()
}

/// Everything a strategy needs for one run.
pub struct StrategyContext<'a> {
    pub packages_with_versions: &'a [PackageWithVersions],
    pub excluded_patterns: &'a [String],
    pub included_patterns: &'a [String],
    /// Versions created after this instant are never deleted.
    pub threshold_date: DateTime<Utc>,
    /// Maven only: number of newest eligible versions that are always kept.
    pub threshold_versions: usize,
    pub registry: &'a dyn Registry,
    pub owner: &'a str,
    pub debug: bool,
}

/// Retention strategy selected by package type.
pub enum RetentionStrategy {
    Container(ContainerStrategy),
    Maven(MavenStrategy),
}

impl RetentionStrategy {
    pub fn for_type(package_type: PackageType) -> Self {
        Self::with_matcher(package_type, WildcardMatcher::new())
    }

    /// Builds the strategy around an existing matcher, sharing its pattern cache.
    pub fn with_matcher(package_type: PackageType, matcher: WildcardMatcher) -> Self {
        match package_type {
            PackageType::Container => {
                RetentionStrategy::Container(ContainerStrategy::with_matcher(matcher))
            }
            PackageType::Maven => RetentionStrategy::Maven(MavenStrategy::with_matcher(matcher)),
        }
    }

    pub fn package_type(&self) -> PackageType {
        match self {
            RetentionStrategy::Container(_) => PackageType::Container,
            RetentionStrategy::Maven(_) => PackageType::Maven,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RetentionStrategy::Container(_) => "Container Strategy",
            RetentionStrategy::Maven(_) => "Maven Strategy",
        }
    }

    /// Builds the deletion plan.
    pub async fn execute(&self, ctx: &StrategyContext<'_>) -> DeletionPlan {
        match self {
            RetentionStrategy::Container(s) => s.execute(ctx).await,
            RetentionStrategy::Maven(s) => s.execute(ctx),
        }
    }
}

impl fmt::Display for RetentionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the strategy for a package-type string such as `"container"`.
pub fn get_strategy(package_type: &str) -> Result<RetentionStrategy> {
    let package_type = package_type.parse::<PackageType>()?;
    Ok(RetentionStrategy::for_type(package_type))
}

fn lowercase_all(patterns: &[String]) -> Vec<String> {
    patterns.iter().map(|p| p.trim().to_lowercase()).collect()
}
