//! Cleanup use case: list, plan, delete, report.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use log::{debug, info, warn};

use crate::delete::{DeleteError, DeleteOptions, DeletionExecutor, DeletionResult};
use crate::matcher::{PatternCache, WildcardMatcher};
use crate::registry::{PackageType, PackageWithVersions, Registry};
use crate::report::{ReportContext, render_summary};
use crate::strategy::{DeletionPlan, RetentionStrategy, StrategyContext, plan_version_count};

/// Inputs for one cleanup run.
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub owner: String,
    /// Only packages linked to this repository are processed.
    pub repo: String,
    pub package_type: PackageType,
    pub threshold_days: u32,
    pub threshold_date: DateTime<Utc>,
    pub threshold_versions: usize,
    pub included_patterns: Vec<String>,
    pub excluded_patterns: Vec<String>,
    pub batch_size: usize,
    pub max_errors: usize,
    pub dry_run: bool,
    pub debug: bool,
}

#[derive(Debug)]
pub struct CleanupOutcome {
    pub plan: DeletionPlan,
    pub results: Vec<DeletionResult>,
    /// Why deletion stopped early, if it did.
    pub aborted: Option<String>,
    /// Rendered markdown summary.
    pub summary: String,
}

impl CleanupOutcome {
    /// True when the run aborted or any version could not be deleted.
    pub fn has_failures(&self) -> bool {
        self.aborted.is_some() || self.results.iter().any(|r| !r.success)
    }
}

pub struct CleanupUseCase {
    registry: Arc<dyn Registry>,
    matcher: WildcardMatcher,
}

impl CleanupUseCase {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            matcher: WildcardMatcher::new(),
        }
    }

    /// Uses `cache` for compiled tag patterns instead of a private one.
    pub fn with_pattern_cache(mut self, cache: Arc<PatternCache>) -> Self {
        self.matcher = WildcardMatcher::with_cache(cache);
        self
    }

    #[tracing::instrument(skip_all, fields(owner = %options.owner, repo = %options.repo))]
    pub async fn run(&self, options: &CleanupOptions) -> Result<CleanupOutcome> {
        let registry = self.registry.as_ref();

        let is_organization = registry
            .is_organization(&options.owner)
            .await
            .with_context(|| format!("Failed to look up owner {}", options.owner))?;
        info!("Is organization: {}", is_organization);

        let packages = registry
            .list_packages(&options.owner, options.package_type, is_organization)
            .await
            .with_context(|| format!("Failed to list {} packages", options.package_type))?;
        let total_packages = packages.len();
        let packages: Vec<_> = packages
            .into_iter()
            .filter(|p| p.repository_name() == Some(options.repo.as_str()))
            .collect();
        info!(
            "Total packages found: {}, packages filtered by repo '{}': {}",
            total_packages,
            options.repo,
            packages.len()
        );

        if packages.is_empty() {
            warn!("No packages found.");
        }

        let packages_with_versions = try_join_all(packages.into_iter().map(|package| async move {
            let versions = registry
                .list_versions(
                    &options.owner,
                    package.package_type,
                    &package.name,
                    is_organization,
                )
                .await
                .with_context(|| format!("Failed to list versions of {}", package.name))?;
            info!("Found {} versions for package: {}", versions.len(), package.name);
            Ok::<_, anyhow::Error>(PackageWithVersions { package, versions })
        }))
        .await?;

        let total_versions: usize = packages_with_versions.iter().map(|p| p.versions.len()).sum();
        info!(
            "Total packages to process: {}, total versions found: {}",
            packages_with_versions.len(),
            total_versions
        );

        let strategy = RetentionStrategy::with_matcher(options.package_type, self.matcher.clone());
        info!("Using strategy: {}", strategy);

        let plan = strategy
            .execute(&StrategyContext {
                packages_with_versions: &packages_with_versions,
                excluded_patterns: &options.excluded_patterns,
                included_patterns: &options.included_patterns,
                threshold_date: options.threshold_date,
                threshold_versions: options.threshold_versions,
                registry,
                owner: &options.owner,
                debug: options.debug,
            })
            .await;
        info!(
            "Planned {} version(s) in {} package(s) for deletion",
            plan_version_count(&plan),
            plan.len()
        );
        debug!("Deletion plan: {:?}", plan);

        let (results, aborted) = if plan.is_empty() {
            (Vec::new(), None)
        } else {
            self.delete(&plan, options, is_organization).await?
        };

        let summary = render_summary(&ReportContext {
            package_type: options.package_type,
            plan: &plan,
            results: &results,
            threshold_days: options.threshold_days,
            threshold_date: options.threshold_date,
            dry_run: options.dry_run,
            included_patterns: &options.included_patterns,
            excluded_patterns: &options.excluded_patterns,
            aborted: aborted.as_deref(),
        });

        Ok(CleanupOutcome {
            plan,
            results,
            aborted,
            summary,
        })
    }

    /// Runs the executor. Aborts are turned into partial results plus a reason.
    async fn delete(
        &self,
        plan: &DeletionPlan,
        options: &CleanupOptions,
        is_organization: bool,
    ) -> Result<(Vec<DeletionResult>, Option<String>)> {
        if options.dry_run {
            warn!("Dry run mode is enabled, no version will be deleted.");
        }

        let executor = DeletionExecutor::builder()
            .registry(self.registry.clone())
            .build()?;
        let delete_options = DeleteOptions {
            owner: options.owner.clone(),
            is_organization,
            batch_size: options.batch_size,
            max_errors: options.max_errors,
            dry_run: options.dry_run,
        };

        match executor.execute(plan, &delete_options).await {
            Ok(results) => Ok((results, None)),
            Err(e @ DeleteError::Config(_)) => Err(e.into()),
            Err(e) => {
                let reason = e.to_string();
                Ok((e.into_partial_results(), Some(reason)))
            }
        }
    }
}
