//! Batched deletion of planned package versions.
//!
//! Each package's versions are deleted in sequential batches. Every call in a
//! batch runs concurrently and the batch is fully awaited before the next one
//! starts, so a failure never cancels its siblings. Failures are classified
//! by message:
//!
//! - skippable (`404`, `not found`, popular public versions): logged, never
//!   counted against the error budget
//! - critical (`403`, rate limiting, missing permissions): the run stops once
//!   the current batch settles
//! - anything else: counted, and the run stops when `max_errors` is reached

use std::sync::Arc;

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::registry::{PackageType, Registry, Version};
use crate::strategy::{PackageRef, PackageVersions, plan_version_count};

pub const DEFAULT_BATCH_SIZE: usize = 15;
pub const DEFAULT_MAX_ERRORS: usize = 5;

/// Outcome of deleting (or pretending to delete) one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    pub package_name: String,
    pub version_id: u64,
    pub success: bool,
    pub critical: bool,
    pub skipped: bool,
    pub reason: Option<String>,
}

impl DeletionResult {
    fn succeeded(package: &PackageRef, version: &Version) -> Self {
        Self {
            package_name: package.name.clone(),
            version_id: version.id,
            success: true,
            critical: false,
            skipped: false,
            reason: None,
        }
    }

    fn failed(package: &PackageRef, version: &Version, kind: FailureKind, reason: String) -> Self {
        Self {
            package_name: package.name.clone(),
            version_id: version.id,
            success: false,
            critical: kind == FailureKind::Critical,
            skipped: kind == FailureKind::Skippable,
            reason: Some(reason),
        }
    }

    /// Failed without being skipped or critical; these count toward `max_errors`.
    pub fn is_counted_error(&self) -> bool {
        !self.success && !self.skipped && !self.critical
    }
}

#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("invalid deletion configuration: {0}")]
    Config(String),

    #[error("critical error, deletion aborted: {message}")]
    Critical {
        message: String,
        results: Vec<DeletionResult>,
    },

    #[error("too many errors ({count}, limit {max_errors}), deletion aborted")]
    TooManyErrors {
        count: usize,
        max_errors: usize,
        results: Vec<DeletionResult>,
    },
}

impl DeleteError {
    /// Results recorded before the run was aborted.
    pub fn partial_results(&self) -> &[DeletionResult] {
        match self {
            DeleteError::Config(_) => &[],
            DeleteError::Critical { results, .. } | DeleteError::TooManyErrors { results, .. } => {
                results.as_slice()
            }
        }
    }

    pub fn into_partial_results(self) -> Vec<DeletionResult> {
        match self {
            DeleteError::Config(_) => Vec::new(),
            DeleteError::Critical { results, .. } | DeleteError::TooManyErrors { results, .. } => {
                results
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Skippable,
    Critical,
    Other,
}

/// Classifies a delete failure by its message. Skippable markers win over
/// critical ones.
pub fn classify(message: &str) -> FailureKind {
    let msg = message.to_lowercase();

    if msg.contains("more than 5000 downloads") || msg.contains("404") || msg.contains("not found")
    {
        return FailureKind::Skippable;
    }

    if msg.contains("403") || mentions_rate_limit(&msg) || msg.contains("insufficient permissions")
    {
        return FailureKind::Critical;
    }

    FailureKind::Other
}

/// `rate` and `limit` adjacent or separated by a single character.
fn mentions_rate_limit(msg: &str) -> bool {
    msg.match_indices("rate").any(|(i, m)| {
        let rest = &msg[i + m.len()..];
        if rest.starts_with("limit") {
            return true;
        }
        let mut chars = rest.chars();
        chars.next().is_some() && chars.as_str().starts_with("limit")
    })
}

#[derive(Debug, Clone)]
pub struct DeleteOptions {
    pub owner: String,
    pub is_organization: bool,
    pub batch_size: usize,
    pub max_errors: usize,
    pub dry_run: bool,
}

impl DeleteOptions {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            is_organization: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_errors: DEFAULT_MAX_ERRORS,
            dry_run: false,
        }
    }

    fn validate(&self) -> Result<(), DeleteError> {
        if self.owner.trim().is_empty() {
            return Err(DeleteError::Config("owner must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(DeleteError::Config("batch size must be at least 1".into()));
        }
        Ok(())
    }
}

pub struct DeletionExecutor {
    registry: Arc<dyn Registry>,
}

#[derive(Default)]
pub struct DeletionExecutorBuilder {
    registry: Option<Arc<dyn Registry>>,
}

impl DeletionExecutorBuilder {
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<DeletionExecutor, DeleteError> {
        let registry = self
            .registry
            .ok_or_else(|| DeleteError::Config("a registry is required".into()))?;
        Ok(DeletionExecutor { registry })
    }
}

impl DeletionExecutor {
    pub fn builder() -> DeletionExecutorBuilder {
        DeletionExecutorBuilder::default()
    }

    /// Deletes every version in the plan, in plan order.
    #[tracing::instrument(skip_all, fields(owner = %options.owner, dry_run = options.dry_run))]
    pub async fn execute(
        &self,
        plan: &[PackageVersions],
        options: &DeleteOptions,
    ) -> Result<Vec<DeletionResult>, DeleteError> {
        options.validate()?;

        let total = plan_version_count(plan);
        info!(
            "Deleting {} version(s) across {} package(s) (batch size {}, max errors {})",
            total,
            plan.len(),
            options.batch_size,
            options.max_errors
        );

        let mut results = Vec::with_capacity(total);
        let mut error_count = 0;

        for entry in plan {
            let package = &entry.package;
            debug!("[{}] {} version(s) to delete", package.name, entry.versions.len());

            for batch in entry.versions.chunks(options.batch_size) {
                let outcomes = join_all(
                    batch
                        .iter()
                        .map(|version| self.delete_version(package, version, options)),
                )
                .await;

                let mut critical = None;
                for outcome in outcomes {
                    if outcome.critical && critical.is_none() {
                        critical = outcome.reason.clone();
                    }
                    if outcome.is_counted_error() {
                        error_count += 1;
                    }
                    results.push(outcome);
                }

                if let Some(message) = critical {
                    error!("Critical error, stopping deletion: {}", message);
                    return Err(DeleteError::Critical { message, results });
                }

                if error_count > 0 && error_count >= options.max_errors {
                    error!(
                        "Reached {} error(s) (limit {}), stopping deletion",
                        error_count, options.max_errors
                    );
                    return Err(DeleteError::TooManyErrors {
                        count: error_count,
                        max_errors: options.max_errors,
                        results,
                    });
                }
            }
        }

        info!(
            "Deletion finished: {} succeeded, {} skipped, {} failed",
            results.iter().filter(|r| r.success).count(),
            results.iter().filter(|r| r.skipped).count(),
            error_count
        );

        Ok(results)
    }

    async fn delete_version(
        &self,
        package: &PackageRef,
        version: &Version,
        options: &DeleteOptions,
    ) -> DeletionResult {
        let label = version_label(package.package_type, version);

        if options.dry_run {
            info!(
                "[dry run] Would delete {} version {} ({})",
                package.name, version.id, label
            );
            return DeletionResult::succeeded(package, version);
        }

        let outcome = self
            .registry
            .delete_package_version(
                &options.owner,
                package.package_type,
                &package.name,
                version.id,
                options.is_organization,
            )
            .await;

        match outcome {
            Ok(()) => {
                info!("Deleted {} version {} ({})", package.name, version.id, label);
                DeletionResult::succeeded(package, version)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let kind = classify(&message);
                match kind {
                    FailureKind::Skippable => warn!(
                        "Skipping {} version {} ({}): {}",
                        package.name, version.id, label, message
                    ),
                    FailureKind::Critical | FailureKind::Other => error!(
                        "Failed to delete {} version {} ({}): {}",
                        package.name, version.id, label, message
                    ),
                }
                DeletionResult::failed(package, version, kind, message)
            }
        }
    }
}

/// Version name for Maven, tags (or the digest when untagged) for containers.
fn version_label(package_type: PackageType, version: &Version) -> String {
    match package_type {
        PackageType::Maven => version.name.clone(),
        PackageType::Container if version.is_tagged() => version.tags.join(", "),
        PackageType::Container => version.name.clone(),
    }
}
