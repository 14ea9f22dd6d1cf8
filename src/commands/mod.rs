use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Duration;
use log::{info, warn};

use crate::{
    application::{CleanupOptions, CleanupOutcome, CleanupUseCase},
    registry::{PackageType, Registry},
    report,
    runtime::Runtime,
    strategy::MAVEN_SNAPSHOT_PATTERN,
};

pub mod config;

use config::Config;

/// Raw cleanup inputs as given on the command line.
#[derive(Debug, Clone)]
pub struct CleanupArgs {
    pub package_type: String,
    /// `owner/repo`
    pub repository: String,
    pub threshold_days: u32,
    pub threshold_versions: usize,
    pub included_tags: Vec<String>,
    pub excluded_tags: Vec<String>,
    pub batch_size: usize,
    pub max_errors: usize,
    pub dry_run: bool,
    pub debug: bool,
    pub api_url: String,
    pub registry_url: String,
}

#[tracing::instrument(skip(runtime, args), fields(repository = %args.repository))]
pub async fn cleanup<R: Runtime>(runtime: R, args: CleanupArgs) -> Result<()> {
    let config = Config::new(runtime, &args.api_url, &args.registry_url)?;
    run(args, config.runtime, Arc::new(config.registry)).await
}

/// Runs a cleanup against any registry, publishes the summary and fails when
/// the run did not complete cleanly.
#[tracing::instrument(skip_all)]
pub async fn run<R: Runtime>(
    args: CleanupArgs,
    runtime: R,
    registry: Arc<dyn Registry>,
) -> Result<()> {
    let options = build_options(&args, &runtime)?;

    if options.dry_run {
        warn!("Dry run mode is enabled, no version will be deleted.");
    }
    info!("Threshold days: {}", options.threshold_days);
    info!("Threshold date: {}", options.threshold_date.to_rfc3339());
    if !options.excluded_patterns.is_empty() {
        info!("Excluded tags: {}", options.excluded_patterns.join(", "));
    }
    if !options.included_patterns.is_empty() {
        info!("Included tags: {}", options.included_patterns.join(", "));
    }
    info!(
        "Run for type: {}, owner: {}, repo: {}",
        options.package_type, options.owner, options.repo
    );

    let outcome = CleanupUseCase::new(registry).run(&options).await?;
    report::publish(&runtime, &outcome.summary).context("Failed to publish summary")?;

    finish(&outcome)
}

fn finish(outcome: &CleanupOutcome) -> Result<()> {
    if let Some(reason) = &outcome.aborted {
        bail!("Cleanup aborted: {}", reason);
    }
    if outcome.has_failures() {
        bail!("Cleanup completed with errors. Please check the logs and the report above.");
    }
    info!("Cleanup completed.");
    Ok(())
}

fn build_options<R: Runtime>(args: &CleanupArgs, runtime: &R) -> Result<CleanupOptions> {
    let package_type: PackageType = args.package_type.parse()?;
    let (owner, repo) = parse_repository(&args.repository)?;

    let threshold_date = runtime
        .now()
        .checked_sub_signed(Duration::days(i64::from(args.threshold_days)))
        .with_context(|| format!("Threshold of {} days is out of range", args.threshold_days))?;

    let excluded_patterns = clean_patterns(&args.excluded_tags);
    let mut included_patterns = clean_patterns(&args.included_tags);
    if package_type == PackageType::Maven
        && !included_patterns
            .iter()
            .any(|p| p.eq_ignore_ascii_case(MAVEN_SNAPSHOT_PATTERN))
    {
        included_patterns.insert(0, MAVEN_SNAPSHOT_PATTERN.to_string());
    }

    Ok(CleanupOptions {
        owner,
        repo,
        package_type,
        threshold_days: args.threshold_days,
        threshold_date,
        threshold_versions: args.threshold_versions,
        included_patterns,
        excluded_patterns,
        batch_size: args.batch_size,
        max_errors: args.max_errors,
        dry_run: args.dry_run,
        debug: args.debug,
    })
}

/// Splits `owner/repo`.
pub fn parse_repository(s: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    match parts.as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => bail!("Invalid repository format: {}. Expected owner/repo.", s),
    }
}

fn clean_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
