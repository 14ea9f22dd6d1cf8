use anyhow::Result;
use clap::Parser;
use package_cleanup::commands::{CleanupArgs, cleanup};
use package_cleanup::delete::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_ERRORS};

/// package-cleanup - GitHub Packages retention
///
/// Deletes old container images and Maven snapshots linked to a repository.
///
/// The token is read from PACKAGE_TOKEN, falling back to GITHUB_TOKEN. It needs
/// the read:packages and delete:packages scopes.
///
/// Examples:
///   package-cleanup --package-type container --repository owner/repo --dry-run
///   package-cleanup --package-type maven --repository owner/repo --threshold-versions 3
#[derive(Parser, Debug)]
#[command(author, version = env!("PACKAGE_CLEANUP_VERSION"), about)]
struct Cli {
    /// Package type to clean up: container or maven
    #[arg(long, env = "PACKAGE_TYPE", value_name = "TYPE")]
    package_type: String,

    /// Repository whose packages are cleaned, in the format "owner/repo"
    #[arg(long, env = "GITHUB_REPOSITORY", value_name = "OWNER/REPO")]
    repository: String,

    /// Only versions older than this many days are deleted
    #[arg(long, env = "THRESHOLD_DAYS", default_value_t = 7)]
    threshold_days: u32,

    /// Maven: number of newest matching versions that are always kept
    #[arg(long, env = "THRESHOLD_VERSIONS", default_value_t = 1)]
    threshold_versions: usize,

    /// Comma separated tag patterns to delete (`*`, `?`, `semver`, `?*`)
    #[arg(long, env = "INCLUDED_TAGS", value_delimiter = ',', value_name = "PATTERNS")]
    included_tags: Vec<String>,

    /// Comma separated tag patterns that are never deleted
    #[arg(long, env = "EXCLUDED_TAGS", value_delimiter = ',', value_name = "PATTERNS")]
    excluded_tags: Vec<String>,

    /// Number of deletions sent concurrently
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Stop after this many failed deletions
    #[arg(long, env = "MAX_ERRORS", default_value_t = DEFAULT_MAX_ERRORS)]
    max_errors: usize,

    /// Report what would be deleted without deleting anything
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Verbose logging and per-package plan output
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// GitHub API URL
    #[arg(long, env = "GITHUB_API_URL", value_name = "URL", default_value = "https://api.github.com")]
    api_url: String,

    /// Container registry URL used to resolve image manifests
    #[arg(long, env = "REGISTRY_URL", value_name = "URL", default_value = "https://ghcr.io")]
    registry_url: String,
}

impl From<Cli> for CleanupArgs {
    fn from(cli: Cli) -> Self {
        CleanupArgs {
            package_type: cli.package_type,
            repository: cli.repository,
            threshold_days: cli.threshold_days,
            threshold_versions: cli.threshold_versions,
            included_tags: cli.included_tags,
            excluded_tags: cli.excluded_tags,
            batch_size: cli.batch_size,
            max_errors: cli.max_errors,
            dry_run: cli.dry_run,
            debug: cli.debug,
            api_url: cli.api_url,
            registry_url: cli.registry_url,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = package_cleanup::runtime::RealRuntime;
    cleanup(runtime, cli.into()).await
}
