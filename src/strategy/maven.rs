use log::{debug, info};

use crate::matcher::WildcardMatcher;
use crate::registry::Version;

use super::{DeletionPlan, PackageRef, PackageVersions, StrategyContext, lowercase_all};

/// Maven retention: matches version names against the patterns and keeps the
/// newest `threshold_versions` eligible versions of each package.
#[derive(Clone, Default)]
pub struct MavenStrategy {
    matcher: WildcardMatcher,
}

impl MavenStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher(matcher: WildcardMatcher) -> Self {
        Self { matcher }
    }

    #[tracing::instrument(skip_all)]
    pub fn execute(&self, ctx: &StrategyContext<'_>) -> DeletionPlan {
        info!(
            "Executing maven strategy on {} package(s)",
            ctx.packages_with_versions.len()
        );

        let excluded = lowercase_all(ctx.excluded_patterns);
        let included = lowercase_all(ctx.included_patterns);
        let mut plan = Vec::new();

        for entry in ctx.packages_with_versions {
            let pkg = &entry.package;

            // The only version of a package is never deleted
            if entry.versions.len() <= 1 {
                debug!("[{}] Single version, skipping", pkg.name);
                continue;
            }

            let mut eligible: Vec<&Version> = entry
                .versions
                .iter()
                .filter(|v| {
                    v.created_at <= ctx.threshold_date
                        && !self.matcher.matches_any(&v.name, &excluded)
                        && self.matcher.matches_any(&v.name, &included)
                })
                .collect();

            if eligible.is_empty() || eligible.len() <= ctx.threshold_versions {
                debug!(
                    "[{}] {} eligible version(s), keeping all (threshold {})",
                    pkg.name,
                    eligible.len(),
                    ctx.threshold_versions
                );
                continue;
            }

            eligible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let to_delete: Vec<Version> = eligible
                .into_iter()
                .skip(ctx.threshold_versions)
                .cloned()
                .collect();

            if ctx.debug {
                let names: Vec<&str> = to_delete.iter().map(|v| v.name.as_str()).collect();
                info!("To delete for {}: {}", pkg.name, names.join(", "));
            }

            plan.push(PackageVersions {
                package: PackageRef::from(pkg),
                versions: to_delete,
            });
        }

        plan
    }
}
