//! Container image retention.
//!
//! Tagged images are selected by age and tag patterns. Untagged versions are
//! either platform manifests referenced by a tagged manifest list (deleted
//! together with their parent tag) or dangling (deleted on their own). Any
//! digest reachable from `latest` or an excluded tag is never touched.

use std::collections::HashSet;

use futures_util::future::join_all;
use log::{debug, info, warn};

use crate::matcher::WildcardMatcher;
use crate::registry::{PackageWithVersions, Registry, Version};

use super::{DeletionPlan, PackageRef, PackageVersions, StrategyContext, lowercase_all};

const LATEST_TAG: &str = "latest";

#[derive(Clone, Default)]
pub struct ContainerStrategy {
    matcher: WildcardMatcher,
}

/// Lowercased run-wide inputs shared by every package.
struct RunInputs<'a> {
    registry: &'a dyn Registry,
    owner: String,
    excluded: Vec<String>,
    included: Vec<String>,
}

impl ContainerStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matcher(matcher: WildcardMatcher) -> Self {
        Self { matcher }
    }

    #[tracing::instrument(skip_all)]
    pub async fn execute(&self, ctx: &StrategyContext<'_>) -> DeletionPlan {
        info!(
            "Executing container strategy on {} package(s)",
            ctx.packages_with_versions.len()
        );

        let inputs = RunInputs {
            registry: ctx.registry,
            owner: ctx.owner.to_lowercase(),
            excluded: lowercase_all(ctx.excluded_patterns),
            included: lowercase_all(ctx.included_patterns),
        };

        let mut plan = Vec::new();
        for entry in ctx.packages_with_versions {
            if let Some(versions) = self.plan_package(ctx, &inputs, entry).await {
                plan.push(versions);
            }
        }
        plan
    }

    async fn plan_package(
        &self,
        ctx: &StrategyContext<'_>,
        inputs: &RunInputs<'_>,
        entry: &PackageWithVersions,
    ) -> Option<PackageVersions> {
        let pkg = &entry.package;
        let versions = &entry.versions;
        let image = pkg.name.to_lowercase();
        let old_enough = |v: &Version| v.created_at <= ctx.threshold_date;

        debug!("[{}] Total versions: {}", pkg.name, versions.len());

        // Protected: latest, excluded tags, and everything their manifests reference
        let protected_tags = self.protected_tags(versions, &inputs.excluded);
        if !protected_tags.is_empty() {
            debug!("[{}] Protected tags: {}", pkg.name, protected_tags.join(", "));
        }

        let mut protected: HashSet<String> = versions
            .iter()
            .filter(|v| self.is_protected(v, &inputs.excluded))
            .map(|v| v.digest().to_string())
            .collect();
        protected.extend(resolve_tags(inputs, &image, &protected_tags).await);

        let candidates: Vec<&Version> = versions
            .iter()
            .filter(|&v| old_enough(v) && !self.is_protected(v, &inputs.excluded))
            .collect();
        debug!(
            "[{}] After date & exclude filter: {} version(s)",
            pkg.name,
            candidates.len()
        );

        let tagged: Vec<&Version> = candidates
            .iter()
            .copied()
            .filter(|v| {
                if inputs.included.is_empty() {
                    v.is_tagged()
                } else {
                    v.tags
                        .iter()
                        .any(|t| self.matcher.matches_any(t, &inputs.included))
                }
            })
            .collect();
        debug!("[{}] Tagged to delete: {}", pkg.name, preview(&tagged));

        // Platform digests per tagged version, in the same order as `tagged`
        let digest_sets: Vec<HashSet<String>> = join_all(
            tagged
                .iter()
                .map(|v| resolve_tags(inputs, &image, &v.tags)),
        )
        .await;
        let referenced: HashSet<&str> = digest_sets
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();

        let arch_layers: Vec<&Version> = candidates
            .iter()
            .copied()
            .filter(|v| {
                !v.is_tagged()
                    && referenced.contains(v.digest())
                    && !protected.contains(v.digest())
            })
            .collect();
        debug!("[{}] Arch layers: {}", pkg.name, preview(&arch_layers));

        let mut ordered: Vec<&Version> = Vec::with_capacity(tagged.len() + arch_layers.len());
        let mut used: HashSet<&str> = HashSet::new();
        for (&tagged_version, digests) in tagged.iter().zip(&digest_sets) {
            ordered.push(tagged_version);
            for &layer in &arch_layers {
                if !used.contains(layer.digest()) && digests.contains(layer.digest()) {
                    ordered.push(layer);
                    used.insert(layer.digest());
                }
            }
        }

        let in_plan: HashSet<&str> = ordered.iter().map(|v| v.digest()).collect();
        let dangling: Vec<&Version> = versions
            .iter()
            .filter(|&v| {
                old_enough(v)
                    && !v.is_tagged()
                    && !referenced.contains(v.digest())
                    && !protected.contains(v.digest())
                    && !in_plan.contains(v.digest())
            })
            .collect();
        debug!("[{}] Dangling: {}", pkg.name, preview(&dangling));

        let to_delete: Vec<Version> = ordered
            .into_iter()
            .chain(dangling)
            .cloned()
            .collect();

        if to_delete.is_empty() {
            if ctx.debug {
                info!("Nothing to delete for {}", pkg.name);
            }
            return None;
        }

        if ctx.debug {
            let names: Vec<&str> = to_delete.iter().map(|v| v.name.as_str()).collect();
            info!("To delete for {}: {}", pkg.name, names.join(", "));
        }

        Some(PackageVersions {
            package: PackageRef::from(pkg),
            versions: to_delete,
        })
    }

    /// A version is protected when it carries `latest` or any excluded tag.
    fn is_protected(&self, version: &Version, excluded: &[String]) -> bool {
        version.has_tag(LATEST_TAG)
            || version
                .tags
                .iter()
                .any(|t| self.matcher.matches_any(t, excluded))
    }

    /// Unique protected tags across all versions, in listing order.
    fn protected_tags(&self, versions: &[Version], excluded: &[String]) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in versions.iter().flat_map(|v| &v.tags) {
            let protected =
                tag.eq_ignore_ascii_case(LATEST_TAG) || self.matcher.matches_any(tag, excluded);
            if protected && !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}

/// Resolves manifest digests for every tag concurrently. A failed lookup is
/// logged and contributes nothing.
async fn resolve_tags(inputs: &RunInputs<'_>, image: &str, tags: &[String]) -> HashSet<String> {
    let lookups = tags.iter().map(|tag| async move {
        match inputs
            .registry
            .get_manifest_digests(&inputs.owner, image, tag)
            .await
        {
            Ok(digests) => digests,
            Err(e) => {
                warn!("Failed to fetch manifest for {}:{}: {:#}", image, tag, e);
                Vec::new()
            }
        }
    });

    join_all(lookups).await.into_iter().flatten().collect()
}

fn preview(versions: &[&Version]) -> String {
    if versions.is_empty() {
        return "none".to_string();
    }
    let names: Vec<&str> = versions.iter().map(|v| v.name.as_str()).collect();
    format!("({}) {}", versions.len(), names.join(", "))
}
