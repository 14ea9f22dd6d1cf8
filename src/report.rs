//! Markdown run summary.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};

use crate::delete::DeletionResult;
use crate::registry::{PackageType, Version};
use crate::runtime::{Runtime, first_env_var};
use crate::strategy::{PackageVersions, plan_version_count};

pub const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";
pub const EMPTY_PLAN_MESSAGE: &str = "No packages or versions to delete.";

pub struct ReportContext<'a> {
    pub package_type: PackageType,
    pub plan: &'a [PackageVersions],
    pub results: &'a [DeletionResult],
    pub threshold_days: u32,
    pub threshold_date: DateTime<Utc>,
    pub dry_run: bool,
    pub included_patterns: &'a [String],
    pub excluded_patterns: &'a [String],
    /// Set when deletion stopped early.
    pub aborted: Option<&'a str>,
}

pub fn render_summary(ctx: &ReportContext<'_>) -> String {
    if ctx.plan.is_empty() {
        return format!("{}\n", EMPTY_PLAN_MESSAGE);
    }

    let statuses: HashMap<(&str, u64), &DeletionResult> = ctx
        .results
        .iter()
        .map(|r| ((r.package_name.as_str(), r.version_id), r))
        .collect();

    let title = match ctx.package_type {
        PackageType::Container => "Container",
        PackageType::Maven => "Maven",
    };
    let threshold_date = ctx.threshold_date.format("%Y-%m-%d");

    let mut out = String::new();
    let _ = writeln!(
        out,
        "## 🎯 {} Package Cleanup Summary{}\n",
        title,
        if ctx.dry_run { " (Dry Run)" } else { "" }
    );
    let _ = writeln!(
        out,
        "**Threshold:** versions older than **{} days** (created before **{}**)\n",
        ctx.threshold_days, threshold_date
    );
    let _ = writeln!(out, "**Total Packages Processed:** {}  ", ctx.plan.len());
    let _ = writeln!(
        out,
        "**Total Versions Selected:** {}  ",
        plan_version_count(ctx.plan)
    );
    let deleted = ctx.results.iter().filter(|r| r.success).count();
    if ctx.dry_run {
        let _ = writeln!(out, "**Would Delete:** {}\n", deleted);
    } else {
        let _ = writeln!(out, "**Deleted:** {}\n", deleted);
    }

    out.push_str("---\n\n**Parameters:**\n\n");
    let _ = writeln!(out, "- Threshold Days: {}", ctx.threshold_days);
    let _ = writeln!(out, "- Threshold Date: {}", threshold_date);
    let _ = writeln!(
        out,
        "- Included Tags Patterns: {}",
        code_list(ctx.included_patterns)
    );
    let _ = writeln!(
        out,
        "- Excluded Tags Patterns: {}\n",
        code_list(ctx.excluded_patterns)
    );
    out.push_str("---\n\n");

    match ctx.package_type {
        PackageType::Container => {
            out.push_str("| Package | Version ID | Tags | Status |\n|---|---|---|---|\n")
        }
        PackageType::Maven => {
            out.push_str("| Package | Version | Created At | Status |\n|---|---|---|---|\n")
        }
    }

    for entry in ctx.plan {
        let pkg = format!("**{}** (ID: {})", escape(&entry.package.name), entry.package.id);
        for version in &entry.versions {
            let status = status_cell(
                statuses.get(&(entry.package.name.as_str(), version.id)).copied(),
                ctx.dry_run,
            );
            let _ = match ctx.package_type {
                PackageType::Container => writeln!(
                    out,
                    "| {} | `{}` | {} | {} |",
                    pkg,
                    version.id,
                    container_label(version),
                    status
                ),
                PackageType::Maven => writeln!(
                    out,
                    "| {} | `{}` | {} | {} |",
                    pkg,
                    escape(&version.name),
                    version.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    status
                ),
            };
        }
    }

    out.push('\n');
    let failed = ctx.results.iter().any(|r| !r.success);
    match ctx.aborted {
        Some(reason) => {
            let _ = writeln!(out, "❌ Cleanup aborted: {}", escape(reason));
        }
        None if failed => out.push_str("⚠️ Cleanup completed with errors.\n"),
        None => out.push_str("✅ Cleanup operation completed successfully.\n"),
    }

    out
}

/// Appends the summary to the step summary file when one is configured,
/// otherwise prints it.
pub fn publish<R: Runtime + ?Sized>(runtime: &R, summary: &str) -> Result<()> {
    match first_env_var(runtime, &[STEP_SUMMARY_ENV]) {
        Some(path) => {
            debug!("Writing summary to {}", path);
            runtime.append_to_file(Path::new(&path), summary)?;
            info!("Summary written to {}", path);
        }
        None => println!("{}", summary),
    }
    Ok(())
}

fn status_cell(result: Option<&DeletionResult>, dry_run: bool) -> String {
    match result {
        None => "⏭️ not attempted".to_string(),
        Some(r) if r.success && dry_run => "🧪 dry run".to_string(),
        Some(r) if r.success => "✅".to_string(),
        Some(r) if r.skipped => "⚠️ skipped".to_string(),
        Some(r) => format!(
            "❌ {}",
            escape(r.reason.as_deref().unwrap_or("unknown error"))
        ),
    }
}

fn container_label(version: &Version) -> String {
    if version.is_tagged() {
        escape(&version.tags.join(", "))
    } else {
        format!("_{}_", version.digest())
    }
}

fn code_list(patterns: &[String]) -> String {
    if patterns.is_empty() {
        return "<code>None</code>".to_string();
    }
    patterns
        .iter()
        .map(|p| format!("<code>{}</code>", p))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Keeps table cells on one line.
fn escape(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}
