//! Pre-overwrite safety checks
//!
//! Before a repository directory is pulled over or replaced, it is inspected
//! for work that only exists locally: uncommitted changes, unpushed commits,
//! stash entries. The checker is a best-effort warning mechanism: a corrupted
//! repository or failing git query reports no issues instead of erroring, and
//! the user decides per repository whether to skip, continue, or abort.

use anyhow::{Context, Result};
use chrono::Utc;
use dialoguer::{theme::ColorfulTheme, Select};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::command::{run_command, QUERY_TIMEOUT};

pub const ISSUE_UNCOMMITTED: &str = "uncommitted changes present";
pub const ISSUE_UNPUSHED: &str = "unpushed commits present";
pub const ISSUE_STASH: &str = "stash entries present";

/// Result of inspecting one local clone before a destructive operation.
/// Computed fresh per repository, never cached.
#[derive(Debug, Clone, Default)]
pub struct SafetyReport {
    pub issues: Vec<String>,
}

impl SafetyReport {
    pub fn has_blocking_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// What the user chose to do about a repository with safety issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Leave this repository untouched and move on.
    Skip,
    /// Proceed despite the issues (after an emergency backup).
    Continue,
    /// Stop the entire run immediately.
    Abort,
}

/// Inspect `repo_path` for local-only work.
///
/// A path without version-control metadata yields an empty report: there is
/// nothing to protect. Only reads the repository; never mutates it.
pub async fn check_unpushed_changes(repo_path: &Path) -> SafetyReport {
    if !repo_path.join(".git").exists() {
        return SafetyReport::default();
    }

    let mut issues = Vec::new();

    if let Ok(output) = run_command(
        "git",
        &["status", "--porcelain"],
        Some(repo_path),
        QUERY_TIMEOUT,
    )
    .await
    {
        if output.success() && !output.stdout_trimmed().is_empty() {
            issues.push(ISSUE_UNCOMMITTED.to_string());
        }
    }

    // A non-zero exit here means no upstream is configured, which is an
    // expected state, not an error.
    if let Ok(output) = run_command(
        "git",
        &["log", "@{u}..HEAD", "--oneline"],
        Some(repo_path),
        QUERY_TIMEOUT,
    )
    .await
    {
        if output.success() && !output.stdout_trimmed().is_empty() {
            issues.push(ISSUE_UNPUSHED.to_string());
        }
    }

    if let Ok(output) = run_command("git", &["stash", "list"], Some(repo_path), QUERY_TIMEOUT).await
    {
        if output.success() && !output.stdout_trimmed().is_empty() {
            issues.push(ISSUE_STASH.to_string());
        }
    }

    SafetyReport { issues }
}

/// Ask the user how to handle a repository with safety issues.
pub fn prompt_user_action(repo_name: &str, report: &SafetyReport) -> Result<UserAction> {
    println!("\n⚠️  {} has local work that a sync could destroy:", repo_name);
    for issue in &report.issues {
        println!("   - {}", issue);
    }

    let options = [
        "Skip this repository",
        "Continue anyway (changes may be lost)",
        "Abort the entire run",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do?")
        .items(&options)
        .default(0)
        .interact()
        .context("Safety prompt failed")?;

    Ok(match selection {
        0 => UserAction::Skip,
        1 => UserAction::Continue,
        _ => UserAction::Abort,
    })
}

/// Copy the repository directory aside before overwriting it.
///
/// Best-effort: the caller logs a failure and proceeds, because the user
/// already chose to continue despite the risk.
pub fn create_emergency_backup(repo_path: &Path) -> Result<PathBuf> {
    let name = repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Repository path has no name")?;
    let parent = repo_path.parent().context("Repository path has no parent")?;

    let backup_path = parent.join(format!("{}.backup.{}", name, Utc::now().timestamp()));

    let mut options = fs_extra::dir::CopyOptions::new();
    options.copy_inside = true;

    fs_extra::dir::copy(repo_path, &backup_path, &options)
        .with_context(|| format!("Failed to back up {}", repo_path.display()))?;

    info!(
        "Emergency backup created: {}",
        backup_path.display()
    );
    Ok(backup_path)
}

/// Backup wrapper used by the orchestrator: reports, never fails.
pub fn try_emergency_backup(repo_path: &Path) {
    if let Err(e) = create_emergency_backup(repo_path) {
        warn!(
            "Emergency backup of {} failed ({:#}); continuing as requested",
            repo_path.display(),
            e
        );
    }
}
