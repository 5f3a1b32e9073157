//! Per-repository bootstrap steps
//!
//! After a repository syncs successfully it gets three best-effort setup
//! passes: gitignore entries merged in, editor settings applied, and a
//! language environment provisioned when the project type is recognized.
//! None of these can revoke a completed sync; failures are logged and the
//! batch moves on.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{is_command_available, run_command};

/// Environment provisioning can legitimately take a while on first sync.
const ENV_TIMEOUT: Duration = Duration::from_secs(600);

/// Host platform, resolved once at startup and threaded down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    Wsl,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else if is_wsl() {
            Platform::Wsl
        } else {
            Platform::Linux
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Wsl => "wsl",
        }
    }
}

fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|version| version.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Entries merged into every repository's `.gitignore`.
const RECOMMENDED_GITIGNORE: &[&str] = &[
    ".env",
    ".env.local",
    "*.log",
    "logs/",
    ".DS_Store",
    "Thumbs.db",
    ".idea/",
    "*.swp",
    "*~",
    "__pycache__/",
    "*.py[cod]",
    ".venv/",
    "venv/",
    ".pytest_cache/",
    ".coverage",
    "node_modules/",
    "dist/",
    "build/",
];

/// Marker files identifying a Python project.
const PYTHON_MARKERS: &[&str] = &[
    "pyproject.toml",
    "requirements.txt",
    "setup.py",
    "Pipfile",
    "setup.cfg",
    "poetry.lock",
];

/// Editor settings body per platform. Kept deliberately small; the value is
/// in the consistent placement and backup behavior, not the contents.
fn editor_settings(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => {
            "{\n  \"files.eol\": \"\\n\",\n  \"files.trimTrailingWhitespace\": true,\n  \"terminal.integrated.defaultProfile.windows\": \"PowerShell\"\n}\n"
        }
        _ => {
            "{\n  \"files.eol\": \"\\n\",\n  \"files.trimTrailingWhitespace\": true,\n  \"files.insertFinalNewline\": true\n}\n"
        }
    }
}

/// Run all bootstrap steps for one synced repository, best-effort.
pub async fn bootstrap_repository(repo_path: &Path, platform: Platform, dry_run: bool) {
    if !apply_gitignore(repo_path, dry_run) {
        warn!("{}: gitignore setup failed", repo_path.display());
    }
    if !apply_editor_template(repo_path, platform, dry_run) {
        warn!("{}: editor template failed", repo_path.display());
    }
    if !setup_environment(repo_path, dry_run).await {
        warn!("{}: environment setup failed", repo_path.display());
    }
}

/// Merge the recommended entries into the repository's `.gitignore`.
///
/// Existing content is preserved and entries already present are not
/// duplicated, so repeated runs converge after the first.
pub fn apply_gitignore(repo_path: &Path, dry_run: bool) -> bool {
    let gitignore_path = repo_path.join(".gitignore");
    let existing = std::fs::read_to_string(&gitignore_path).unwrap_or_default();

    let present: HashSet<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = RECOMMENDED_GITIGNORE
        .iter()
        .filter(|entry| !present.contains(**entry))
        .copied()
        .collect();

    if missing.is_empty() {
        debug!("{}: gitignore already up to date", repo_path.display());
        return true;
    }

    if dry_run {
        info!(
            "{}: would add {} gitignore entries",
            repo_path.display(),
            missing.len()
        );
        return true;
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str("# repodock recommended ignores\n");
    for entry in &missing {
        content.push_str(entry);
        content.push('\n');
    }

    match std::fs::write(&gitignore_path, content) {
        Ok(()) => {
            info!(
                "{}: added {} gitignore entries",
                repo_path.display(),
                missing.len()
            );
            true
        }
        Err(e) => {
            warn!("{}: could not write .gitignore: {}", repo_path.display(), e);
            false
        }
    }
}

/// Write platform-appropriate editor settings into `.vscode/`.
///
/// A pre-existing `.vscode` directory is moved aside to a timestamped backup
/// before the template is written.
pub fn apply_editor_template(repo_path: &Path, platform: Platform, dry_run: bool) -> bool {
    let vscode_path = repo_path.join(".vscode");

    if dry_run {
        info!(
            "{}: would apply {} editor settings",
            repo_path.display(),
            platform.name()
        );
        return true;
    }

    match write_editor_template(repo_path, &vscode_path, platform) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "{}: editor template failed: {:#}",
                repo_path.display(),
                e
            );
            false
        }
    }
}

fn write_editor_template(repo_path: &Path, vscode_path: &Path, platform: Platform) -> Result<()> {
    if vscode_path.exists() {
        let backup_path = repo_path.join(format!(".vscode.bak.{}", Utc::now().timestamp()));
        std::fs::rename(vscode_path, &backup_path)
            .context("Failed to back up existing .vscode directory")?;
        info!(
            "{}: existing editor settings backed up to {}",
            repo_path.display(),
            backup_path.display()
        );
    }

    std::fs::create_dir_all(vscode_path).context("Failed to create .vscode directory")?;
    std::fs::write(vscode_path.join("settings.json"), editor_settings(platform))
        .context("Failed to write settings.json")?;

    info!("{}: editor settings applied", repo_path.display());
    Ok(())
}

/// Provision an isolated environment for recognized project types.
///
/// Currently detects Python projects and provisions them with `uv`. Anything
/// unrecognized, and any machine without `uv`, is a successful no-op.
pub async fn setup_environment(repo_path: &Path, dry_run: bool) -> bool {
    if !is_python_project(repo_path) {
        return true;
    }

    if dry_run {
        info!("{}: would set up Python environment", repo_path.display());
        return true;
    }

    if !is_command_available("uv").await {
        warn!(
            "{}: uv is not installed, skipping environment setup",
            repo_path.display()
        );
        return true;
    }

    info!("{}: setting up Python environment", repo_path.display());

    let steps: Vec<Vec<&str>> = if repo_path.join("pyproject.toml").exists() {
        let mut steps = Vec::new();
        if !repo_path.join("uv.lock").exists() {
            steps.push(vec!["lock"]);
        }
        steps.push(vec!["venv"]);
        steps.push(vec!["sync"]);
        steps
    } else if repo_path.join("requirements.txt").exists() {
        vec![
            vec!["venv"],
            vec!["pip", "install", "-r", "requirements.txt"],
        ]
    } else {
        // Recognized as Python by other markers, but there is nothing for uv
        // to install from.
        return true;
    };

    for step in steps {
        match run_command("uv", &step, Some(repo_path), ENV_TIMEOUT).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(
                    "{}: uv {} failed: {}",
                    repo_path.display(),
                    step.join(" "),
                    output.stderr_trimmed()
                );
                return false;
            }
            Err(e) => {
                warn!(
                    "{}: uv {} failed: {:#}",
                    repo_path.display(),
                    step.join(" "),
                    e
                );
                return false;
            }
        }
    }

    info!("{}: Python environment ready", repo_path.display());
    true
}

fn is_python_project(repo_path: &Path) -> bool {
    PYTHON_MARKERS
        .iter()
        .any(|marker| repo_path.join(marker).exists())
}
