//! Preflight diagnostics for the `doctor` command
//!
//! Verifies the pieces a sync run depends on: a git binary, some form of
//! GitHub authentication, a writable destination, and (as a warning only)
//! SSH key material.

use std::path::Path;

use crate::command::is_command_available;
use crate::config::SyncConfiguration;

/// Result of an individual preflight check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            is_warning: false,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            is_warning: true,
        }
    }
}

/// All preflight checks for one configuration.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub git: CheckResult,
    pub auth: CheckResult,
    pub destination: CheckResult,
    pub ssh: CheckResult,
}

impl HealthCheck {
    pub async fn run(config: &SyncConfiguration) -> Self {
        Self {
            git: check_git().await,
            auth: check_auth(config),
            destination: check_destination(config),
            ssh: check_ssh(),
        }
    }

    pub fn all_checks(&self) -> Vec<(&'static str, &CheckResult)> {
        vec![
            ("Git", &self.git),
            ("GitHub authentication", &self.auth),
            ("Destination", &self.destination),
            ("SSH", &self.ssh),
        ]
    }

    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, check)| check.passed)
    }
}

async fn check_git() -> CheckResult {
    if is_command_available("git").await {
        CheckResult::ok("git is installed")
    } else {
        CheckResult::error("git was not found in PATH; install git to sync repositories")
    }
}

fn check_auth(config: &SyncConfiguration) -> CheckResult {
    if config.github.token.is_some() {
        CheckResult::ok("GitHub token detected")
    } else {
        CheckResult::warning(
            "no GitHub token found (set GITHUB_TOKEN or run `gh auth login`); \
             private repositories will be missing",
        )
    }
}

fn check_destination(config: &SyncConfiguration) -> CheckResult {
    let dest = config.destination_dir();

    if dest.as_os_str().is_empty() {
        return CheckResult::error("destination directory is not configured");
    }

    // The directory itself is created on demand; what matters is that the
    // closest existing ancestor is writable.
    let mut probe: &Path = &dest;
    while !probe.exists() {
        match probe.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => probe = parent,
            _ => break,
        }
    }

    if probe.exists() {
        let writable = !std::fs::metadata(probe)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(true);
        if writable {
            CheckResult::ok(format!("destination {} is usable", dest.display()))
        } else {
            CheckResult::error(format!(
                "destination {} is not writable (checked {})",
                dest.display(),
                probe.display()
            ))
        }
    } else {
        CheckResult::error(format!(
            "no existing ancestor found for destination {}",
            dest.display()
        ))
    }
}

fn check_ssh() -> CheckResult {
    let ssh_dir = dirs::home_dir().map(|home| home.join(".ssh"));

    let has_key = ssh_dir
        .as_ref()
        .map(|dir| {
            ["id_ed25519", "id_rsa", "id_ecdsa"]
                .iter()
                .any(|key| dir.join(key).exists())
        })
        .unwrap_or(false);

    if has_key {
        CheckResult::ok("SSH key material found")
    } else {
        CheckResult::warning("no SSH keys found; clones will fall back to HTTPS")
    }
}
