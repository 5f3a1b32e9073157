//! Git synchronization: clone-or-update, URL selection, bounded retries
//!
//! [`GitSyncer`] performs one idempotent clone-or-pull per repository and
//! wraps it in a retry loop that removes partial clones between attempts.
//! Every git invocation goes through the [`crate::command`] seam; failures are
//! structural (`bool`) and diagnostics go to the log, so one bad repository
//! never aborts the batch.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::command::{run_command, CommandOutput, GIT_TIMEOUT, QUERY_TIMEOUT};
use crate::config::SyncConfiguration;
use crate::github::RepositoryDescriptor;

/// Hard upper bound on the SSH connectivity probe; it can run once per
/// repository in the worst case and must never stall the batch.
const SSH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between retry attempts, letting transient network failures clear.
const RETRY_DELAY: Duration = Duration::from_secs(1);

const STASH_MESSAGE: &str = "repodock autostash";

/// Outcome of the SSH connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshProbe {
    Usable,
    Unusable,
}

/// Performs retried clone-or-update operations for single repositories.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositorySyncer: Send + Sync {
    /// Sync one repository with up to `max_retries` attempts.
    /// Returns true on the first successful attempt.
    async fn sync_with_retries(&self, repo: &RepositoryDescriptor) -> bool;
}

/// Git operations handler for one sync run.
pub struct GitSyncer {
    config: SyncConfiguration,
    ssh_dir: PathBuf,
}

impl GitSyncer {
    pub fn new(config: SyncConfiguration) -> Self {
        let ssh_dir = dirs::home_dir()
            .map(|home| home.join(".ssh"))
            .unwrap_or_default();
        Self { config, ssh_dir }
    }

    /// Syncer probing an alternate SSH key directory. Test affordance.
    pub fn with_ssh_dir(config: SyncConfiguration, ssh_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            ssh_dir: ssh_dir.into(),
        }
    }

    /// Local path for a repository under the configured destination.
    pub fn repo_path(&self, repo: &RepositoryDescriptor) -> PathBuf {
        self.config.destination_dir().join(&repo.name)
    }

    /// Decide the clone URL for a repository.
    ///
    /// HTTPS preference short-circuits everything. Otherwise SSH is used only
    /// when key material exists locally and a bounded handshake probe against
    /// github.com succeeds; any probe failure falls back to HTTPS. This is a
    /// best-effort preference, never a fatal condition.
    pub async fn select_clone_url(&self, repo: &RepositoryDescriptor) -> String {
        if self.config.use_https {
            return repo.clone_url_https.clone();
        }

        if !has_ssh_key(&self.ssh_dir) {
            debug!("No SSH keys in {}, using HTTPS", self.ssh_dir.display());
            return repo.clone_url_https.clone();
        }

        match probe_ssh().await {
            SshProbe::Usable => {
                ssh_candidate(repo).unwrap_or_else(|| repo.clone_url_https.clone())
            }
            SshProbe::Unusable => {
                debug!("SSH probe failed, falling back to HTTPS");
                repo.clone_url_https.clone()
            }
        }
    }

    /// One clone-or-update attempt. Returns true on success.
    pub async fn sync_once(&self, repo: &RepositoryDescriptor) -> bool {
        let repo_path = self.repo_path(repo);

        if repo_path.join(".git").exists() {
            self.update_repository(repo, &repo_path).await
        } else if self.config.sync_only {
            info!("{}: not present locally, skipping (sync-only)", repo.name);
            true
        } else {
            self.clone_repository(repo, &repo_path).await
        }
    }

    async fn clone_repository(&self, repo: &RepositoryDescriptor, repo_path: &Path) -> bool {
        if self.config.dry_run {
            info!(
                "{}: would clone {} into {}",
                repo.name,
                repo.clone_url_https,
                repo_path.display()
            );
            return true;
        }

        let url = self.select_clone_url(repo).await;
        if url.is_empty() {
            warn!("{}: no usable clone URL", repo.name);
            return false;
        }

        info!("{}: cloning into {}", repo.name, repo_path.display());

        let target = repo_path.to_string_lossy();
        match run_command("git", &["clone", &url, &target], None, GIT_TIMEOUT).await {
            Ok(output) if output.success() => {
                info!("{}: clone complete", repo.name);
                true
            }
            Ok(output) => {
                warn!("{}: clone failed: {}", repo.name, output.stderr_trimmed());
                false
            }
            Err(e) => {
                warn!("{}: clone failed: {:#}", repo.name, e);
                false
            }
        }
    }

    async fn update_repository(&self, repo: &RepositoryDescriptor, repo_path: &Path) -> bool {
        if self.config.dry_run {
            info!("{}: would pull latest changes", repo.name);
            return true;
        }

        info!("{}: updating", repo.name);

        let mut stashed = false;
        if self.config.auto_stash {
            stashed = self.stash_changes(repo, repo_path).await;
        }

        let pulled = match run_command(
            "git",
            &["pull", "--rebase"],
            Some(repo_path),
            GIT_TIMEOUT,
        )
        .await
        {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!("{}: pull failed: {}", repo.name, output.stderr_trimmed());
                false
            }
            Err(e) => {
                warn!("{}: pull failed: {:#}", repo.name, e);
                false
            }
        };

        if !pulled {
            // A failed rebase pull leaves the repository mid-rebase; the stash
            // cannot be restored onto that, so back out first.
            let _ = run_command("git", &["rebase", "--abort"], Some(repo_path), QUERY_TIMEOUT)
                .await;
        }

        if stashed {
            self.restore_stash(repo, repo_path).await;
        }

        if pulled {
            info!("{}: update complete", repo.name);
        }
        pulled
    }

    /// Stash uncommitted changes, if any. Returns true iff a stash was made.
    async fn stash_changes(&self, repo: &RepositoryDescriptor, repo_path: &Path) -> bool {
        let status = match run_command(
            "git",
            &["status", "--porcelain"],
            Some(repo_path),
            QUERY_TIMEOUT,
        )
        .await
        {
            Ok(output) if output.success() => output,
            _ => return false,
        };

        if status.stdout_trimmed().is_empty() {
            return false;
        }

        info!("{}: stashing uncommitted changes", repo.name);
        match run_command(
            "git",
            &["stash", "push", "-u", "-m", STASH_MESSAGE],
            Some(repo_path),
            QUERY_TIMEOUT,
        )
        .await
        {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!("{}: stash failed: {}", repo.name, output.stderr_trimmed());
                false
            }
            Err(e) => {
                warn!("{}: stash failed: {:#}", repo.name, e);
                false
            }
        }
    }

    /// Restore previously stashed changes. Failures are reported but never
    /// change the sync result.
    async fn restore_stash(&self, repo: &RepositoryDescriptor, repo_path: &Path) {
        match run_command("git", &["stash", "pop"], Some(repo_path), QUERY_TIMEOUT).await {
            Ok(output) if output.success() => {
                info!("{}: restored stashed changes", repo.name);
            }
            Ok(output) => {
                warn!(
                    "{}: could not restore stashed changes ({}); run `git stash pop` manually",
                    repo.name,
                    output.stderr_trimmed()
                );
            }
            Err(e) => {
                warn!(
                    "{}: could not restore stashed changes ({:#}); run `git stash pop` manually",
                    repo.name, e
                );
            }
        }
    }
}

#[async_trait]
impl RepositorySyncer for GitSyncer {
    async fn sync_with_retries(&self, repo: &RepositoryDescriptor) -> bool {
        let repo_path = self.repo_path(repo);
        with_retries(
            &repo.name,
            &repo_path,
            self.config.max_retries,
            self.config.dry_run,
            |_| Box::pin(self.sync_once(repo)),
        )
        .await
    }
}

/// Bounded retry loop around one repository attempt.
///
/// Between a failed attempt and the next one (never in dry-run), any
/// directory left at the target path is removed so the retry starts clean;
/// the dominant failure mode is a partial clone from an interrupted transfer,
/// which would fail deterministically on reuse.
pub(crate) async fn with_retries<'a, F>(
    name: &str,
    target_path: &Path,
    max_retries: u32,
    dry_run: bool,
    mut attempt: F,
) -> bool
where
    F: FnMut(u32) -> BoxFuture<'a, bool>,
{
    let attempts = max_retries.max(1);

    for n in 1..=attempts {
        info!("{}: attempt {}/{}", name, n, attempts);

        if attempt(n).await {
            return true;
        }

        if n < attempts && !dry_run {
            if target_path.exists() {
                debug!("{}: removing partial directory before retry", name);
                if let Err(e) = tokio::fs::remove_dir_all(target_path).await {
                    debug!("{}: cleanup failed: {}", name, e);
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    error!("{}: giving up after {} attempts", name, attempts);
    false
}

/// SSH candidate URL for a repository: its own ssh_url, else one synthesized
/// from the full name, else nothing.
fn ssh_candidate(repo: &RepositoryDescriptor) -> Option<String> {
    match repo.clone_url_ssh.as_deref() {
        Some(url) if !url.is_empty() => Some(url.to_string()),
        _ if !repo.full_name.is_empty() => {
            Some(format!("git@github.com:{}.git", repo.full_name))
        }
        _ => None,
    }
}

/// Whether default private key material exists in the given SSH directory.
fn has_ssh_key(ssh_dir: &Path) -> bool {
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .any(|key| ssh_dir.join(key).exists())
}

/// Probe SSH connectivity to github.com in batch mode.
async fn probe_ssh() -> SshProbe {
    let result = run_command(
        "ssh",
        &["-o", "BatchMode=yes", "-o", "ConnectTimeout=3", "git@github.com"],
        None,
        SSH_PROBE_TIMEOUT,
    )
    .await;

    classify_probe(result)
}

/// Exit 0 means the handshake succeeded; exit 1 means the host answered and
/// rejected the session after authentication, which still proves SSH works.
/// Everything else (timeout, spawn failure, other codes) means unusable.
fn classify_probe(result: Result<CommandOutput>) -> SshProbe {
    match result {
        Ok(output) if matches!(output.code, Some(0) | Some(1)) => SshProbe::Usable,
        Ok(output) => {
            debug!("SSH probe exited with {:?}", output.code);
            SshProbe::Unusable
        }
        Err(e) => {
            debug!("SSH probe failed: {:#}", e);
            SshProbe::Unusable
        }
    }
}
