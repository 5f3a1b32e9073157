//! Sync orchestration - the top-level batch loop
//!
//! [`SyncEngine`] drives one run: validate configuration, take the process
//! lock, list the owner's repositories, then walk them sequentially through
//! safety checks, retried clone-or-update, and bootstrap steps. Run-level
//! problems (bad config, lock contention, listing failure, empty listing)
//! fail the whole run; individual repository failures are recorded and the
//! loop continues.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bootstrap::{self, Platform};
use crate::config::SyncConfiguration;
use crate::git::{GitSyncer, RepositorySyncer};
use crate::github::{GitHubClient, RepositoryLister};
use crate::lock::ProcessLock;
use crate::safety::{self, UserAction};

/// Aggregate result of one sync run.
///
/// `success` reflects the run itself: configuration, locking, and listing
/// succeeded. Per-repository failures land in `errors` without flipping it.
#[derive(Debug)]
pub struct SyncOutcome {
    pub success: bool,
    /// Names of repositories that completed, in processing order.
    pub synced_repos: Vec<String>,
    /// One record per repository-level or run-level failure.
    pub errors: Vec<anyhow::Error>,
    /// When this outcome was created.
    pub timestamp: DateTime<Utc>,
}

impl SyncOutcome {
    fn new() -> Self {
        Self {
            success: false,
            synced_repos: Vec::new(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The main sync engine for one batch run.
pub struct SyncEngine {
    config: SyncConfiguration,
    platform: Platform,
    lister: Box<dyn RepositoryLister>,
    syncer: Box<dyn RepositorySyncer>,
}

impl SyncEngine {
    /// Engine with the production collaborators: the GitHub lister and the
    /// retrying git syncer.
    pub fn new(config: SyncConfiguration) -> anyhow::Result<Self> {
        let lister = GitHubClient::new(&config)?;
        let syncer = GitSyncer::new(config.clone());

        Ok(Self {
            platform: Platform::detect(),
            lister: Box::new(lister),
            syncer: Box::new(syncer),
            config,
        })
    }

    /// Engine with injected collaborators. Test seam.
    pub fn with_components(
        config: SyncConfiguration,
        lister: Box<dyn RepositoryLister>,
        syncer: Box<dyn RepositorySyncer>,
    ) -> Self {
        Self {
            platform: Platform::detect(),
            lister,
            syncer,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfiguration {
        &self.config
    }

    /// Run one complete sync.
    pub async fn sync_repositories(&self) -> SyncOutcome {
        let mut outcome = SyncOutcome::new();

        // Fail fast before touching the lock or the network.
        if self.config.owner.is_empty() {
            outcome.errors.push(anyhow!(
                "no GitHub owner configured; set --owner, the owner config field, or GITHUB_USER"
            ));
            return outcome;
        }

        // Dry runs mutate nothing, so they may overlap a real run freely.
        let mut lock = ProcessLock::new(&self.config.lock_file);
        if !self.config.dry_run {
            match lock.acquire() {
                Ok(true) => {}
                Ok(false) => {
                    outcome.errors.push(anyhow!(
                        "another sync is already running (lock file: {})",
                        self.config.lock_file
                    ));
                    return outcome;
                }
                Err(e) => {
                    outcome.errors.push(e.context("Failed to set up process lock"));
                    return outcome;
                }
            }
        }

        let success = self.run_locked(&mut outcome).await;
        lock.release();

        outcome.success = success;
        outcome
    }

    /// Steps that execute under the lock. Returns the run-level success flag;
    /// the lock is released by the caller on every path out of here.
    async fn run_locked(&self, outcome: &mut SyncOutcome) -> bool {
        let repos = match self.lister.list_repositories().await {
            Ok(repos) => repos,
            Err(e) => {
                outcome.errors.push(e.context("Failed to list repositories"));
                return false;
            }
        };

        // An empty listing almost always means a wrong owner or an auth
        // problem, so it is a failure rather than a successful no-op.
        if repos.is_empty() {
            outcome.errors.push(anyhow!(
                "no repositories found for owner {}",
                self.config.owner
            ));
            return false;
        }

        info!("Syncing {} repositories", repos.len());

        let dest = self.config.destination_dir();
        if !self.config.dry_run {
            if let Err(e) = std::fs::create_dir_all(&dest) {
                outcome.errors.push(anyhow!(e).context(format!(
                    "Failed to create destination directory {}",
                    dest.display()
                )));
                return false;
            }
        }

        for repo in &repos {
            if let Err(e) = repo.validate() {
                warn!("Skipping invalid repository descriptor: {:#}", e);
                outcome.errors.push(e);
                continue;
            }

            let repo_path = dest.join(&repo.name);

            if repo_path.exists() && !self.config.dry_run && !self.config.force {
                let report = safety::check_unpushed_changes(&repo_path).await;
                if report.has_blocking_issues() {
                    match safety::prompt_user_action(&repo.name, &report) {
                        Ok(UserAction::Abort) => {
                            info!("Run aborted at {} by user choice", repo.name);
                            return true;
                        }
                        Ok(UserAction::Skip) => {
                            info!("{}: skipped by user choice", repo.name);
                            continue;
                        }
                        Ok(UserAction::Continue) => {
                            safety::try_emergency_backup(&repo_path);
                        }
                        Err(e) => {
                            // No usable terminal: treat like a skip, never
                            // overwrite local work silently.
                            warn!("{}: safety prompt unavailable ({:#}); skipping", repo.name, e);
                            continue;
                        }
                    }
                }
            }

            if self.syncer.sync_with_retries(repo).await {
                outcome.synced_repos.push(repo.name.clone());
                bootstrap::bootstrap_repository(&repo_path, self.platform, self.config.dry_run)
                    .await;
            } else {
                outcome.errors.push(anyhow!(
                    "{}: sync failed after {} attempts",
                    repo.name,
                    self.config.max_retries.max(1)
                ));
            }
        }

        true
    }
}
