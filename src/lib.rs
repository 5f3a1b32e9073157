//! RepoDock - Bulk GitHub Repository Synchronization
//!
//! RepoDock clones or updates every repository of a GitHub owner into one
//! destination directory, protecting local-only work (uncommitted changes,
//! unpushed commits, stashes) behind an interactive safety check, retrying
//! transient clone failures, and bootstrapping each synced repository with
//! gitignore entries, editor settings, and a language environment.
//!
//! ## Modules
//!
//! - [`config`]: layered configuration resolution
//! - [`github`]: repository listing via the GitHub REST API
//! - [`git`]: clone-or-update with URL selection and bounded retries
//! - [`safety`]: pre-overwrite checks, user prompt, emergency backups
//! - [`lock`]: cross-process run lock
//! - [`sync`]: the orchestration loop
//! - [`bootstrap`]: per-repository setup steps
//! - [`health`]: preflight diagnostics

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod git;
pub mod github;
pub mod health;
pub mod lock;
pub mod safety;
pub mod sync;

pub use bootstrap::Platform;
pub use config::{ConfigOverlay, SyncConfiguration};
pub use git::{GitSyncer, RepositorySyncer};
pub use github::{GitHubClient, RepositoryDescriptor, RepositoryLister};
pub use health::HealthCheck;
pub use lock::ProcessLock;
pub use safety::{SafetyReport, UserAction};
pub use sync::{SyncEngine, SyncOutcome};
