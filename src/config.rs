use anyhow::{Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Resolved options governing one sync run.
///
/// Built once per invocation from defaults, environment, the config file, the
/// local override file, and CLI flags (highest-specificity source wins per
/// field); immutable afterwards.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfiguration {
    /// GitHub owner (user or organization) whose repositories are synced.
    /// Auto-detected from `GITHUB_USER` or `git config --global user.name`
    /// when not set here or on the command line.
    #[serde(default)]
    pub owner: String,

    /// Destination directory that receives one subdirectory per repository.
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Always clone over HTTPS, skipping the SSH probe.
    #[serde(default)]
    pub use_https: bool,

    /// Report every decision without mutating anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Skip safety checks and overwrite repositories with local changes.
    #[serde(default)]
    pub force: bool,

    /// Attempts per repository before giving up (minimum 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Stash uncommitted changes around pulls and restore them afterwards.
    #[serde(default)]
    pub auto_stash: bool,

    /// Only update repositories that already exist locally; never clone.
    #[serde(default)]
    pub sync_only: bool,

    /// Lock file guarding against concurrent runs.
    #[serde(default = "default_lock_file")]
    pub lock_file: String,

    /// GitHub listing settings
    #[serde(default)]
    pub github: GithubConfig,
}

/// GitHub listing and filtering configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GithubConfig {
    /// API token. Falls back to `GITHUB_TOKEN`, then `gh auth token`.
    pub token: Option<String>,

    /// Repository name patterns to exclude (simple globs, `*` wildcard).
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Include forked repositories
    #[serde(default)]
    pub include_forks: bool,

    /// Include archived repositories
    #[serde(default)]
    pub include_archived: bool,
}

/// Per-field override layer, used for `config.local.yml` and CLI flags.
///
/// Only fields present in the source are applied; everything else keeps the
/// value from the lower-precedence layer.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigOverlay {
    pub owner: Option<String>,
    pub destination: Option<String>,
    pub use_https: Option<bool>,
    pub dry_run: Option<bool>,
    pub force: Option<bool>,
    pub max_retries: Option<u32>,
    pub auto_stash: Option<bool>,
    pub sync_only: Option<bool>,
    pub lock_file: Option<String>,
}

// Default value functions
fn default_destination() -> String {
    "${HOME}/workspace".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_lock_file() -> String {
    std::env::temp_dir()
        .join("repodock-sync.lock")
        .to_string_lossy()
        .into_owned()
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            owner: String::new(),
            destination: default_destination(),
            use_https: false,
            dry_run: false,
            force: false,
            max_retries: default_max_retries(),
            auto_stash: false,
            sync_only: false,
            lock_file: default_lock_file(),
            github: GithubConfig::default(),
        }
    }
}

impl SyncConfiguration {
    /// Resolve the configuration for one run.
    ///
    /// Layering, lowest to highest precedence: built-in defaults, environment
    /// auto-detection, `config.yml`, `config.local.yml`, then the CLI overlay
    /// the caller applies via [`SyncConfiguration::apply_overlay`].
    pub fn resolve(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Self::load_default_files()?,
        };

        if config.owner.is_empty() {
            if let Some(owner) = detect_owner() {
                debug!("Auto-detected GitHub owner: {}", owner);
                config.owner = owner;
            }
        }

        if config.github.token.is_none() {
            config.github.token = detect_token();
        }

        config.expand_paths()?;
        config.max_retries = config.max_retries.max(1);

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SyncConfiguration = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `config.yml` from the default location and apply
    /// `config.local.yml` on top of it; defaults when neither exists.
    fn load_default_files() -> Result<Self> {
        let base_path = Self::default_config_path()?;

        let mut config = if base_path.exists() {
            Self::load(&base_path)?
        } else {
            Self::default()
        };

        let local_path = Self::local_config_path()?;
        if local_path.exists() {
            let content = std::fs::read_to_string(&local_path)
                .with_context(|| format!("Failed to read local config: {}", local_path.display()))?;
            let overlay: ConfigOverlay = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse local config: {}", local_path.display()))?;
            config.apply_overlay(&overlay);
        }

        Ok(config)
    }

    /// Apply a higher-precedence layer (local override file or CLI flags).
    pub fn apply_overlay(&mut self, overlay: &ConfigOverlay) {
        if let Some(owner) = &overlay.owner {
            self.owner = owner.clone();
        }
        if let Some(destination) = &overlay.destination {
            self.destination = destination.clone();
        }
        if let Some(use_https) = overlay.use_https {
            self.use_https = use_https;
        }
        if let Some(dry_run) = overlay.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(force) = overlay.force {
            self.force = force;
        }
        if let Some(max_retries) = overlay.max_retries {
            self.max_retries = max_retries.max(1);
        }
        if let Some(auto_stash) = overlay.auto_stash {
            self.auto_stash = auto_stash;
        }
        if let Some(sync_only) = overlay.sync_only {
            self.sync_only = sync_only;
        }
        if let Some(lock_file) = &overlay.lock_file {
            self.lock_file = lock_file.clone();
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;
        Ok(config_dir.join("repodock").join("config.yml"))
    }

    /// Machine-local override file beside the main config.
    pub fn local_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;
        Ok(config_dir.join("repodock").join("config.local.yml"))
    }

    /// Expand environment variables and `~` in configured paths.
    pub fn expand_paths(&mut self) -> Result<()> {
        self.destination = shellexpand::full(&self.destination)
            .context("Failed to expand destination path")?
            .into_owned();

        self.lock_file = shellexpand::full(&self.lock_file)
            .context("Failed to expand lock_file path")?
            .into_owned();

        Ok(())
    }

    /// Destination directory as a normalized path.
    pub fn destination_dir(&self) -> PathBuf {
        PathBuf::from(&self.destination).clean()
    }
}

/// Auto-detect the GitHub owner: `GITHUB_USER`, then the global git identity.
fn detect_owner() -> Option<String> {
    if let Ok(user) = std::env::var("GITHUB_USER") {
        if !user.is_empty() {
            return Some(user);
        }
    }

    let output = Command::new("git")
        .args(["config", "--global", "user.name"])
        .output()
        .ok()?;

    if output.status.success() {
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !name.is_empty() {
            return Some(name);
        }
    }

    None
}

/// Auto-detect an API token: `GITHUB_TOKEN`, then the gh CLI.
fn detect_token() -> Option<String> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        if !token.is_empty() {
            debug!("Using token from GITHUB_TOKEN");
            return Some(token);
        }
    }

    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if output.status.success() {
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !token.is_empty() {
            debug!("Using token from gh CLI");
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_default_values() {
        let config = SyncConfiguration::default();

        assert!(config.owner.is_empty());
        assert_eq!(config.destination, "${HOME}/workspace");
        assert!(!config.use_https);
        assert!(!config.dry_run);
        assert!(!config.force);
        assert_eq!(config.max_retries, 2);
        assert!(!config.auto_stash);
        assert!(!config.sync_only);
        assert!(config.lock_file.ends_with("repodock-sync.lock"));
        assert!(!config.github.include_forks);
        assert!(!config.github.include_archived);
        assert!(config.github.exclude_patterns.is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
owner: "octocat"
destination: "/srv/repos"
use_https: true
max_retries: 5
auto_stash: true
github:
  exclude_patterns:
    - "archived-*"
    - "*.github.io"
  include_forks: true
"#;

        let config: SyncConfiguration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.owner, "octocat");
        assert_eq!(config.destination, "/srv/repos");
        assert!(config.use_https);
        assert_eq!(config.max_retries, 5);
        assert!(config.auto_stash);
        assert!(!config.sync_only);
        assert_eq!(config.github.exclude_patterns.len(), 2);
        assert!(config.github.include_forks);
    }

    #[test]
    fn test_overlay_wins_per_field() {
        let mut config = SyncConfiguration {
            owner: "base-owner".to_string(),
            max_retries: 4,
            ..Default::default()
        };

        let overlay = ConfigOverlay {
            owner: Some("local-owner".to_string()),
            sync_only: Some(true),
            ..Default::default()
        };
        config.apply_overlay(&overlay);

        assert_eq!(config.owner, "local-owner");
        assert!(config.sync_only);
        // Untouched fields keep their lower-layer values.
        assert_eq!(config.max_retries, 4);
    }

    #[test]
    fn test_overlay_clamps_max_retries() {
        let mut config = SyncConfiguration::default();
        let overlay = ConfigOverlay {
            max_retries: Some(0),
            ..Default::default()
        };
        config.apply_overlay(&overlay);

        assert_eq!(config.max_retries, 1);
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        env::set_var("REPODOCK_TEST_HOME", "/test/home");

        let mut config = SyncConfiguration {
            destination: "${REPODOCK_TEST_HOME}/dev".to_string(),
            ..Default::default()
        };
        config.expand_paths().unwrap();

        assert_eq!(config.destination, "/test/home/dev");
        assert_eq!(config.destination_dir(), PathBuf::from("/test/home/dev"));

        env::remove_var("REPODOCK_TEST_HOME");
    }

    #[test]
    fn test_destination_dir_is_cleaned() {
        let config = SyncConfiguration {
            destination: "/srv/repos/./nested/..".to_string(),
            ..Default::default()
        };

        assert_eq!(config.destination_dir(), PathBuf::from("/srv/repos"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");

        let mut config = SyncConfiguration::default();
        config.owner = "someone".to_string();
        config.destination = "/custom/path".to_string();
        config.github.exclude_patterns = vec!["test-*".to_string()];

        config.save(&path).unwrap();
        let loaded = SyncConfiguration::load(&path).unwrap();

        assert_eq!(loaded.owner, "someone");
        assert_eq!(loaded.destination, "/custom/path");
        assert_eq!(loaded.github.exclude_patterns, vec!["test-*".to_string()]);
    }

    #[test]
    fn test_load_nonexistent_file_fails() {
        let result = SyncConfiguration::load(Path::new("/nonexistent/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        std::fs::write(&path, "owner: [unterminated").unwrap();

        let result = SyncConfiguration::load(&path);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_detect_owner_prefers_env() {
        env::set_var("GITHUB_USER", "env-owner");

        assert_eq!(detect_owner(), Some("env-owner".to_string()));

        env::remove_var("GITHUB_USER");
    }
}
