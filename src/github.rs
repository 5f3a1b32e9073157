//! GitHub repository listing
//!
//! The [`RepositoryLister`] trait is the seam between the sync core and the
//! hosting service: the orchestrator only ever sees a flattened sequence of
//! validated [`RepositoryDescriptor`]s. [`GitHubClient`] implements it against
//! the GitHub REST v3 API with transparent pagination.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SyncConfiguration;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;
// Defensive cap mirroring GitHub's own pagination ceiling.
const MAX_PAGES: u32 = 400;

/// One remote repository as returned by the hosting API.
///
/// Read-only for the duration of a sync run; never persisted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    /// Repository name, unique within the owner's namespace.
    pub name: String,

    /// `owner/name`
    #[serde(default)]
    pub full_name: String,

    /// HTTPS clone URL
    #[serde(rename = "clone_url", default)]
    pub clone_url_https: String,

    /// SSH clone URL, absent for some API responses
    #[serde(rename = "ssh_url", default)]
    pub clone_url_ssh: Option<String>,

    #[serde(default)]
    default_branch: Option<String>,

    #[serde(default)]
    pub private: bool,

    #[serde(default)]
    pub archived: bool,

    #[serde(default)]
    pub fork: bool,
}

impl RepositoryDescriptor {
    /// Minimal descriptor for a `owner/name` pair with GitHub-shaped URLs.
    pub fn from_full_name(full_name: &str) -> Self {
        let name = full_name
            .rsplit('/')
            .next()
            .unwrap_or(full_name)
            .to_string();
        Self {
            name,
            full_name: full_name.to_string(),
            clone_url_https: format!("https://github.com/{}.git", full_name),
            clone_url_ssh: Some(format!("git@github.com:{}.git", full_name)),
            default_branch: None,
            private: false,
            archived: false,
            fork: false,
        }
    }

    pub fn default_branch(&self) -> &str {
        self.default_branch.as_deref().unwrap_or("main")
    }

    /// Validate the descriptor at the boundary where API data enters the
    /// system. The name is later joined onto the destination path, so it must
    /// not be able to escape it.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("repository has an empty name");
        }
        if self.name == "." || self.name == ".." {
            bail!("repository name {:?} is not a valid directory name", self.name);
        }
        if self.name.contains('/') || self.name.contains('\\') || self.name.contains('\0') {
            bail!("repository name {:?} contains path separators", self.name);
        }
        if self.clone_url_https.is_empty()
            && self.clone_url_ssh.as_deref().unwrap_or("").is_empty()
        {
            bail!("repository {} has no clone URL", self.name);
        }
        Ok(())
    }
}

/// Source of repository descriptors for one owner.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    /// List every repository for the configured owner, pagination flattened.
    /// Fails on network or authentication errors; an empty result is returned
    /// as-is (the orchestrator decides what it means).
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>>;
}

/// GitHub REST v3 client
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    token: Option<String>,
    include_forks: bool,
    include_archived: bool,
    exclude_patterns: Vec<String>,
}

impl GitHubClient {
    pub fn new(config: &SyncConfiguration) -> Result<Self> {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    /// Client against an alternate API endpoint. Test affordance.
    pub fn with_api_base(config: &SyncConfiguration, api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("repodock/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_base: api_base.into(),
            owner: config.owner.clone(),
            token: config.github.token.clone(),
            include_forks: config.github.include_forks,
            include_archived: config.github.include_archived,
            exclude_patterns: config.github.exclude_patterns.clone(),
        })
    }

    /// Login of the token's user, if a token is configured and valid.
    async fn authenticated_login(&self) -> Option<String> {
        let token = self.token.as_ref()?;

        let response = self
            .http
            .get(format!("{}/user", self.api_base))
            .header("Authorization", format!("token {}", token))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!("Token user lookup failed: {}", response.status());
            return None;
        }

        let body: serde_json::Value = response.json().await.ok()?;
        body.get("login")
            .and_then(|login| login.as_str())
            .map(|login| login.to_string())
    }

    async fn fetch_page(&self, url: &str, page: u32) -> Result<Vec<RepositoryDescriptor>> {
        let mut request = self
            .http
            .get(url)
            .query(&[("per_page", PER_PAGE), ("page", page)]);

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {}", token));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach GitHub API (page {})", page))?;

        let status = response.status();
        if !status.is_success() {
            let hint = match status {
                StatusCode::UNAUTHORIZED => "authentication failed, check your token",
                StatusCode::FORBIDDEN => "API rate limit reached or token lacks scope",
                StatusCode::NOT_FOUND => "owner not found",
                _ => "unexpected response",
            };
            return Err(anyhow!("GitHub API error {}: {}", status.as_u16(), hint));
        }

        response
            .json::<Vec<RepositoryDescriptor>>()
            .await
            .context("Failed to parse GitHub API response")
    }

    /// Keep a repository unless configuration filters it out.
    fn passes_filters(&self, repo: &RepositoryDescriptor) -> bool {
        if matches_exclusion_pattern(&repo.name, &self.exclude_patterns) {
            debug!("Excluding repository by pattern: {}", repo.name);
            return false;
        }
        if repo.fork && !self.include_forks {
            debug!("Excluding fork repository: {}", repo.name);
            return false;
        }
        if repo.archived && !self.include_archived {
            debug!("Excluding archived repository: {}", repo.name);
            return false;
        }
        true
    }
}

#[async_trait]
impl RepositoryLister for GitHubClient {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>> {
        // When the token belongs to the requested owner, list through
        // /user/repos so private repositories are included.
        let url = match self.authenticated_login().await {
            Some(login) if login.eq_ignore_ascii_case(&self.owner) => {
                info!("Listing repositories as authenticated user {}", login);
                format!(
                    "{}/user/repos?affiliation=owner,collaborator,organization_member",
                    self.api_base
                )
            }
            _ => {
                if self.token.is_none() {
                    warn!("No GitHub token configured; private repositories will be missing");
                }
                info!("Listing public repositories of {}", self.owner);
                format!("{}/users/{}/repos", self.api_base, self.owner)
            }
        };

        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let page_repos = self.fetch_page(&url, page).await?;
            if page_repos.is_empty() {
                break;
            }

            repositories.extend(page_repos);

            if page >= MAX_PAGES {
                warn!("Reached pagination cap ({} pages)", MAX_PAGES);
                break;
            }
            page += 1;
        }

        let total = repositories.len();
        repositories.retain(|repo| self.passes_filters(repo));

        info!(
            "Found {} repositories for {} ({} after filtering)",
            total,
            self.owner,
            repositories.len()
        );

        Ok(repositories)
    }
}

/// Check a repository name against simple glob-style exclusion patterns.
fn matches_exclusion_pattern(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.contains('*') {
            let pattern_regex = pattern.replace('.', r"\.").replace('*', ".*");
            regex::Regex::new(&format!("^{}$", pattern_regex))
                .map(|re| re.is_match(name))
                .unwrap_or(false)
        } else {
            name == pattern
        }
    })
}
