use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repodock::health::CheckResult;
use repodock::{
    ConfigOverlay, GitHubClient, HealthCheck, RepositoryLister, SyncConfiguration, SyncEngine,
};

#[derive(Parser)]
#[command(name = "repodock")]
#[command(about = "Bulk GitHub repository synchronization and workspace bootstrap")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone or update all repositories of an owner
    Sync {
        /// GitHub owner (user or organization)
        #[arg(long)]
        owner: Option<String>,

        /// Destination directory for the repositories
        #[arg(long)]
        dest: Option<String>,

        /// Report what would happen without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip safety checks on repositories with local changes
        #[arg(long)]
        force: bool,

        /// Clone over HTTPS even when SSH is available
        #[arg(long)]
        use_https: bool,

        /// Attempts per repository before giving up
        #[arg(long)]
        max_retries: Option<u32>,

        /// Only update existing clones; skip repositories not yet present
        #[arg(long)]
        sync_only: bool,

        /// Stash uncommitted changes around pulls and restore them after
        #[arg(long)]
        auto_stash: bool,
    },

    /// List the repositories a sync would process
    List {
        /// GitHub owner (user or organization)
        #[arg(long)]
        owner: Option<String>,

        /// Show repository details
        #[arg(long)]
        details: bool,
    },

    /// Check that git, authentication, and the destination are usable
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    info!("Starting RepoDock v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfiguration::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            owner,
            dest,
            dry_run,
            force,
            use_https,
            max_retries,
            sync_only,
            auto_stash,
        } => {
            let overlay = ConfigOverlay {
                owner,
                destination: dest,
                dry_run: dry_run.then_some(true),
                force: force.then_some(true),
                use_https: use_https.then_some(true),
                max_retries,
                sync_only: sync_only.then_some(true),
                auto_stash: auto_stash.then_some(true),
                lock_file: None,
            };
            cmd_sync(config, overlay).await
        }
        Commands::List { owner, details } => {
            let overlay = ConfigOverlay {
                owner,
                ..Default::default()
            };
            cmd_list(config, overlay, details).await
        }
        Commands::Doctor => cmd_doctor(&config).await,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Run one synchronization batch and exit non-zero unless the run succeeded.
async fn cmd_sync(mut config: SyncConfiguration, overlay: ConfigOverlay) -> Result<()> {
    config.apply_overlay(&overlay);
    config.expand_paths()?;

    if config.dry_run {
        println!("🔍 Dry run - no changes will be made");
    }
    let owner = if config.owner.is_empty() {
        "<unknown>"
    } else {
        config.owner.as_str()
    };
    println!(
        "Syncing repositories of {} into {}",
        owner,
        config.destination_dir().display()
    );

    let engine = SyncEngine::new(config)?;
    let outcome = engine.sync_repositories().await;

    println!();
    println!(
        "Synced {} repositories at {}",
        outcome.synced_repos.len(),
        outcome.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for name in &outcome.synced_repos {
        println!("   ✅ {}", name);
    }

    if outcome.has_errors() {
        println!("\n{} problem(s):", outcome.errors.len());
        for error in &outcome.errors {
            println!("   ❌ {:#}", error);
        }
    }

    if !outcome.success {
        std::process::exit(1);
    }

    Ok(())
}

/// List repositories without syncing anything.
async fn cmd_list(mut config: SyncConfiguration, overlay: ConfigOverlay, details: bool) -> Result<()> {
    config.apply_overlay(&overlay);

    let client = GitHubClient::new(&config)?;
    let repositories = client.list_repositories().await?;

    println!("Repositories ({}):", repositories.len());
    for repo in &repositories {
        if details {
            println!("📁 {}", repo.full_name);
            println!("   🌿 default branch: {}", repo.default_branch());
            if repo.private {
                println!("   🔒 private");
            }
            if repo.fork {
                println!("   🍴 fork");
            }
            println!("   🔗 {}", repo.clone_url_https);
        } else {
            println!("  📁 {}", repo.full_name);
        }
    }

    Ok(())
}

/// Preflight diagnostics.
async fn cmd_doctor(config: &SyncConfiguration) -> Result<()> {
    let health = HealthCheck::run(config).await;

    println!("🔍 RepoDock System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
    }

    println!();
    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
        std::process::exit(1);
    }

    Ok(())
}

fn print_check(name: &str, result: &CheckResult) {
    let icon = if result.passed {
        if result.is_warning {
            "⚠️ "
        } else {
            "✅"
        }
    } else {
        "❌"
    };
    println!("{} {}: {}", icon, name, result.message);
}
