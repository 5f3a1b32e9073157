//! End-to-end git behavior against real local repositories
//!
//! These tests drive GitSyncer and the safety checker with an actual git
//! binary: a filesystem "origin" plus clones tracking it, no network.

mod common;

use common::{clone_repo, commit_file, git_ok, git_stdout, init_origin, init_repo, stash_count};
use repodock::git::RepositorySyncer;
use repodock::safety;
use repodock::{GitSyncer, RepositoryDescriptor, SyncConfiguration};
use std::path::Path;
use tempfile::TempDir;

/// Descriptor whose HTTPS URL points at a local origin repository.
fn local_descriptor(name: &str, origin: &Path) -> RepositoryDescriptor {
    let mut repo = RepositoryDescriptor::from_full_name(&format!("tester/{}", name));
    repo.clone_url_https = origin.to_string_lossy().into_owned();
    repo.clone_url_ssh = None;
    repo
}

fn local_config(dest: &Path) -> SyncConfiguration {
    SyncConfiguration {
        owner: "tester".to_string(),
        destination: dest.to_string_lossy().into_owned(),
        // Use the descriptor's URL verbatim; no SSH probing in tests.
        use_https: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_clone_then_update_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    let dest = temp.path().join("dest");
    std::fs::create_dir_all(&dest).unwrap();

    let repo = local_descriptor("demo", &origin);
    let syncer = GitSyncer::new(local_config(&dest));

    // First pass clones.
    assert!(syncer.sync_once(&repo).await);
    let clone_path = dest.join("demo");
    assert!(clone_path.join(".git").exists());
    assert!(clone_path.join("README.md").exists());

    // Second pass takes the update path and succeeds with nothing to do.
    assert!(syncer.sync_once(&repo).await);

    // A clean double-sync leaves no safety issues behind.
    let report = safety::check_unpushed_changes(&clone_path).await;
    assert!(!report.has_blocking_issues(), "issues: {:?}", report.issues);
}

#[tokio::test]
async fn test_update_pulls_new_commits() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    let dest = temp.path().join("dest");

    let repo = local_descriptor("demo", &origin);
    let syncer = GitSyncer::new(local_config(&dest));
    std::fs::create_dir_all(&dest).unwrap();
    assert!(syncer.sync_once(&repo).await);

    commit_file(&origin, "feature.txt", "new\n", "add feature");

    assert!(syncer.sync_once(&repo).await);
    assert!(dest.join("demo").join("feature.txt").exists());
}

#[tokio::test]
async fn test_auto_stash_preserves_dirty_changes_across_pull() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    let dest = temp.path().join("dest");
    let clone_path = dest.join("demo");
    clone_repo(&origin, &clone_path);

    // Remote moves forward; local has an uncommitted edit to another file.
    commit_file(&origin, "feature.txt", "new\n", "add feature");
    std::fs::write(clone_path.join("scratch.txt"), "work in progress\n").unwrap();
    git_ok(&clone_path, &["add", "scratch.txt"]);

    let mut config = local_config(&dest);
    config.auto_stash = true;
    let syncer = GitSyncer::new(config);

    let repo = local_descriptor("demo", &origin);
    assert!(syncer.sync_once(&repo).await);

    // Pull landed and the stashed work came back; nothing left stashed.
    assert!(clone_path.join("feature.txt").exists());
    let content = std::fs::read_to_string(clone_path.join("scratch.txt")).unwrap();
    assert_eq!(content, "work in progress\n");
    assert_eq!(stash_count(&clone_path), 0);
}

#[tokio::test]
async fn test_auto_stash_skips_clean_repositories() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    let dest = temp.path().join("dest");
    let clone_path = dest.join("demo");
    clone_repo(&origin, &clone_path);
    commit_file(&origin, "feature.txt", "new\n", "add feature");

    let mut config = local_config(&dest);
    config.auto_stash = true;
    let syncer = GitSyncer::new(config);

    assert!(syncer.sync_once(&local_descriptor("demo", &origin)).await);

    // No uncommitted changes existed, so no stash was ever created.
    assert_eq!(stash_count(&clone_path), 0);
}

#[tokio::test]
async fn test_failed_pull_restores_stashed_work() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    commit_file(&origin, "a.txt", "base\n", "add a");
    commit_file(&origin, "c.txt", "c\n", "add c");

    let dest = temp.path().join("dest");
    let clone_path = dest.join("demo");
    clone_repo(&origin, &clone_path);

    // Local commit and remote commit touch the same line: the rebase pull
    // will stop on a conflict.
    commit_file(&clone_path, "a.txt", "local\n", "local change");
    commit_file(&origin, "a.txt", "remote\n", "remote change");

    // Plus an uncommitted edit that must survive the failed pull.
    std::fs::write(clone_path.join("c.txt"), "dirty\n").unwrap();

    let mut config = local_config(&dest);
    config.auto_stash = true;
    let syncer = GitSyncer::new(config);

    let result = syncer.sync_once(&local_descriptor("demo", &origin)).await;
    assert!(!result, "conflicting pull should fail");

    // The stash was restored despite the failure, and no half-applied rebase
    // is left behind.
    let content = std::fs::read_to_string(clone_path.join("c.txt")).unwrap();
    assert_eq!(content, "dirty\n");
    assert_eq!(stash_count(&clone_path), 0);
    assert!(!clone_path.join(".git").join("rebase-merge").exists());

    // The local commit is still in place.
    let a_content = std::fs::read_to_string(clone_path.join("a.txt")).unwrap();
    assert_eq!(a_content, "local\n");
}

#[tokio::test]
async fn test_retry_gives_up_on_unreachable_origin() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("dest");
    std::fs::create_dir_all(&dest).unwrap();

    let missing_origin = temp.path().join("no-such-origin");
    let repo = local_descriptor("demo", &missing_origin);

    let mut config = local_config(&dest);
    config.max_retries = 2;
    let syncer = GitSyncer::new(config);

    assert!(!syncer.sync_with_retries(&repo).await);
    // The failed attempts left no partial clone behind.
    assert!(!dest.join("demo").exists());
}

#[tokio::test]
async fn test_safety_checker_reports_uncommitted_changes() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    init_repo(&repo);
    commit_file(&repo, "a.txt", "one\n", "initial");

    std::fs::write(repo.join("a.txt"), "two\n").unwrap();

    let report = safety::check_unpushed_changes(&repo).await;
    assert!(report.has_blocking_issues());
    assert!(report
        .issues
        .contains(&safety::ISSUE_UNCOMMITTED.to_string()));
}

#[tokio::test]
async fn test_safety_checker_reports_unpushed_commits() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    let clone_path = temp.path().join("clone");
    clone_repo(&origin, &clone_path);

    commit_file(&clone_path, "local.txt", "local\n", "unpushed work");

    let report = safety::check_unpushed_changes(&clone_path).await;
    assert!(report.has_blocking_issues());
    assert!(report.issues.contains(&safety::ISSUE_UNPUSHED.to_string()));
}

#[tokio::test]
async fn test_safety_checker_reports_stash_entries() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    init_repo(&repo);
    commit_file(&repo, "a.txt", "one\n", "initial");

    std::fs::write(repo.join("a.txt"), "two\n").unwrap();
    git_ok(&repo, &["stash", "push", "-m", "stashed work"]);

    let report = safety::check_unpushed_changes(&repo).await;
    assert!(report.has_blocking_issues());
    assert!(report.issues.contains(&safety::ISSUE_STASH.to_string()));
}

#[tokio::test]
async fn test_safety_checker_ignores_missing_upstream() {
    // A repository without any remote has no upstream; that is an expected
    // state, not an unpushed-commits issue.
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    init_repo(&repo);
    commit_file(&repo, "a.txt", "one\n", "initial");

    let report = safety::check_unpushed_changes(&repo).await;
    assert!(
        !report.has_blocking_issues(),
        "unexpected issues: {:?}",
        report.issues
    );
}

#[tokio::test]
async fn test_clean_clone_has_no_issues() {
    let temp = TempDir::new().unwrap();
    let origin = init_origin(temp.path(), "origin");
    let clone_path = temp.path().join("clone");
    clone_repo(&origin, &clone_path);

    let report = safety::check_unpushed_changes(&clone_path).await;
    assert!(!report.has_blocking_issues());
    assert!(git_stdout(&clone_path, &["status", "--porcelain"]).is_empty());
}
