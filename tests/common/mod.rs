//! Shared git fixtures for integration tests
//!
//! Builds throwaway repositories with a real git binary: an "origin" on the
//! local filesystem and clones that track it, so sync behavior can be
//! exercised end-to-end without any network.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Run git in `dir`, returning the raw output.
pub fn git(dir: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git; is it installed?")
}

/// Run git in `dir` and panic with stderr if it fails.
pub fn git_ok(dir: &Path, args: &[&str]) {
    let output = git(dir, args);
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Trimmed stdout of a git query in `dir`.
pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = git(dir, args);
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a repository with a local identity so commits work everywhere.
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git_ok(dir, &["init"]);
    git_ok(dir, &["config", "user.email", "tests@repodock.invalid"]);
    git_ok(dir, &["config", "user.name", "RepoDock Tests"]);
    git_ok(dir, &["config", "commit.gpgsign", "false"]);
}

/// Write a file and commit it.
pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    git_ok(dir, &["add", name]);
    git_ok(dir, &["commit", "-m", message]);
}

/// Create an origin repository with one initial commit and return its path.
pub fn init_origin(parent: &Path, name: &str) -> PathBuf {
    let origin = parent.join(name);
    init_repo(&origin);
    commit_file(&origin, "README.md", "# origin\n", "initial commit");
    origin
}

/// Clone `origin` to `target` with the identity configured for commits.
pub fn clone_repo(origin: &Path, target: &Path) {
    let parent = target.parent().unwrap();
    std::fs::create_dir_all(parent).unwrap();
    git_ok(
        parent,
        &[
            "clone",
            origin.to_str().unwrap(),
            target.to_str().unwrap(),
        ],
    );
    git_ok(target, &["config", "user.email", "tests@repodock.invalid"]);
    git_ok(target, &["config", "user.name", "RepoDock Tests"]);
    git_ok(target, &["config", "commit.gpgsign", "false"]);
}

/// Number of stash entries in a repository.
pub fn stash_count(dir: &Path) -> usize {
    let list = git_stdout(dir, &["stash", "list"]);
    if list.is_empty() {
        0
    } else {
        list.lines().count()
    }
}
