//! Git integration: the snapshot/version-control backend.
//!
//! Every operation shells out to `git` and is atomic at the
//! single-command level. Failures capture stderr into
//! [`ConvergeError::Git`].

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::error::{ConvergeError, Result};

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Report the installed git version (for the metrics snapshot).
pub fn git_version() -> Result<String> {
    let output = Command::new("git")
        .arg("--version")
        .output()
        .map_err(|e| ConvergeError::Git(format!("failed to run git: {e}")))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Handle to one git workspace.
#[derive(Debug, Clone)]
pub struct GitBackend {
    root: PathBuf,
}

impl GitBackend {
    /// Open a workspace, verifying it is inside a git work tree.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !is_git_repo(&root) {
            return Err(ConvergeError::NotARepository(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| ConvergeError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvergeError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Current HEAD commit SHA.
    pub fn head_sha(&self) -> Result<String> {
        let sha = self.run(&["rev-parse", "HEAD"])?;
        if sha.is_empty() {
            return Err(ConvergeError::Git(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }

    /// Current branch name (`HEAD` when detached).
    pub fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Whether the working tree has uncommitted or untracked changes.
    pub fn is_dirty(&self) -> Result<bool> {
        let status = self.run(&["status", "--porcelain"])?;
        Ok(!status.is_empty())
    }

    /// Stage everything and commit. Returns the new HEAD SHA.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        self.run(&["add", "-A"])?;
        self.run(&["commit", "-m", message])?;
        self.head_sha()
    }

    /// Create an annotated tag at a revision.
    pub fn tag(&self, name: &str, revision: &str, message: &str) -> Result<()> {
        self.run(&["tag", "-a", "-m", message, name, revision])?;
        Ok(())
    }

    /// Delete a tag.
    pub fn delete_tag(&self, name: &str) -> Result<()> {
        self.run(&["tag", "-d", name])?;
        Ok(())
    }

    /// Resolve any ref to a commit SHA.
    pub fn resolve(&self, refname: &str) -> Result<String> {
        self.run(&["rev-parse", "--verify", &format!("{refname}^{{commit}}")])
            .map_err(|_| ConvergeError::CheckpointNotFound(refname.to_string()))
    }

    /// List tags under a prefix with their creation times (unix seconds).
    pub fn list_tags(&self, prefix: &str) -> Result<Vec<(String, i64)>> {
        let out = self.run(&[
            "for-each-ref",
            "--format=%(refname:short) %(creatordate:unix)",
            &format!("refs/tags/{prefix}*"),
        ])?;

        let mut tags = Vec::new();
        for line in out.lines() {
            let mut parts = line.split_whitespace();
            let (Some(name), Some(ts)) = (parts.next(), parts.next()) else {
                continue;
            };
            let created = ts
                .parse::<i64>()
                .map_err(|_| ConvergeError::Git(format!("bad creatordate for tag {name}")))?;
            tags.push((name.to_string(), created));
        }
        Ok(tags)
    }

    /// Whether `ancestor` is an ancestor of `descendant` (a revision is an
    /// ancestor of itself).
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = Command::new("git")
            .args(["merge-base", "--is-ancestor", ancestor, descendant])
            .current_dir(&self.root)
            .output()
            .map_err(|e| ConvergeError::Git(format!("failed to run git: {e}")))?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(ConvergeError::Git(format!(
                "git merge-base --is-ancestor failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    /// Force current state to exactly match a revision.
    pub fn reset_hard(&self, revision: &str) -> Result<()> {
        self.run(&["reset", "--hard", revision])?;
        Ok(())
    }

    /// Commits strictly after `from` up to `to`, oldest first.
    pub fn commits_between(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let out = self.run(&["rev-list", "--reverse", &format!("{from}..{to}")])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Apply the inverse of a single commit as a new commit.
    ///
    /// On conflict the in-flight revert is aborted before the error is
    /// returned, leaving the working tree as it was.
    pub fn revert_commit(&self, sha: &str) -> Result<()> {
        let output = Command::new("git")
            .args(["revert", "--no-edit", sha])
            .current_dir(&self.root)
            .output()
            .map_err(|e| ConvergeError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let _ = Command::new("git")
                .args(["revert", "--abort"])
                .current_dir(&self.root)
                .output();
            return Err(ConvergeError::Git(format!(
                "git revert {sha} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Overlay a revision's content onto the working tree without moving HEAD.
    pub fn checkout_paths(&self, revision: &str) -> Result<()> {
        self.run(&["checkout", revision, "--", "."])?;
        Ok(())
    }

    /// Stash working-tree changes (including untracked files) aside.
    ///
    /// Returns the stash commit SHA, or `None` when there was nothing to
    /// stash.
    pub fn stash_push(&self, message: &str) -> Result<Option<String>> {
        let out = self.run(&["stash", "push", "--include-untracked", "-m", message])?;
        if out.contains("No local changes to save") {
            return Ok(None);
        }
        let sha = self.run(&["rev-parse", "--verify", "refs/stash"])?;
        Ok(Some(sha))
    }

    /// Re-apply a stash by its commit SHA, keeping the stash entry.
    pub fn stash_apply(&self, stash_ref: &str) -> Result<()> {
        self.run(&["stash", "apply", stash_ref])?;
        Ok(())
    }

    /// Whether the working tree has no tracked differences from a revision.
    pub fn diff_is_empty(&self, revision: &str) -> Result<bool> {
        let output = Command::new("git")
            .args(["diff", "--quiet", revision, "--"])
            .current_dir(&self.root)
            .output()
            .map_err(|e| ConvergeError::Git(format!("failed to run git: {e}")))?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(ConvergeError::Git(format!(
                "git diff --quiet failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    /// Create and check out a new branch at the current HEAD.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-b", name])?;
        Ok(())
    }

    /// Check out an existing branch.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", name])?;
        Ok(())
    }

    /// Paths of all tracked files.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        let out = self.run(&["ls-files"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Number of commits reachable from HEAD in the last `days` days.
    pub fn commit_count_since_days(&self, days: u32) -> Result<u64> {
        let out = self.run(&[
            "rev-list",
            "--count",
            &format!("--since={days} days ago"),
            "HEAD",
        ])?;
        out.parse()
            .map_err(|_| ConvergeError::Git(format!("bad rev-list count: {out}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn open_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitBackend::open(dir.path()),
            Err(ConvergeError::NotARepository(_))
        ));
    }

    #[test]
    fn head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        let sha = git.head_sha().unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn dirty_detection_and_commit_all() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        assert!(!git.is_dirty().unwrap());

        std::fs::write(repo.path().join("file.txt"), "contents").unwrap();
        assert!(git.is_dirty().unwrap());

        let before = git.head_sha().unwrap();
        let after = git.commit_all("add file").unwrap();
        assert_ne!(before, after);
        assert!(!git.is_dirty().unwrap());
    }

    #[test]
    fn tag_resolve_and_delete() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        let head = git.head_sha().unwrap();

        git.tag("converge/checkpoint/cp-test", &head, "checkpoint")
            .unwrap();
        assert_eq!(git.resolve("converge/checkpoint/cp-test").unwrap(), head);

        git.delete_tag("converge/checkpoint/cp-test").unwrap();
        assert!(matches!(
            git.resolve("converge/checkpoint/cp-test"),
            Err(ConvergeError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn ancestry_includes_self() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        let first = git.head_sha().unwrap();

        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        let second = git.commit_all("second").unwrap();

        assert!(git.is_ancestor(&first, &second).unwrap());
        assert!(git.is_ancestor(&second, &second).unwrap());
        assert!(!git.is_ancestor(&second, &first).unwrap());
    }

    #[test]
    fn reset_hard_moves_head_back() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        let first = git.head_sha().unwrap();

        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        git.commit_all("second").unwrap();

        git.reset_hard(&first).unwrap();
        assert_eq!(git.head_sha().unwrap(), first);
        assert!(!repo.path().join("a.txt").exists());
    }

    #[test]
    fn commits_between_is_oldest_first() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        let base = git.head_sha().unwrap();

        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        let second = git.commit_all("second").unwrap();
        std::fs::write(repo.path().join("b.txt"), "b").unwrap();
        let third = git.commit_all("third").unwrap();

        let commits = git.commits_between(&base, &third).unwrap();
        assert_eq!(commits, vec![second, third]);
    }

    #[test]
    fn revert_commit_applies_inverse() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();

        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        let second = git.commit_all("second").unwrap();

        git.revert_commit(&second).unwrap();
        assert!(!repo.path().join("a.txt").exists());
    }

    #[test]
    fn stash_round_trip_preserves_changes() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();

        std::fs::write(repo.path().join("wip.txt"), "uncommitted").unwrap();
        let stash = git.stash_push("backup").unwrap();
        assert!(stash.is_some());
        assert!(!repo.path().join("wip.txt").exists());

        git.stash_apply(&stash.unwrap()).unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.path().join("wip.txt")).unwrap(),
            "uncommitted"
        );
    }

    #[test]
    fn stash_push_with_clean_tree_returns_none() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        assert_eq!(git.stash_push("backup").unwrap(), None);
    }

    #[test]
    fn diff_is_empty_tracks_worktree_state() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();

        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        let second = git.commit_all("second").unwrap();
        assert!(git.diff_is_empty(&second).unwrap());

        std::fs::write(repo.path().join("a.txt"), "changed").unwrap();
        assert!(!git.diff_is_empty(&second).unwrap());
    }

    #[test]
    fn branch_create_and_return() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        let original = git.current_branch().unwrap();

        git.create_branch("converge/run-test").unwrap();
        assert_eq!(git.current_branch().unwrap(), "converge/run-test");

        git.checkout_branch(&original).unwrap();
        assert_eq!(git.current_branch().unwrap(), original);
    }

    #[test]
    fn tracked_files_lists_committed_paths() {
        let repo = make_git_repo();
        let git = GitBackend::open(repo.path()).unwrap();
        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        git.commit_all("add a").unwrap();

        let files = git.tracked_files().unwrap();
        assert_eq!(files, vec!["a.txt".to_string()]);
    }
}
