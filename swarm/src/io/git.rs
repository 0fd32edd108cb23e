//! Git adapter for the delivery stage.
//!
//! Delivery only ever switches branch, stages, checks for changes and
//! commits. It never pushes. The [`VersionControl`] trait is the seam tests
//! replace with a recording fake.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Version-control operations used by delivery.
pub trait VersionControl {
    /// Switch to `branch`, creating it at HEAD when it does not exist.
    /// An existing branch keeps its history.
    fn create_or_switch_branch(&self, branch: &str) -> Result<()>;

    /// Stage all changes (respects .gitignore).
    fn stage_all(&self) -> Result<()>;

    /// True if the worktree or index has changes.
    fn is_dirty(&self) -> Result<bool>;

    /// Commit staged changes and return the new commit id.
    fn commit(&self, message: &str) -> Result<String>;

    /// URL of the `origin` remote, if configured.
    fn remote_url(&self) -> Option<String> {
        None
    }
}

impl<V: VersionControl + ?Sized> VersionControl for &V {
    fn create_or_switch_branch(&self, branch: &str) -> Result<()> {
        (**self).create_or_switch_branch(branch)
    }

    fn stage_all(&self) -> Result<()> {
        (**self).stage_all()
    }

    fn is_dirty(&self) -> Result<bool> {
        (**self).is_dirty()
    }

    fn commit(&self, message: &str) -> Result<String> {
        (**self).commit(message)
    }

    fn remote_url(&self) -> Option<String> {
        (**self).remote_url()
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &reference])?;
        Ok(output.status.success())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    #[instrument(skip_all, fields(branch))]
    fn create_or_switch_branch(&self, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            debug!(branch, "switching to existing branch");
            self.run_checked(&["switch", branch])?;
        } else {
            debug!(branch, "creating branch");
            self.run_checked(&["switch", "-c", branch])?;
        }
        Ok(())
    }

    fn stage_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    #[instrument(skip_all)]
    fn commit(&self, message: &str) -> Result<String> {
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    fn remote_url(&self) -> Option<String> {
        self.run_capture(&["remote", "get-url", "origin"])
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn short_line_is_rejected() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn branch_stage_commit_in_real_repo() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path());
        assert!(!git.is_dirty().expect("status"));

        git.create_or_switch_branch("feat/auto-plan").expect("branch");
        // Switching again to an existing branch must not fail.
        git.create_or_switch_branch("feat/auto-plan").expect("branch again");

        repo.write("notes.txt", "hello\n").expect("write");
        assert!(git.is_dirty().expect("status"));
        git.stage_all().expect("stage");
        let id = git.commit("chore: add notes").expect("commit");
        assert_eq!(id.len(), 40);
        assert!(!git.is_dirty().expect("status"));
        assert_eq!(git.remote_url(), None);

        // Switching back to an existing branch keeps its commits.
        repo.git(&["checkout", "--quiet", "-"]).expect("back to previous branch");
        git.create_or_switch_branch("feat/auto-plan").expect("switch existing");
        assert_eq!(repo.git(&["rev-parse", "HEAD"]).expect("rev-parse"), id);
        assert_eq!(
            repo.git(&["log", "-1", "--format=%s"]).expect("log"),
            "chore: add notes"
        );
    }
}
