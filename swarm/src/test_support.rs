//! Test-only collaborators: scripted agent, recording version control,
//! static search and a throwaway git repository.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::state::Stage;
use crate::io::agent::{Agent, AgentError, AgentRequest};
use crate::io::git::VersionControl;
use crate::io::search::RepoSearch;

/// Commit id returned by [`RecordingVcs::commit`].
pub const FAKE_COMMIT_ID: &str = "0123456789abcdef0123456789abcdef01234567";

/// Agent returning canned text per stage and recording every request.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    responses: HashMap<Stage, String>,
    fail_at: RefCell<Option<Stage>>,
    fail_as_configuration: Option<String>,
    misconfigured: Option<String>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    /// Every stage answers `"<stage> output"` unless overridden.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, stage: Stage, text: impl Into<String>) -> Self {
        self.responses.insert(stage, text.into());
        self
    }

    /// Fail with an invocation error when `stage` is reached.
    pub fn failing_at(self, stage: Stage) -> Self {
        *self.fail_at.borrow_mut() = Some(stage);
        self
    }

    /// Pass preflight but report a configuration error when `stage` is reached.
    pub fn misconfigured_at(mut self, stage: Stage, message: impl Into<String>) -> Self {
        *self.fail_at.borrow_mut() = Some(stage);
        self.fail_as_configuration = Some(message.into());
        self
    }

    /// Report a configuration error from `preflight` and `invoke`.
    pub fn misconfigured(mut self, message: impl Into<String>) -> Self {
        self.misconfigured = Some(message.into());
        self
    }

    /// Clear an injected failure, e.g. before resuming.
    pub fn recover(&self) {
        *self.fail_at.borrow_mut() = None;
    }

    /// Stages invoked so far, in order.
    pub fn calls(&self) -> Vec<Stage> {
        self.requests.borrow().iter().map(|r| r.stage).collect()
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<String, AgentError> {
        self.preflight()?;
        self.requests.borrow_mut().push(request.clone());
        if *self.fail_at.borrow() == Some(request.stage) {
            if let Some(message) = &self.fail_as_configuration {
                return Err(AgentError::Configuration(message.clone()));
            }
            return Err(AgentError::Invocation(anyhow!(
                "scripted failure at {}",
                request.stage
            )));
        }
        Ok(self
            .responses
            .get(&request.stage)
            .cloned()
            .unwrap_or_else(|| format!("{} output", request.stage)))
    }

    fn preflight(&self) -> Result<(), AgentError> {
        match &self.misconfigured {
            Some(message) => Err(AgentError::Configuration(message.clone())),
            None => Ok(()),
        }
    }
}

/// Version control fake that records calls.
#[derive(Debug, Default)]
pub struct RecordingVcs {
    dirty: bool,
    failure: Option<String>,
    calls: RefCell<Vec<String>>,
}

impl RecordingVcs {
    /// A clean tree where every operation succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report uncommitted changes.
    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }

    /// Fail every operation with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.borrow_mut().push(call);
        match &self.failure {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

impl VersionControl for RecordingVcs {
    fn create_or_switch_branch(&self, branch: &str) -> Result<()> {
        self.record(format!("branch {branch}"))
    }

    fn stage_all(&self) -> Result<()> {
        self.record("stage".to_string())
    }

    fn is_dirty(&self) -> Result<bool> {
        self.record("is_dirty".to_string())?;
        Ok(self.dirty)
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.record(format!("commit {message}"))?;
        Ok(FAKE_COMMIT_ID.to_string())
    }
}

/// Search returning fixed text and counting calls.
#[derive(Debug, Default)]
pub struct StaticSearch {
    text: String,
    calls: RefCell<usize>,
}

impl StaticSearch {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: RefCell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl RepoSearch for StaticSearch {
    fn search(&self, _goal: &str, _root: &Path) -> String {
        *self.calls.borrow_mut() += 1;
        self.text.clone()
    }
}

/// Temporary git repository with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "hi\n")?;
        repo.git(&["add", "README.md"])?;
        repo.git(&["commit", "--quiet", "-m", "chore: init"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Run git in the repository and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
