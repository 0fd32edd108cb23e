//! Swarm configuration stored under `.swarm/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Directory under the repository root owned by swarm.
pub const SWARM_DIR: &str = ".swarm";

/// Default config location for a repository root.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(SWARM_DIR).join("config.toml")
}

/// Swarm configuration (TOML).
///
/// Missing fields default to the values below. Secrets never live here; API
/// keys come from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    pub agent: AgentConfig,
    pub search: SearchConfig,
    pub prompt: PromptConfig,
}

/// Which agent implementation runs the stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentBackend {
    /// HTTP chat-completion provider.
    Http,
    /// External CLI fed on stdin.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub backend: AgentBackend,
    /// `xai`, `anthropic`, `openai`, `groq` or `ollama`.
    pub provider: String,
    /// Model override; provider default when unset.
    pub model: Option<String>,
    /// Endpoint override; provider default when unset.
    pub base_url: Option<String>,
    pub temperature: f32,
    /// Per-call wall-clock limit in seconds.
    pub timeout_secs: u64,
    /// Truncate command-backend stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Argv for the command backend (e.g. `["codex","exec","-"]`).
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: AgentBackend::Http,
            provider: "xai".to_string(),
            model: None,
            base_url: None,
            temperature: 0.82,
            timeout_secs: 300,
            output_limit_bytes: 200_000,
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Stop collecting context after this many hits.
    pub max_hits: usize,
    /// File extensions scanned for keyword hits.
    pub extensions: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_hits: 20,
            extensions: ["py", "md", "toml", "yml", "yaml", "txt", "rs"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Maximum bytes per rendered prompt before sections are dropped.
    pub budget_bytes: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 40_000,
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(anyhow!("agent.temperature must be within 0.0..=2.0"));
        }
        if self.agent.backend == AgentBackend::Command
            && self
                .agent
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
        {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.search.max_hits == 0 {
            return Err(anyhow!("search.max_hits must be > 0"));
        }
        if self.prompt.budget_bytes < 1_000 {
            return Err(anyhow!("prompt.budget_bytes must be >= 1000"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SwarmConfig::default()`.
pub fn load_config(path: &Path) -> Result<SwarmConfig> {
    if !path.exists() {
        let cfg = SwarmConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SwarmConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SwarmConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
