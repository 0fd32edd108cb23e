//! Keyword search over the repository, used as Verify-stage context.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::io::config::SearchConfig;
use crate::io::patcher::SKIP_DIRS;

pub const MAX_KEYWORDS: usize = 8;
pub const STOP_WORDS: &[&str] = &["the", "and", "for", "with", "this"];

pub const NO_KEYWORDS: &str = "No keywords extracted from goal.";
pub const NO_MATCHES: &str = "No repository matches found for extracted keywords.";

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9_-]{2,}").expect("keyword regex"));

/// Supplies repository context for a goal.
pub trait RepoSearch {
    fn search(&self, goal: &str, root: &Path) -> String;
}

/// Distinct lowercased keywords from `goal`, in first-seen order.
pub fn extract_keywords(goal: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in WORD_RE.find_iter(goal) {
        let word = word.as_str().to_lowercase();
        if STOP_WORDS.contains(&word.as_str()) || keywords.contains(&word) {
            continue;
        }
        keywords.push(word);
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Grep-like search: one `path:line: text` hit per matching line.
#[derive(Debug, Clone)]
pub struct KeywordSearch {
    max_hits: usize,
    extensions: Vec<String>,
}

impl KeywordSearch {
    pub fn new(cfg: &SearchConfig) -> Self {
        Self {
            max_hits: cfg.max_hits,
            extensions: cfg
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn candidate_files(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !SKIP_DIRS.iter().any(|skip| entry.file_name() == *skip)
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
            })
            .collect()
    }
}

impl Default for KeywordSearch {
    fn default() -> Self {
        Self::new(&SearchConfig::default())
    }
}

impl RepoSearch for KeywordSearch {
    #[instrument(skip_all, fields(root = %root.display()))]
    fn search(&self, goal: &str, root: &Path) -> String {
        let keywords = extract_keywords(goal);
        if keywords.is_empty() {
            return NO_KEYWORDS.to_string();
        }

        let mut hits: Vec<String> = Vec::new();
        'files: for path in self.candidate_files(root) {
            // Unreadable and binary files are skipped.
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            let Ok(text) = String::from_utf8(bytes) else {
                continue;
            };
            let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
            for (idx, line) in text.lines().enumerate() {
                let lowered = line.to_lowercase();
                if keywords.iter().any(|kw| lowered.contains(kw.as_str())) {
                    hits.push(format!("{rel}:{}: {}", idx + 1, line.trim()));
                    if hits.len() >= self.max_hits {
                        break 'files;
                    }
                }
            }
        }
        debug!(keywords = ?keywords, hits = hits.len(), "repository search finished");

        if hits.is_empty() {
            return NO_MATCHES.to_string();
        }
        hits.join("\n")
    }
}
