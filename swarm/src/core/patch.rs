//! Extraction of patch targets from self-edit recommendations.
//!
//! Recommendations are free text. A line names a target when it is a list item
//! of the form `- path/to/file.ext: what to do` (also `•` bullets and `1.`/`1)`
//! numbering). Anything else is ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// File extensions a patch target may carry.
pub const TARGET_EXTENSIONS: &[&str] = &["py", "rs", "md", "toml", "yml", "yaml", "txt", "sh"];

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-•]|\d{1,2}[.)])\s*").expect("list marker regex"));

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"^`?([A-Za-z0-9_./-]+\.(?:{}))`?:\s*(.+)$",
        TARGET_EXTENSIONS.join("|")
    );
    Regex::new(&pattern).expect("patch target regex")
});

/// A file named by the self-edit stage and the action proposed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTarget {
    /// Path relative to the repository root, as written by the agent.
    pub path: String,
    pub action: String,
}

/// Extract targets in input order. Duplicates are kept.
pub fn extract_patch_targets(text: &str) -> Vec<PatchTarget> {
    text.lines().filter_map(parse_target_line).collect()
}

/// Parse a single line, returning `None` unless it is a list item naming a target.
pub fn parse_target_line(line: &str) -> Option<PatchTarget> {
    let item = list_item_body(line)?;
    let caps = TARGET_RE.captures(item)?;
    let action = caps.get(2)?.as_str().trim();
    if action.is_empty() {
        return None;
    }
    Some(PatchTarget {
        path: caps.get(1)?.as_str().to_string(),
        action: action.to_string(),
    })
}

/// True for bullet lines and lines numbered within their first three characters.
pub fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.starts_with('-') || trimmed.starts_with('•') {
        return true;
    }
    let head: String = trimmed.chars().take(3).collect();
    head.chars().next().is_some_and(|c| c.is_ascii_digit())
        && (head.contains('.') || head.contains(')'))
}

/// The line with its list marker removed, or `None` if it is not a list item.
pub fn list_item_body(line: &str) -> Option<&str> {
    if !is_list_item(line) {
        return None;
    }
    let trimmed = line.trim();
    let end = MARKER_RE.find(trimmed).map_or(0, |m| m.end());
    Some(trimmed[end..].trim())
}

/// Number of applied file names listed before collapsing into `+N more`.
pub const NOTE_FILE_LIMIT: usize = 3;

/// Summarise applied patches for the guardrail note.
pub fn applied_note(files: &[String]) -> String {
    if files.is_empty() {
        return "Self-edit write enabled: 0 patches applied.".to_string();
    }
    let mut listed = files
        .iter()
        .take(NOTE_FILE_LIMIT)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if files.len() > NOTE_FILE_LIMIT {
        listed.push_str(&format!(" (+{} more)", files.len() - NOTE_FILE_LIMIT));
    }
    format!(
        "Self-edit write enabled: {} patch(es) applied: {listed}",
        files.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(path: &str, action: &str) -> PatchTarget {
        PatchTarget {
            path: path.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn dash_bullet_yields_single_target() {
        let targets = extract_patch_targets("- src/a.py: Add docstring to foo");
        assert_eq!(targets, vec![target("src/a.py", "Add docstring to foo")]);
    }

    #[test]
    fn numbered_and_unicode_bullets_are_recognised() {
        let text = "1. .demo/example.py: Add docstring to process_data\n2) README.md: Add usage\n• cfg/app.toml: Bump version";
        let targets = extract_patch_targets(text);
        assert_eq!(
            targets,
            vec![
                target(".demo/example.py", "Add docstring to process_data"),
                target("README.md", "Add usage"),
                target("cfg/app.toml", "Bump version"),
            ]
        );
    }

    #[test]
    fn non_matching_lines_are_dropped_and_order_kept() {
        let text = "## First Iteration Patch Targets\n\
                    - b.py: Add type hints\n\
                    plain prose mentioning a.py: nothing\n\
                    - no path here\n\
                    - image.png: Compress\n\
                    - a.py: Add docstring\n";
        let targets = extract_patch_targets(text);
        assert_eq!(
            targets,
            vec![target("b.py", "Add type hints"), target("a.py", "Add docstring")]
        );
    }

    #[test]
    fn duplicates_are_kept() {
        let text = "- a.py: Add docstring\n- a.py: Add docstring";
        assert_eq!(extract_patch_targets(text).len(), 2);
    }

    #[test]
    fn backticked_path_is_accepted() {
        let targets = extract_patch_targets("- `src/lib.rs`: Document public items");
        assert_eq!(targets, vec![target("src/lib.rs", "Document public items")]);
    }

    #[test]
    fn numbering_must_start_within_three_chars() {
        assert!(is_list_item("12. item"));
        assert!(is_list_item("  3) item"));
        assert!(!is_list_item("2024 was a year."));
        assert!(!is_list_item("text - with dash"));
    }

    #[test]
    fn applied_note_lists_three_then_collapses() {
        let files: Vec<String> = ["a.py", "b.py", "c.py", "d.py", "e.py"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            applied_note(&files),
            "Self-edit write enabled: 5 patch(es) applied: a.py, b.py, c.py (+2 more)"
        );
        assert_eq!(
            applied_note(&files[..1]),
            "Self-edit write enabled: 1 patch(es) applied: a.py"
        );
        assert_eq!(
            applied_note(&[]),
            "Self-edit write enabled: 0 patches applied."
        );
    }
}
