//! Simulated diff preview for self-edit proposals.
//!
//! The preview is rendered from the recommendation text alone. It never reads
//! the files it names, and its header says so.

use crate::core::patch::{is_list_item, list_item_body, parse_target_line};

/// Maximum number of proposals rendered.
pub const PREVIEW_LIMIT: usize = 3;

pub const PREVIEW_HEADER: &str =
    "Diff preview (simulated from recommendations; not derived from file contents)";

/// Pick up to [`PREVIEW_LIMIT`] proposal lines: list items first, otherwise
/// the first non-empty lines.
pub fn preview_lines(text: &str) -> Vec<&str> {
    let items: Vec<&str> = text
        .lines()
        .filter(|line| is_list_item(line))
        .filter_map(list_item_body)
        .filter(|body| !body.is_empty())
        .take(PREVIEW_LIMIT)
        .collect();
    if !items.is_empty() {
        return items;
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(PREVIEW_LIMIT)
        .collect()
}

/// Render a unified-diff-style block per proposal.
///
/// Proposals that name a file use it as the diff path; others get a numbered
/// `proposal-N` placeholder. Returns an empty string when there is nothing to show.
pub fn render_diff_preview(text: &str) -> String {
    let lines = preview_lines(text);
    if lines.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(PREVIEW_HEADER);
    out.push('\n');
    for (idx, line) in lines.iter().enumerate() {
        let number = idx + 1;
        let (path, change) = match parse_target_line(&format!("- {line}")) {
            Some(target) => (target.path, target.action),
            None => (format!("proposal-{number}"), (*line).to_string()),
        };
        out.push_str(&format!("--- a/{path}\n+++ b/{path}\n"));
        out.push_str(&format!("@@ simulated proposal {number} @@\n"));
        out.push_str(&format!("+ {change}\n"));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded_to_three_list_items() {
        let text = "intro\n- a.py: one\n- b.py: two\n3. c.py: three\n- d.py: four";
        let lines = preview_lines(text);
        assert_eq!(lines, vec!["a.py: one", "b.py: two", "c.py: three"]);
    }

    #[test]
    fn falls_back_to_first_non_empty_lines() {
        let text = "\nFirst idea\n\nSecond idea\nThird idea\nFourth idea";
        assert_eq!(
            preview_lines(text),
            vec!["First idea", "Second idea", "Third idea"]
        );
    }

    #[test]
    fn render_labels_simulation_and_uses_target_paths() {
        let rendered = render_diff_preview("- src/a.py: Add docstring\n- tighten error handling");
        assert!(rendered.starts_with(PREVIEW_HEADER));
        assert!(rendered.contains("--- a/src/a.py\n+++ b/src/a.py"));
        assert!(rendered.contains("+ Add docstring"));
        assert!(rendered.contains("--- a/proposal-2"));
        assert!(rendered.contains("+ tighten error handling"));
    }

    #[test]
    fn empty_text_renders_nothing() {
        assert_eq!(render_diff_preview("  \n\n"), "");
    }
}
