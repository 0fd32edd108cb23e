//! Stage prompt rendering with a byte budget.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When a rendered prompt exceeds the budget, droppable sections are removed
//! in a fixed order and the largest remaining section is truncated last.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::state::{RunState, Stage};

const TEMPLATES: &[(&str, &str)] = &[
    ("contract", include_str!("prompts/contract.md")),
    ("goal", include_str!("prompts/goal.md")),
    ("critique", include_str!("prompts/critique.md")),
    ("build", include_str!("prompts/build.md")),
    ("verify", include_str!("prompts/verify.md")),
    ("self_edit", include_str!("prompts/self_edit.md")),
    ("deliver", include_str!("prompts/deliver.md")),
];

/// Droppable sections, least important first.
const DROP_ORDER: &[&str] = &["context", "self_edit"];

const TRUNCATION_MARKER: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section marker regex")
});

fn template_name(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Critique => Some("critique"),
        Stage::Build => Some("build"),
        Stage::Verify => Some("verify"),
        Stage::SelfEdit => Some("self_edit"),
        Stage::Deliver => Some("deliver"),
        Stage::Done => None,
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section content without its marker.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let required = kind.as_str() == "required";
        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    // Still over: cut the largest section.
    let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let before_len = largest.content.len();
    let allowed = budget.saturating_sub(total - before_len);
    if allowed > TRUNCATION_MARKER.len() {
        truncate_at_char_boundary(&mut largest.content, allowed - TRUNCATION_MARKER.len());
        largest.content.push_str(TRUNCATION_MARKER);
    } else {
        truncate_at_char_boundary(&mut largest.content, allowed);
    }
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders stage prompts from the run state.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .map_err(|err| anyhow!("invalid prompt template '{name}': {err}"))?;
        }
        Ok(Self { env, budget_bytes })
    }

    /// Render the prompt for `stage`, asking for `sections` in the response.
    pub fn render(&self, stage: Stage, state: &RunState, sections: &[&str]) -> Result<String> {
        let name = template_name(stage).ok_or_else(|| anyhow!("no prompt for stage {stage}"))?;
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            sections => sections,
            goal => state.goal.trim(),
            critique => state.critique.trim(),
            build => state.build.trim(),
            verification => state.verify.trim(),
            self_edit => state.self_edit.trim(),
            search_context => state.search_context.trim(),
            iterations => state.self_edit_iterations,
        })?;

        let mut parsed = parse_sections(&rendered);
        apply_budget_to_sections(&mut parsed, self.budget_bytes);
        Ok(render_sections(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::WriteFlags;

    fn state() -> RunState {
        let mut state = RunState::new(
            "Add docstrings",
            WriteFlags::default(),
            true,
            2,
            "src/a.py:1: def foo():",
        );
        state.critique = "critique text".to_string();
        state.build = "build text".to_string();
        state.verify = "verify text".to_string();
        state.self_edit = "self-edit text".to_string();
        state
    }

    #[test]
    fn contract_lists_requested_sections_in_order() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let prompt = builder
            .render(Stage::Critique, &state(), &["Critique", "Strategy", "Handoff"])
            .expect("render");
        assert!(prompt.starts_with("### Response Contract"));
        assert!(prompt.contains("1) Critique\n2) Strategy\n3) Handoff"));
        assert!(prompt.contains("<goal>\nAdd docstrings\n</goal>"));
        assert!(!prompt.contains("<!--"));
    }

    #[test]
    fn verify_prompt_orders_build_before_context() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let prompt = builder.render(Stage::Verify, &state(), &["Verified"]).expect("render");
        let goal = prompt.find("### Goal").expect("goal");
        let build = prompt.find("### Build Plan").expect("build");
        let context = prompt.find("### Repository Search Context").expect("context");
        assert!(goal < build && build < context);
    }

    #[test]
    fn self_edit_prompt_carries_iterations_and_findings() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        let prompt = builder.render(Stage::SelfEdit, &state(), &["Plan"]).expect("render");
        assert!(prompt.contains("<iterations>2</iterations>"));
        assert!(prompt.contains("verify text"));
        assert!(!prompt.contains("build text"));
    }

    #[test]
    fn budget_drops_search_context_first() {
        let mut state = state();
        state.search_context = "hit\n".repeat(500);
        let builder = PromptBuilder::new(1_000).expect("builder");
        let prompt = builder.render(Stage::Verify, &state, &["Verified"]).expect("render");
        assert!(!prompt.contains("### Repository Search Context"));
        assert!(prompt.contains("### Build Plan"));
    }

    #[test]
    fn oversized_required_section_is_truncated_on_char_boundary() {
        let mut state = state();
        state.build = "é".repeat(2_000);
        let builder = PromptBuilder::new(1_000).expect("builder");
        let prompt = builder.render(Stage::Deliver, &state, &["Branch Name"]).expect("render");
        // Budget counts section bodies; joins add a few bytes.
        assert!(prompt.len() <= 1_000 + 16);
        assert!(prompt.contains("[truncated]"));
        assert!(prompt.contains("### Plan Format"));
    }

    #[test]
    fn empty_search_context_is_omitted() {
        let mut state = state();
        state.search_context.clear();
        let builder = PromptBuilder::new(10_000).expect("builder");
        let prompt = builder.render(Stage::Verify, &state, &["Verified"]).expect("render");
        assert!(!prompt.contains("Repository Search Context"));
    }

    #[test]
    fn done_has_no_prompt() {
        let builder = PromptBuilder::new(10_000).expect("builder");
        assert!(builder.render(Stage::Done, &state(), &[]).is_err());
    }
}
