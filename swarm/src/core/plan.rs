//! Best-effort parsing of the delivery plan into a branch and commit message.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BRANCH: &str = "feat/auto-plan";
pub const DEFAULT_COMMIT_MESSAGE: &str = "chore: apply planned updates";

static BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| field_regex("Branch Name"));
static COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| field_regex("Commit Message"));
static UNSAFE_BRANCH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._/-]").expect("branch charset regex"));

/// Branch and commit message extracted from a delivery plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitPlan {
    pub branch: String,
    pub commit_message: String,
}

impl Default for GitPlan {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }
}

/// Parse `Branch Name` and `Commit Message` fields, falling back to defaults.
///
/// A field matches case-insensitively when followed by `:` or a newline; the
/// value is the rest of that line, or the first non-empty line after it.
pub fn parse_git_plan(text: &str) -> GitPlan {
    let branch = extract_field(&BRANCH_RE, text)
        .map(|raw| sanitize_branch(&raw))
        .filter(|branch| !branch.is_empty())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    let commit_message = extract_field(&COMMIT_RE, text)
        .map(|raw| strip_markup(&raw).to_string())
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());
    GitPlan {
        branch,
        commit_message,
    }
}

/// Replace characters git would reject with `-` and trim leading/trailing `-`.
pub fn sanitize_branch(raw: &str) -> String {
    UNSAFE_BRANCH_CHARS
        .replace_all(raw.trim(), "-")
        .trim_matches('-')
        .to_string()
}

fn field_regex(name: &str) -> Regex {
    // `\s*` may span blank lines; `.+` stops at the end of the value line.
    let pattern = format!(r"(?i){}\s*[:\n]\s*(.+)", regex::escape(name));
    Regex::new(&pattern).expect("field regex")
}

fn extract_field(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    let value = caps.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Drop markdown emphasis and quoting that models wrap values in.
fn strip_markup(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '`' | '"' | '\''))
}
