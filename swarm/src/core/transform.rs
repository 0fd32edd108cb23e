//! Bounded source transforms behind the patch applier.
//!
//! Each transform is a pure `&str -> String` function that leaves already
//! conforming code untouched, so running it twice equals running it once.
//! Dispatch from (extension, action) to a transform lives in [`select_transform`].

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Placeholder inserted by [`add_docstrings`].
pub const PLACEHOLDER_DOCSTRING: &str = r#""""TODO: Add description.""""#;

static PY_SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(def\s+\w+\s*\([^)]*\))(\s*:)").expect("python signature regex")
});
static PY_DEF_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(?:async\s+)?def\s+\w+\s*\(").expect("python def regex"));

/// How a file is classified for patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Source the transforms understand.
    Python,
    /// Prose; additive edits are left to humans.
    Documentation,
    Other,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" => FileKind::Python,
            "md" | "txt" => FileKind::Documentation,
            _ => FileKind::Other,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(FileKind::Other, Self::from_extension)
    }
}

/// Transform chosen for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    ReturnAnnotations,
    Docstrings,
}

impl Transform {
    pub fn apply(self, content: &str) -> String {
        match self {
            Transform::ReturnAnnotations => add_return_annotations(content),
            Transform::Docstrings => add_docstrings(content),
        }
    }
}

/// Pick a transform from the file kind and a case-insensitive keyword match on
/// the action. `None` means the target is a no-op.
pub fn select_transform(kind: FileKind, action: &str) -> Option<Transform> {
    if kind != FileKind::Python {
        return None;
    }
    let action = action.to_lowercase();
    if action.contains("type hint") || action.contains("annotation") {
        return Some(Transform::ReturnAnnotations);
    }
    if action.contains("docstring") || action.contains("documentation") {
        return Some(Transform::Docstrings);
    }
    // "import" cleanups and everything else are left alone.
    None
}

/// Append `-> None` to every `def` signature that has no return annotation.
pub fn add_return_annotations(content: &str) -> String {
    PY_SIGNATURE_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let signature = &caps[1];
            let colon = &caps[2];
            if signature.contains("->") {
                caps[0].to_string()
            } else {
                format!("{signature} -> None{colon}")
            }
        })
        .into_owned()
}

/// Insert a placeholder docstring into every function whose first body line is
/// not already a docstring.
///
/// Multi-line signatures are followed to the line that closes them with `:`.
/// Single-line bodies (`def f(): return 1`) are skipped.
pub fn add_docstrings(content: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 8);
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = PY_DEF_LINE_RE.captures(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        let def_indent = caps.get(1).map_or("", |m| m.as_str());

        let Some(header_end) = signature_end(&lines, i) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        for line in &lines[i..=header_end] {
            out.push((*line).to_string());
        }

        let mut next = header_end + 1;
        while next < lines.len() && lines[next].trim().is_empty() {
            out.push(lines[next].to_string());
            next += 1;
        }

        if let Some(body) = lines.get(next)
            && !is_docstring_line(body)
        {
            let indent = body_indent(def_indent, body);
            out.push(format!("{indent}{PLACEHOLDER_DOCSTRING}"));
        }
        i = next;
    }

    out.join("\n")
}

/// Index of the line ending the signature that starts at `start`, if the
/// signature ends with a bare `:` (i.e. the body is on following lines).
fn signature_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        let code = strip_comment(line);
        for c in code.chars() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        if depth <= 0 {
            return code.trim_end().ends_with(':').then_some(idx);
        }
    }
    None
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(code, _)| code)
}

fn is_docstring_line(line: &str) -> bool {
    line.contains(r#"""""#) || line.contains("'''")
}

/// Body indentation: the body's own indent when deeper than the `def`,
/// otherwise the `def` indent plus four spaces.
fn body_indent(def_indent: &str, body: &str) -> String {
    let body_ws: String = body.chars().take_while(|c| c.is_whitespace()).collect();
    if body_ws.len() > def_indent.len() && body_ws.starts_with(def_indent) {
        body_ws
    } else {
        format!("{def_indent}    ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "def process_data(items):\n\tresult = []\n\tfor item in items:\n\t\tresult.append(item * 2)\n\treturn result";

    #[test]
    fn return_annotation_added_once() {
        let once = add_return_annotations("def f(a, b):\n    pass\n");
        assert_eq!(once, "def f(a, b) -> None:\n    pass\n");
        assert_eq!(add_return_annotations(&once), once);
    }

    #[test]
    fn annotated_signatures_untouched() {
        let src = "def f(a) -> int:\n    return a\n";
        assert_eq!(add_return_annotations(src), src);
    }

    #[test]
    fn docstring_inserted_with_body_indent() {
        let updated = add_docstrings(SAMPLE);
        let lines: Vec<&str> = updated.lines().collect();
        assert_eq!(lines[0], "def process_data(items):");
        assert_eq!(lines[1], format!("\t{PLACEHOLDER_DOCSTRING}"));
        assert_eq!(lines[2], "\tresult = []");
    }

    #[test]
    fn docstring_transform_is_idempotent() {
        let once = add_docstrings(SAMPLE);
        assert_eq!(add_docstrings(&once), once);
    }

    #[test]
    fn existing_docstring_is_respected() {
        let src = "class A:\n    def m(self):\n\n        \"\"\"Doc.\"\"\"\n        return 1\n";
        assert_eq!(add_docstrings(src), src);
    }

    #[test]
    fn blank_lines_are_preserved_once() {
        let src = "def f():\n\n    return 1";
        assert_eq!(
            add_docstrings(src),
            format!("def f():\n\n    {PLACEHOLDER_DOCSTRING}\n    return 1")
        );
    }

    #[test]
    fn multiline_signature_gets_docstring_after_closing_line() {
        let src = "def f(\n    a,\n    b,\n):\n    return a";
        let updated = add_docstrings(src);
        assert_eq!(
            updated,
            format!("def f(\n    a,\n    b,\n):\n    {PLACEHOLDER_DOCSTRING}\n    return a")
        );
    }

    #[test]
    fn one_line_function_is_skipped() {
        let src = "def f(): return 1\n";
        assert_eq!(add_docstrings(src), src);
    }

    #[test]
    fn dispatch_by_kind_and_keywords() {
        assert_eq!(
            select_transform(FileKind::Python, "Add Type Hints to helpers"),
            Some(Transform::ReturnAnnotations)
        );
        assert_eq!(
            select_transform(FileKind::Python, "add return annotation"),
            Some(Transform::ReturnAnnotations)
        );
        assert_eq!(
            select_transform(FileKind::Python, "Add DOCSTRING to foo"),
            Some(Transform::Docstrings)
        );
        assert_eq!(select_transform(FileKind::Python, "remove unused import"), None);
        assert_eq!(select_transform(FileKind::Documentation, "add docstring"), None);
        assert_eq!(select_transform(FileKind::Other, "add type hints"), None);
    }

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_extension("py"), FileKind::Python);
        assert_eq!(FileKind::from_extension("MD"), FileKind::Documentation);
        assert_eq!(FileKind::from_extension("toml"), FileKind::Other);
    }
}
