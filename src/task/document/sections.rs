//! Named markdown sections in task bodies.
//!
//! Bodies are free text owned by whoever edits them, except for a few
//! sections the workflow rewrites programmatically (`Plan`,
//! `Verification`). Rewrites replace exactly one section and leave every
//! other byte of the body alone.

use super::{DocumentError, DocumentResult};
use minijinja::{Environment, context};

/// Section headings written into new task bodies, in order.
pub const DEFAULT_SECTIONS: &[&str] = &[
    "Summary",
    "Context",
    "Scope",
    "Risks",
    "Verify Steps",
    "Rollback Plan",
    "Notes",
    "Plan",
    "Verification",
];

/// Section rewritten with the approved plan.
pub const PLAN_SECTION: &str = "Plan";

/// Section rewritten with verification results.
pub const VERIFICATION_SECTION: &str = "Verification";

const BODY_TEMPLATE: &str = "\
{% for section in sections %}## {{ section }}

{% if section == \"Summary\" %}{{ title }}

{% endif %}{% endfor %}";

/// Renders the scaffold body for a new task.
///
/// # Errors
///
/// Returns [`DocumentError::Template`] if the scaffold template fails to
/// render.
pub fn default_body(title: &str) -> DocumentResult<String> {
    let env = Environment::new();
    let rendered = env
        .render_str(
            BODY_TEMPLATE,
            context! { title => title, sections => DEFAULT_SECTIONS },
        )
        .map_err(|err| DocumentError::Template(err.to_string()))?;
    Ok(super::normalize_body(&rendered))
}

/// Returns the trimmed content of a `## name` section.
#[must_use]
pub fn section(body: &str, name: &str) -> Option<String> {
    let span = locate(body, name)?;
    let content = body.get(span.content_start..span.content_end)?;
    Some(content.trim().to_owned())
}

/// Replaces the content of a `## name` section, appending the section when
/// the body does not have one.
#[must_use]
pub fn set_section(body: &str, name: &str, content: &str) -> String {
    let trimmed_content = content.trim();
    let Some(span) = locate(body, name) else {
        let mut out = body.trim_end().to_owned();
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!("## {name}\n"));
        if !trimmed_content.is_empty() {
            out.push('\n');
            out.push_str(trimmed_content);
            out.push('\n');
        }
        return out;
    };

    let before = body.get(..span.content_start).unwrap_or_default();
    let after = body.get(span.content_end..).unwrap_or_default();
    let mut out = String::with_capacity(body.len() + trimmed_content.len());
    out.push_str(before);
    if !trimmed_content.is_empty() {
        out.push('\n');
        out.push_str(trimmed_content);
        out.push('\n');
    }
    if !after.is_empty() {
        out.push('\n');
    }
    out.push_str(after);
    out
}

struct SectionSpan {
    content_start: usize,
    content_end: usize,
}

fn is_heading(line: &str) -> bool {
    line.starts_with("## ") || line.trim_end() == "##"
}

fn locate(body: &str, name: &str) -> Option<SectionSpan> {
    let heading = format!("## {name}");
    let mut cursor = 0;
    let mut content_start = None;

    for line in body.split_inclusive('\n') {
        match content_start {
            None if line.trim_end() == heading => content_start = Some(cursor + line.len()),
            Some(start) if is_heading(line) => {
                return Some(SectionSpan {
                    content_start: start,
                    content_end: cursor,
                });
            }
            _ => {}
        }
        cursor += line.len();
    }

    content_start.map(|start| SectionSpan {
        content_start: start,
        content_end: body.len(),
    })
}
