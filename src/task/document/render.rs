//! Deterministic document rendering.

use super::parse::{normalize_body, value_kind};
use super::{DocumentError, DocumentResult};
use serde::Serialize;
use serde_json::{Map, Value};

const INDENT: usize = 2;

/// Preferred order of top-level header keys. Remaining keys follow in
/// lexicographic order.
const HEADER_KEY_ORDER: &[&str] = &[
    "id",
    "title",
    "status",
    "priority",
    "owner",
    "created_at",
    "created_by",
    "origin",
    "depends_on",
    "tags",
    "verify",
    "plan_approval",
    "verification",
    "commit",
    "comments",
    "doc_version",
    "doc_updated_at",
    "doc_updated_by",
    "description",
    "id_source",
    "dirty",
];

const COMMENT_KEY_ORDER: &[&str] = &["author", "body"];
const EVENT_KEY_ORDER: &[&str] = &["type", "at", "author", "from", "to", "state", "note"];
const COMMIT_KEY_ORDER: &[&str] = &["hash", "message"];
const GATE_KEY_ORDER: &[&str] = &["state", "updated_at", "updated_by", "note"];

const RESERVED_WORDS: &[&str] = &["null", "true", "false", "yes", "no", "on", "off", "y", "n"];

/// Renders a header and body into a document.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedScalar`] when the header cannot be
/// serialised and [`DocumentError::MalformedDocument`] when it is not a
/// mapping.
pub fn render_document<T>(header: &T, body: &str) -> DocumentResult<String>
where
    T: Serialize + ?Sized,
{
    let header_text = render_header(header)?;
    let normalized_body = normalize_body(body);

    let mut out = String::with_capacity(header_text.len() + normalized_body.len() + 16);
    out.push_str("---\n");
    out.push_str(&header_text);
    out.push_str("---\n");
    if !normalized_body.is_empty() {
        out.push('\n');
        out.push_str(&normalized_body);
    }
    Ok(out)
}

/// Renders only the header lines (without delimiters).
///
/// # Errors
///
/// See [`render_document`].
pub fn render_header<T>(header: &T) -> DocumentResult<String>
where
    T: Serialize + ?Sized,
{
    let map = header_value(header)?;
    let mut writer = HeaderWriter::default();
    if map.is_empty() {
        writer.out.push_str("{}\n");
    } else {
        writer.mapping(&map, 0, None);
    }
    Ok(writer.out)
}

pub(super) fn header_value<T>(header: &T) -> DocumentResult<Map<String, Value>>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(header) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DocumentError::malformed(format!(
            "header must be a mapping, found {}",
            value_kind(&other)
        ))),
        Err(err) => Err(DocumentError::UnsupportedScalar {
            path: "header".to_owned(),
            detail: err.to_string(),
        }),
    }
}

fn preferred_order(field: Option<&str>) -> &'static [&'static str] {
    match field {
        None => HEADER_KEY_ORDER,
        Some("comments") => COMMENT_KEY_ORDER,
        Some("events") => EVENT_KEY_ORDER,
        Some("commit") => COMMIT_KEY_ORDER,
        Some("plan_approval" | "verification") => GATE_KEY_ORDER,
        Some(_) => &[],
    }
}

fn ordered_keys<'a>(map: &'a Map<String, Value>, order: &[&'static str]) -> Vec<&'a str> {
    let mut keys: Vec<&str> = order
        .iter()
        .copied()
        .filter(|key| map.contains_key(*key))
        .collect();
    let mut remaining: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|key| !order.contains(key))
        .collect();
    remaining.sort_unstable();
    keys.extend(remaining);
    keys
}

#[derive(Default)]
struct HeaderWriter {
    out: String,
}

impl HeaderWriter {
    fn pad(&mut self, indent: usize) {
        self.out.extend(std::iter::repeat_n(' ', indent));
    }

    fn mapping(&mut self, map: &Map<String, Value>, indent: usize, field: Option<&str>) {
        for key in ordered_keys(map, preferred_order(field)) {
            if let Some(value) = map.get(key) {
                self.entry(key, value, indent);
            }
        }
    }

    fn entry(&mut self, key: &str, value: &Value, indent: usize) {
        self.pad(indent);
        write_key(&mut self.out, key);
        self.out.push(':');
        match value {
            Value::Object(map) if map.is_empty() => self.out.push_str(" {}\n"),
            Value::Object(map) => {
                self.out.push('\n');
                self.mapping(map, indent + INDENT, Some(key));
            }
            Value::Array(items) if items.is_empty() => self.out.push_str(" []\n"),
            Value::Array(items) if items.iter().all(Value::is_string) => {
                self.out.push('\n');
                for item in items {
                    self.pad(indent + INDENT);
                    self.out.push_str("- ");
                    write_scalar(&mut self.out, item);
                    self.out.push('\n');
                }
            }
            Value::Array(items) if items.iter().all(Value::is_object) => {
                self.out.push('\n');
                for item in items.iter().filter_map(Value::as_object) {
                    self.list_mapping(item, indent + INDENT, key);
                }
            }
            Value::Array(_) => {
                self.out.push(' ');
                write_flow(&mut self.out, value);
                self.out.push('\n');
            }
            scalar => {
                self.out.push(' ');
                write_scalar(&mut self.out, scalar);
                self.out.push('\n');
            }
        }
    }

    /// Writes `- key: value` with the remaining keys aligned under the first.
    fn list_mapping(&mut self, map: &Map<String, Value>, indent: usize, field: &str) {
        self.pad(indent);
        self.out.push('-');
        if map.is_empty() {
            self.out.push_str(" {}\n");
            return;
        }
        self.out.push(' ');

        let mut nested = Self::default();
        nested.mapping(map, indent + INDENT, Some(field));
        let first_line_pad = " ".repeat(indent + INDENT);
        let rendered = nested
            .out
            .strip_prefix(first_line_pad.as_str())
            .unwrap_or(&nested.out);
        self.out.push_str(rendered);
    }
}

fn write_key(out: &mut String, key: &str) {
    if is_plain_key(key) {
        out.push_str(key);
    } else {
        write_quoted(out, key);
    }
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let shape_ok = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    shape_ok && !RESERVED_WORDS.contains(&key.to_ascii_lowercase().as_str())
}

fn write_scalar(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_quoted(out, text),
        Value::Array(_) | Value::Object(_) => write_flow(out, value),
    }
}

fn write_flow(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                write_flow(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (position, key) in ordered_keys(map, &[]).into_iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(": ");
                if let Some(item) = map.get(key) {
                    write_flow(out, item);
                }
            }
            out.push('}');
        }
        scalar => write_scalar(out, scalar),
    }
}

/// Writes a double-quoted scalar. Anything a YAML reader would fold or
/// reject is escaped.
fn write_quoted(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other if needs_escape(other) => {
                out.push_str(&format!("\\u{:04X}", u32::from(other)));
            }
            other => out.push(other),
        }
    }
    out.push('"');
}

fn needs_escape(ch: char) -> bool {
    ch.is_control() || matches!(ch, '\u{2028}' | '\u{2029}' | '\u{feff}' | '\u{fffe}' | '\u{ffff}')
}
