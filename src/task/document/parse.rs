//! Document parsing.

use super::{DocumentError, DocumentResult};
use serde_json::{Map, Value};

const DELIMITER: &str = "---";

/// Splits a document into its header mapping and normalised body.
///
/// Header blocks accidentally duplicated at the top of the body by earlier
/// writers are discarded, so the body always starts at its first real
/// content line.
///
/// # Errors
///
/// Returns [`DocumentError::MalformedDocument`] when the document does not
/// start with a delimited header block or the header is not a mapping.
pub fn parse_document(text: &str) -> DocumentResult<(Map<String, Value>, String)> {
    let without_bom = text.strip_prefix('\u{feff}').unwrap_or(text);
    let unix = without_bom.replace("\r\n", "\n");
    let (header_text, rest) = split_header(&unix)
        .ok_or_else(|| DocumentError::malformed("missing leading `---` header block"))?;
    let header = decode_header(header_text)?;
    Ok((header, normalize_body(strip_duplicate_headers(rest))))
}

/// Normalises a body: leading blank lines and trailing whitespace are
/// removed and a non-empty body ends with exactly one newline.
#[must_use]
pub fn normalize_body(body: &str) -> String {
    let trimmed = skip_blank_lines(body).trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

fn split_header(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let opening = lines.next()?;
    if opening.trim_end() != DELIMITER || !opening.ends_with('\n') {
        return None;
    }

    let header_start = opening.len();
    let mut cursor = header_start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let header = text.get(header_start..cursor)?;
            let rest = text.get(cursor + line.len()..)?;
            return Some((header, rest));
        }
        cursor += line.len();
    }
    None
}

fn decode_header(text: &str) -> DocumentResult<Map<String, Value>> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DocumentError::malformed(format!(
            "header must be a mapping, found {}",
            value_kind(&other)
        ))),
        Err(err) => Err(DocumentError::malformed(format!("invalid header: {err}"))),
    }
}

fn strip_duplicate_headers(rest: &str) -> &str {
    let mut remaining = skip_blank_lines(rest);
    while let Some((header, after)) = split_header(remaining) {
        if decode_header(header).is_err() {
            break;
        }
        remaining = skip_blank_lines(after);
    }
    remaining
}

fn skip_blank_lines(text: &str) -> &str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        offset += line.len();
    }
    text.get(offset..).unwrap_or_default()
}

pub(super) const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
