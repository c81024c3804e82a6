//! Task document codec.
//!
//! A task document is a structured header between two `---` lines followed
//! by a markdown body:
//!
//! ```text
//! ---
//! id: "202601011200-ABC123"
//! title: "Write the codec"
//! status: "TODO"
//! ---
//!
//! ## Summary
//! ```
//!
//! Rendering is deterministic, so `parse(render(header, body))` returns the
//! same header and body for every document this crate writes.

mod error;
mod parse;
mod render;
pub mod sections;

pub use error::{DocumentError, DocumentResult};
pub use parse::{normalize_body, parse_document};
pub use render::{render_document, render_header};

use crate::task::domain::TaskData;
use serde_json::{Map, Value};

/// A task record together with its markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDocument {
    /// Typed header.
    pub task: TaskData,
    /// Markdown body.
    pub body: String,
}

impl TaskDocument {
    /// Pairs a task with a body.
    #[must_use]
    pub fn new(task: TaskData, body: impl Into<String>) -> Self {
        Self {
            task,
            body: body.into(),
        }
    }

    /// Parses a document and decodes its header into a [`TaskData`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::MalformedDocument`] when the header block is
    /// missing, is not a mapping, or does not describe a task.
    pub fn parse(text: &str) -> DocumentResult<Self> {
        let (header, body) = parse_document(text)?;
        let task: TaskData = serde_json::from_value(Value::Object(header))
            .map_err(|err| DocumentError::malformed(format!("invalid task header: {err}")))?;
        Ok(Self::new(task.normalized(), body))
    }

    /// Renders the document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsupportedScalar`] when the task cannot be
    /// represented as a header.
    pub fn render(&self) -> DocumentResult<String> {
        render_document(&task_header(&self.task)?, &self.body)
    }
}

/// Converts a task into its header mapping.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedScalar`] when a value cannot be
/// serialised.
pub fn task_header(task: &TaskData) -> DocumentResult<Map<String, Value>> {
    render::header_value(task)
}
