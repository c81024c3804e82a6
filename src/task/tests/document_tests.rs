//! Tests for the task document codec and section helpers.

use super::strategies;
use super::support::{fixed_time, task};
use crate::task::document::{
    DocumentError, TaskDocument, normalize_body, parse_document, render_document, task_header,
    sections::{VERIFICATION_SECTION, default_body, section, set_section},
};
use crate::task::domain::{TaskComment, TaskEvent, TaskStatus};
use proptest::prelude::*;
use rstest::rstest;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

#[rstest]
fn task_document_round_trips() {
    let mut subject = task("202601151230-ABC123", "Round trip", TaskStatus::Doing);
    subject.created_at = Some(fixed_time());
    subject.tags = vec!["codec".to_owned()];
    subject.comments.push(TaskComment::new("alice", "looks good"));
    subject.events.append(TaskEvent::status(
        fixed_time(),
        "alice",
        TaskStatus::Todo,
        TaskStatus::Doing,
        None,
    ));
    subject.origin = Some(json!({ "system": "redmine", "issue_id": 7 }));
    subject
        .extra
        .insert("owner_team".to_owned(), json!("platform"));

    let body = default_body(&subject.title).expect("scaffold renders");
    let document = TaskDocument::new(subject, body);
    let rendered = document.render().expect("document renders");
    let reparsed = TaskDocument::parse(&rendered).expect("document parses");

    assert_eq!(reparsed, document);
    assert_eq!(reparsed.render().expect("document renders"), rendered);
}

#[rstest]
fn header_keys_follow_canonical_order() {
    let mut subject = task("202601151230-ABC123", "Ordered", TaskStatus::Todo);
    subject.extra.insert("zz_custom".to_owned(), json!(true));
    let rendered = TaskDocument::new(subject, "")
        .render()
        .expect("document renders");

    assert!(rendered.starts_with(concat!(
        "---\nid: \"202601151230-ABC123\"\n",
        "title: \"Ordered\"\nstatus: \"TODO\"\npriority: \"med\"\n",
    )));
    let position = |key: &str| {
        rendered
            .find(&format!("\n{key}:"))
            .unwrap_or_else(|| panic!("missing key {key}"))
    };
    assert!(position("doc_version") < position("events"));
    assert!(position("events") < position("zz_custom"));
    assert!(rendered.ends_with("---\n"));
}

#[rstest]
fn empty_collections_render_inline() {
    let rendered = render_document(&json!({ "tags": [], "origin": {} }), "")
        .expect("header renders");
    assert_eq!(rendered, "---\norigin: {}\ntags: []\n---\n");
}

#[rstest]
fn mixed_sequences_render_in_flow_form() {
    let rendered = render_document(&json!({ "mixed": [1, "two", null] }), "")
        .expect("header renders");
    assert_eq!(rendered, "---\nmixed: [1, \"two\", null]\n---\n");
}

#[rstest]
fn lists_of_mappings_render_as_blocks() {
    let header = json!({ "comments": [{ "body": "b", "author": "a" }] });
    let rendered = render_document(&header, "").expect("header renders");
    assert_eq!(
        rendered,
        "---\ncomments:\n  - author: \"a\"\n    body: \"b\"\n---\n"
    );
    let (parsed, _) = parse_document(&rendered).expect("header parses");
    assert_eq!(serde_json::Value::Object(parsed), header);
}

#[rstest]
fn body_is_normalised_on_render() {
    let rendered = render_document(&json!({ "a": 1 }), "\n\n  body text  \n\n\n")
        .expect("document renders");
    assert_eq!(rendered, "---\na: 1\n---\n\n  body text\n");
}

#[rstest]
fn strings_are_escaped_and_recovered() {
    let awkward = "say \"hi\"\\ now\nnext\ttab\u{7}";
    let rendered = render_document(&json!({ "title": awkward, "yes": "no" }), "")
        .expect("header renders");
    assert!(rendered.contains("\"yes\": \"no\""));

    let (header, body) = parse_document(&rendered).expect("document parses");
    assert_eq!(header.get("title"), Some(&json!(awkward)));
    assert_eq!(header.get("yes"), Some(&json!("no")));
    assert!(body.is_empty());
}

#[rstest]
#[case::no_header("just a body\n")]
#[case::unterminated("---\nid: \"x\"\n")]
#[case::list_header("---\n- a\n- b\n---\nbody\n")]
#[case::scalar_header("---\nplain\n---\n")]
#[case::invalid_yaml("---\nkey: [unclosed\n---\n")]
fn malformed_documents_are_rejected(#[case] text: &str) {
    assert!(matches!(
        parse_document(text),
        Err(DocumentError::MalformedDocument(_))
    ));
}

#[rstest]
fn duplicated_headers_are_stripped_from_body() {
    let text = "---\na: 1\n---\n\n---\na: 1\n---\n\n---\nb: 2\n---\n\nReal body\n";
    let (header, body) = parse_document(text).expect("document parses");
    assert_eq!(header.get("a"), Some(&json!(1)));
    assert_eq!(body, "Real body\n");
}

#[rstest]
fn crlf_and_bom_are_accepted() {
    let text = "\u{feff}---\r\na: 1\r\n---\r\n\r\nBody\r\n";
    let (header, body) = parse_document(text).expect("document parses");
    assert_eq!(header.get("a"), Some(&json!(1)));
    assert_eq!(body, "Body\n");
}

#[derive(Serialize)]
struct TupleKeyed {
    pairs: BTreeMap<(u8, u8), u8>,
}

#[rstest]
fn unrepresentable_headers_are_reported() {
    let header = TupleKeyed {
        pairs: BTreeMap::from([((1, 2), 3)]),
    };
    assert!(matches!(
        render_document(&header, ""),
        Err(DocumentError::UnsupportedScalar { .. })
    ));
}

#[rstest]
fn non_mapping_headers_are_rejected_on_render() {
    assert!(matches!(
        render_document(&json!([1, 2]), ""),
        Err(DocumentError::MalformedDocument(_))
    ));
}

#[rstest]
fn default_body_lists_sections_and_summary() {
    let body = default_body("Ship it").expect("scaffold renders");
    assert!(body.starts_with("## Summary\n\nShip it\n\n## Context\n"));
    assert!(body.ends_with("## Verification\n"));
    assert_eq!(section(&body, "Summary"), Some("Ship it".to_owned()));
    assert_eq!(section(&body, "Context"), Some(String::new()));
    assert_eq!(section(&body, "Missing"), None);
}

#[rstest]
fn set_section_replaces_only_the_named_section() {
    let body = "## A\n\nold\n\n## B\n\nkeep\n";
    assert_eq!(
        set_section(body, "A", "new"),
        "## A\n\nnew\n\n## B\n\nkeep\n"
    );
}

#[rstest]
fn set_section_rewrites_trailing_section() {
    let body = default_body("T").expect("scaffold renders");
    let updated = set_section(&body, VERIFICATION_SECTION, "- state: ok");
    assert!(updated.starts_with(body.as_str()));
    assert!(updated.ends_with("## Verification\n\n- state: ok\n"));
    assert_eq!(
        section(&updated, VERIFICATION_SECTION),
        Some("- state: ok".to_owned())
    );
}

#[rstest]
fn set_section_appends_missing_section() {
    assert_eq!(
        set_section("## A\n\nx\n", "Z", "z"),
        "## A\n\nx\n\n## Z\n\nz\n"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn rendered_documents_parse_back_unchanged(
        subject in strategies::task_data(),
        body in strategies::body(),
    ) {
        let header = task_header(&subject).expect("header serialises");
        let rendered = render_document(&header, &body).expect("document renders");

        let (parsed_header, parsed_body) = parse_document(&rendered).expect("document parses");
        prop_assert_eq!(parsed_header, header);
        prop_assert_eq!(&parsed_body, &normalize_body(&body));

        let document = TaskDocument::parse(&rendered).expect("task header decodes");
        prop_assert_eq!(
            document,
            TaskDocument::new(subject.normalized(), normalize_body(&body))
        );
    }
}
