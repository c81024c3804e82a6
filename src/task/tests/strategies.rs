//! Property-test generators for task values.

use crate::task::domain::{
    ApprovalState, IdSource, TaskComment, TaskCommit, TaskData, TaskEvent, TaskEvents, TaskGate,
    TaskId, TaskStatus, VerificationState,
};
use chrono::{DateTime, Utc};
use proptest::collection::{btree_map, vec};
use proptest::option;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Printable text, including quotes, colons and non-ASCII characters.
pub(super) fn text() -> impl Strategy<Value = String> + Clone {
    "\\PC{0,24}"
}

pub(super) fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0_i64..4_000_000_000, 0_u32..1_000).prop_filter_map("timestamp in range", |(secs, millis)| {
        DateTime::from_timestamp(secs, millis * 1_000_000)
    })
}

pub(super) fn task_id() -> impl Strategy<Value = TaskId> {
    "[0-9]{12}-[A-Z0-9]{1,16}".prop_filter_map("valid task id", |raw| TaskId::parse(&raw).ok())
}

fn status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn approval() -> impl Strategy<Value = ApprovalState> {
    prop_oneof![
        Just(ApprovalState::Pending),
        Just(ApprovalState::Approved),
        Just(ApprovalState::Rejected),
    ]
}

fn verification() -> impl Strategy<Value = VerificationState> {
    prop_oneof![
        Just(VerificationState::Pending),
        Just(VerificationState::Ok),
        Just(VerificationState::NeedsRework),
    ]
}

fn gate<S>(state: impl Strategy<Value = S>) -> impl Strategy<Value = TaskGate<S>>
where
    S: Default + std::fmt::Debug + Clone,
{
    option::of((state, timestamp(), text(), option::of(text()))).prop_map(|recorded| {
        recorded.map_or_else(TaskGate::pending, |(decision, at, by, note)| {
            TaskGate::recorded(decision, at, by, note)
        })
    })
}

/// One event as produced by a lifecycle operation.
pub(super) fn event() -> impl Strategy<Value = TaskEvent> {
    let notes = option::of(text());
    prop_oneof![
        (timestamp(), text(), status(), status(), notes.clone()).prop_map(
            |(at, author, from, to, note)| TaskEvent::status(at, author, from, to, note)
        ),
        (timestamp(), text(), verification(), notes.clone())
            .prop_map(|(at, author, state, note)| TaskEvent::verify(at, author, state, note)),
        (timestamp(), text(), approval(), notes).prop_map(|(at, author, state, note)| {
            TaskEvent::plan_approval(at, author, state, note)
        }),
        (timestamp(), text()).prop_map(|(at, author)| TaskEvent::comment(at, author)),
    ]
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        text().prop_map(Value::from),
    ]
}

/// Header values written by other tools: scalars, lists and small maps.
fn foreign_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => scalar(),
        1 => vec(text(), 0..4)
            .prop_map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
        1 => vec(scalar(), 0..4).prop_map(Value::Array),
        1 => btree_map("[a-z]{1,8}", scalar(), 0..4)
            .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
    ]
}

fn origin() -> impl Strategy<Value = Option<Value>> {
    option::of(prop_oneof![
        text().prop_map(Value::from),
        btree_map("[a-z]{1,8}", text().prop_map(Value::from), 1..4)
            .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
    ])
}

fn comment() -> impl Strategy<Value = TaskComment> {
    (text(), text()).prop_map(|(author, body)| TaskComment::new(author, body))
}

fn commit() -> impl Strategy<Value = Option<TaskCommit>> {
    option::of(
        ("[0-9a-f]{7,40}", text()).prop_map(|(hash, message)| TaskCommit::new(hash, message)),
    )
}

fn id_source() -> impl Strategy<Value = Option<IdSource>> {
    option::of(prop_oneof![Just(IdSource::Generated), Just(IdSource::Explicit)])
}

/// An arbitrary task header, including fields this crate does not model.
pub(super) fn task_data() -> impl Strategy<Value = TaskData> {
    let identity_fields = (
        task_id(),
        "[A-Za-z0-9]\\PC{0,23}",
        status(),
        text(),
        text(),
        option::of(timestamp()),
        option::of(text()),
        origin(),
    );
    let set_fields = (
        vec(task_id(), 0..4),
        vec(text(), 0..4),
        vec(text(), 0..3),
    );
    let workflow_fields = (
        gate(approval()),
        gate(verification()),
        commit(),
        vec(comment(), 0..3),
        vec(event(), 0..5),
    );
    let bookkeeping_fields = (
        1_u32..1_000,
        option::of(timestamp()),
        option::of(text()),
        text(),
        id_source(),
        option::of(any::<bool>()),
        btree_map("x_[a-z0-9_]{1,10}", foreign_value(), 0..4),
    );

    (identity_fields, set_fields, workflow_fields, bookkeeping_fields).prop_filter_map(
        "title must not be blank",
        |(identity, sets, workflow, bookkeeping)| {
            let (id, title, status, priority, owner, created_at, created_by, origin) = identity;
            let (depends_on, tags, verify) = sets;
            let (plan_approval, verification, commit, comments, events) = workflow;
            let (
                doc_version,
                doc_updated_at,
                doc_updated_by,
                description,
                id_source,
                dirty,
                extra,
            ) = bookkeeping;

            let mut task = TaskData::new(id, title).ok()?;
            task.status = status;
            task.priority = priority;
            task.owner = owner;
            task.created_at = created_at;
            task.created_by = created_by;
            task.origin = origin;
            task.depends_on = depends_on;
            task.tags = tags;
            task.verify = verify;
            task.plan_approval = plan_approval;
            task.verification = verification;
            task.commit = commit;
            task.comments = comments;
            task.events = events.into_iter().fold(TaskEvents::new(), |mut log, event| {
                log.append(event);
                log
            });
            task.doc_version = doc_version;
            task.doc_updated_at = doc_updated_at;
            task.doc_updated_by = doc_updated_by;
            task.description = description;
            task.id_source = id_source;
            task.dirty = dirty;
            task.extra = extra;
            Some(task)
        },
    )
}

/// Markdown-ish bodies. Lines never start a `---` header block.
pub(super) fn body() -> impl Strategy<Value = String> {
    vec("[A-Za-z0-9 #*_.]{0,20}", 0..8).prop_map(|lines| lines.join("\n"))
}
