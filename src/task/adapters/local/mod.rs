//! Local, git-tracked task document store.
//!
//! Each task lives in `<tasks root>/<id>/README.md`. A derived index file in
//! a separate cache directory speeds up listings; it is advisory and is
//! rebuilt whenever it disagrees with the documents.

pub(crate) mod fs;
mod ids;
mod index;
mod store;

#[cfg(test)]
mod store_tests;

pub use ids::{allocate_task_id, random_suffix};
pub use index::{
    INDEX_SCHEMA_VERSION, TaskIndexCache, TaskIndexEntry, TaskIndexFile, decode_index,
    migrate_legacy_entries,
};
pub use store::{DOCUMENT_FILE_NAME, LocalTaskStore, NewTask, OccPolicy, UpdateOutcome};
