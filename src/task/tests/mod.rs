//! Unit tests for the task module.
//!
//! Tests are organised by component: domain values, the document codec,
//! lifecycle rules, the index cache, the local and remote backends and the
//! workflow service.

mod strategies;
mod support;

mod document_tests;
