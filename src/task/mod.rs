//! Task document storage and lifecycle management.
//!
//! A task lives on disk as a structured header followed by a markdown body.
//! This module parses and renders those documents, keeps a disposable index
//! over them, mutates them under optimistic concurrency control and enforces
//! the status state machine. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - The document codec in [`document`]
//! - Pure lifecycle rules in [`lifecycle`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]
//! - Derived export artefacts in [`export`]

pub mod adapters;
pub mod document;
pub mod domain;
pub mod export;
pub mod lifecycle;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
