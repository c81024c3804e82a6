//! Taskplane: repository-resident task documents for cooperating agents.
//!
//! This crate stores tasks as human-readable documents inside a git
//! repository and coordinates multiple agents (and humans) that read and
//! mutate them, possibly from separate processes at the same time.
//!
//! # Architecture
//!
//! Taskplane follows hexagonal architecture principles:
//!
//! - **Domain**: Task records, statuses, approval gates and the audit log
//! - **Ports**: The backend capability contract and the issue tracker client
//! - **Adapters**: The local document store and the remote issue tracker
//!   mirror
//!
//! # Modules
//!
//! - [`task`]: Task documents, lifecycle rules and storage backends
//! - [`config`]: Backend configuration loading and validation

pub mod config;
pub mod task;
