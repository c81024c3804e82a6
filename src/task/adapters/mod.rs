//! Adapter implementations for task storage ports.

pub mod local;
pub mod remote;
