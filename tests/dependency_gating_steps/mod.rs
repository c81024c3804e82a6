//! Step definitions for dependency gating scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
