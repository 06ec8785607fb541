//! Umbrella crate for the workspace integration tests
pub use gradle_bridge_core::*;
