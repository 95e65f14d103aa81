//! `datastory-core`: shared building blocks for the orchestration core.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::InvalidId;
pub use id::{JobId, StoryId, UserId};
