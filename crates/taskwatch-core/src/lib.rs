//! taskwatch-core: pure state model for cross-tab task activity.
//!
//! Canonicalizes tab URLs, derives the canonical active-task total across
//! tabs, and implements the debounce/idle and heartbeat state machines as
//! side-effect-free functions. The async orchestration lives in
//! `taskwatch-runtime`.

pub mod canonical;
pub mod debounce;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod snapshot;
pub mod tabs;
pub mod total;
pub mod types;

pub use error::SnapshotError;
pub use types::{AggregateState, TabId, TabRecord};
