//! Chronicle Storage - Store Traits and In-Memory Implementation
//!
//! Defines the narrow storage interface the continuity engines consume.
//! Real backends live outside this workspace.

pub mod mock;
pub mod store;

pub use mock::MockEntityStore;
pub use store::{ChapterCleanup, EntityStore, QuestUpsert, VolumeStore};
