//! Identity types for chronicle entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Novel identifier using UUIDv7 for timestamp-sortable IDs.
/// Every entity in the store is scoped by one of these.
pub type NovelId = Uuid;

/// One-based chapter number within a novel.
pub type ChapterNumber = u32;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 NovelId (timestamp-sortable).
pub fn new_novel_id() -> NovelId {
    Uuid::now_v7()
}
