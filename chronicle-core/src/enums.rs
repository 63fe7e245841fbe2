//! Enum types for chronicle entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Entity type discriminator used in storage errors and cleanup reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    CharacterState,
    Relationship,
    OpenQuest,
    Event,
    Foreshadow,
    Plotline,
    ConflictArc,
    CharacterArc,
    CharacterProfile,
    Volume,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityType::CharacterState => "CharacterState",
            EntityType::Relationship => "Relationship",
            EntityType::OpenQuest => "OpenQuest",
            EntityType::Event => "Event",
            EntityType::Foreshadow => "Foreshadow",
            EntityType::Plotline => "Plotline",
            EntityType::ConflictArc => "ConflictArc",
            EntityType::CharacterArc => "CharacterArc",
            EntityType::CharacterProfile => "CharacterProfile",
            EntityType::Volume => "Volume",
        };
        write!(f, "{}", value)
    }
}

impl From<GraphEntityKind> for EntityType {
    fn from(kind: GraphEntityKind) -> Self {
        match kind {
            GraphEntityKind::Event => EntityType::Event,
            GraphEntityKind::Foreshadow => EntityType::Foreshadow,
            GraphEntityKind::Plotline => EntityType::Plotline,
            GraphEntityKind::ConflictArc => EntityType::ConflictArc,
            GraphEntityKind::CharacterArc => EntityType::CharacterArc,
            GraphEntityKind::CharacterProfile => EntityType::CharacterProfile,
        }
    }
}

// ============================================================================
// QUEST STATUS
// ============================================================================

/// Lifecycle of an open quest. Resolution is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestStatus {
    #[default]
    Open,
    Resolved,
}

impl QuestStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            QuestStatus::Open => "OPEN",
            QuestStatus::Resolved => "RESOLVED",
        }
    }

    /// Parse from database string representation (case-insensitive).
    pub fn from_db_str(s: &str) -> Result<Self, QuestStatusParseError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(QuestStatus::Open),
            "RESOLVED" => Ok(QuestStatus::Resolved),
            _ => Err(QuestStatusParseError(s.to_string())),
        }
    }

    /// Whether no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Resolved)
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for QuestStatus {
    type Err = QuestStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid quest status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestStatusParseError(pub String);

impl fmt::Display for QuestStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid quest status: {}", self.0)
    }
}

impl std::error::Error for QuestStatusParseError {}

// ============================================================================
// GRAPH ENTITY KIND
// ============================================================================

/// Narrative graph node categories written by collaborators and read back
/// by context assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum GraphEntityKind {
    Event,
    Foreshadow,
    Plotline,
    ConflictArc,
    CharacterArc,
    CharacterProfile,
}

impl GraphEntityKind {
    /// All kinds, in the order context assembly loads them.
    pub const ALL: [GraphEntityKind; 6] = [
        GraphEntityKind::Event,
        GraphEntityKind::Foreshadow,
        GraphEntityKind::Plotline,
        GraphEntityKind::ConflictArc,
        GraphEntityKind::CharacterArc,
        GraphEntityKind::CharacterProfile,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            GraphEntityKind::Event => "event",
            GraphEntityKind::Foreshadow => "foreshadow",
            GraphEntityKind::Plotline => "plotline",
            GraphEntityKind::ConflictArc => "conflict_arc",
            GraphEntityKind::CharacterArc => "character_arc",
            GraphEntityKind::CharacterProfile => "character_profile",
        }
    }

    /// Parse from database string representation.
    /// Accepts snake_case, camelCase and PascalCase spellings.
    pub fn from_db_str(s: &str) -> Result<Self, GraphEntityKindParseError> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "event" => Ok(GraphEntityKind::Event),
            "foreshadow" => Ok(GraphEntityKind::Foreshadow),
            "plotline" => Ok(GraphEntityKind::Plotline),
            "conflictarc" => Ok(GraphEntityKind::ConflictArc),
            "characterarc" => Ok(GraphEntityKind::CharacterArc),
            "characterprofile" => Ok(GraphEntityKind::CharacterProfile),
            _ => Err(GraphEntityKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for GraphEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for GraphEntityKind {
    type Err = GraphEntityKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid graph entity kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEntityKindParseError(pub String);

impl fmt::Display for GraphEntityKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid graph entity kind: {}", self.0)
    }
}

impl std::error::Error for GraphEntityKindParseError {}
