// Core domain types shared across all Vellum crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Arbitrary key-value metadata attached to an artifact.
pub type Metadata = serde_json::Map<String, Value>;

/// Title length bound, in characters.
pub const TITLE_MAX_CHARS: usize = 200;
/// Content length bound, in characters.
pub const CONTENT_MAX_CHARS: usize = 100_000;
/// Maximum number of historical snapshots retained per artifact.
pub const RETENTION_CAP: usize = 20;
/// Maximum number of version summaries returned to callers.
pub const VERSION_PAGE_LIMIT: usize = 10;

/// A user-owned markdown artifact (note, prompt, document).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Monotonically increasing; bumped only by title/content changes.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable historical copy of an artifact's state at a prior version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionSnapshot {
    pub version: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub updated_at: DateTime<Utc>,
    pub content_length: usize,
    /// Whether the title changed relative to the snapshot preceding this one.
    #[serde(default)]
    pub title_changed: bool,
    /// Whether the content changed relative to the snapshot preceding this one.
    #[serde(default)]
    pub content_changed: bool,
}

/// Summary of a snapshot for version-history listings (no content body).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionSummary {
    pub version: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub content_length: usize,
    /// Subset of `["title", "content"]`.
    pub changes: Vec<String>,
}

/// Summary-level comparison of two versions. Not a textual patch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionDiff {
    pub from_version: i64,
    pub to_version: i64,
    pub title_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_title: Option<String>,
    pub content_length_change: i64,
    pub metadata_changed: bool,
}

/// A search result: title plus a snippet, never the full content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: Uuid,
    pub title: String,
    pub snippet: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A permission tag granted to a credential, checked per-operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Delete,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Read, Scope::Write, Scope::Delete];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }

    pub fn from_str_value(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
