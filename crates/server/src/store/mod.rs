// Artifact persistence.
//
// Every operation is owner-scoped: the `user_id` predicate is part of
// each lookup, and a non-owner sees NotFound rather than Forbidden.
// Mutations load the row, replay it through the version ledger, and
// write back with a version-checked compare-and-swap; losing the race
// surfaces as EDIT_CONFLICT.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use vellum_common::{
    edit,
    error::{validate_content, validate_title, DomainError},
    markdown,
    types::{Artifact, Metadata, SearchHit, VersionDiff, VersionSnapshot, VersionSummary},
    version::{CurrentState, MutationOutcome, VersionLedger},
};

use crate::error::ApiError;

/// Default page size for artifact listings.
pub const LIST_DEFAULT_LIMIT: usize = 50;
/// Upper bound on the artifact listing page size.
pub const LIST_MAX_LIMIT: usize = 100;

/// A state-changing request against one artifact. All variants replay
/// through the version ledger so history and version numbers stay
/// consistent across entry points.
#[derive(Debug, Clone)]
pub enum Mutation {
    Update { title: Option<String>, content: Option<String>, metadata: Option<Metadata> },
    Replace { old: String, new: String, replace_all: bool, count: Option<usize> },
    Insert { line: usize, text: String },
    Restore { version: i64 },
}

/// What a mutation did, alongside the resulting artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    pub outcome: MutationOutcome,
    /// Number of occurrences replaced, for `Mutation::Replace`.
    pub replacements: Option<usize>,
}

/// One page of version history.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionPage {
    pub versions: Vec<VersionSummary>,
    pub current_version: i64,
    pub total_edit_count: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryArtifact {
    id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    ledger: VersionLedger,
}

pub(crate) type MemoryArtifacts = Arc<RwLock<HashMap<Uuid, MemoryArtifact>>>;

#[derive(Clone)]
pub enum ArtifactStore {
    Postgres(PgPool),
    Memory(MemoryArtifacts),
}

impl ArtifactStore {
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        title: Option<String>,
        content: String,
        metadata: Option<Metadata>,
    ) -> Result<Artifact, ApiError> {
        validate_content(&content).map_err(ApiError::from)?;
        let title = match title {
            Some(title) => title,
            None => markdown::extract_title(&content),
        };
        validate_title(&title).map_err(ApiError::from)?;

        let now = Utc::now();
        let ledger = VersionLedger::new_artifact(title, content, metadata.unwrap_or_default(), now);
        let id = Uuid::new_v4();

        match self {
            Self::Postgres(pool) => create_pg(pool, id, user_id, &ledger, now).await?,
            Self::Memory(store) => {
                let mut guard = store.write().await;
                guard.insert(id, MemoryArtifact { id, user_id, created_at: now, ledger: ledger.clone() });
            }
        }

        Ok(artifact_from(id, user_id, now, ledger.current()))
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Artifact, ApiError> {
        match self {
            Self::Postgres(pool) => {
                let row = fetch_row(pool, user_id, id).await?;
                Ok(row.into_artifact())
            }
            Self::Memory(store) => {
                let guard = store.read().await;
                let stored = lookup_memory(&guard, user_id, id)?;
                Ok(artifact_from(stored.id, stored.user_id, stored.created_at, stored.ledger.current()))
            }
        }
    }

    /// Owner's artifacts, most recently updated first, with the total
    /// count for pagination.
    pub async fn list(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Artifact>, i64), ApiError> {
        let limit = limit.min(LIST_MAX_LIMIT);
        match self {
            Self::Postgres(pool) => list_pg(pool, user_id, limit, offset).await,
            Self::Memory(store) => {
                let guard = store.read().await;
                let mut owned: Vec<&MemoryArtifact> =
                    guard.values().filter(|stored| stored.user_id == user_id).collect();
                owned.sort_by(|a, b| b.ledger.current().updated_at.cmp(&a.ledger.current().updated_at));
                let total = owned.len() as i64;
                let items = owned
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .map(|stored| {
                        artifact_from(stored.id, stored.user_id, stored.created_at, stored.ledger.current())
                    })
                    .collect();
                Ok((items, total))
            }
        }
    }

    /// Case-insensitive substring search over title and content.
    /// Results carry a snippet, never the full content.
    pub async fn search(&self, user_id: Uuid, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        match self {
            Self::Postgres(pool) => search_pg(pool, user_id, query).await,
            Self::Memory(store) => {
                let needle = query.to_lowercase();
                let guard = store.read().await;
                let mut hits: Vec<(&MemoryArtifact, SearchHit)> = guard
                    .values()
                    .filter(|stored| stored.user_id == user_id)
                    .filter(|stored| {
                        let current = stored.ledger.current();
                        current.title.to_lowercase().contains(&needle)
                            || current.content.to_lowercase().contains(&needle)
                    })
                    .map(|stored| {
                        let current = stored.ledger.current();
                        let hit = SearchHit {
                            id: stored.id,
                            title: current.title.clone(),
                            snippet: markdown::snippet(&current.content),
                            metadata: current.metadata.clone(),
                            created_at: stored.created_at,
                            updated_at: current.updated_at,
                        };
                        (stored, hit)
                    })
                    .collect();
                hits.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
                Ok(hits.into_iter().map(|(_, hit)| hit).collect())
            }
        }
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        title: Option<String>,
        content: Option<String>,
        metadata: Option<Metadata>,
    ) -> Result<Artifact, ApiError> {
        let (artifact, _) =
            self.mutate(user_id, id, Mutation::Update { title, content, metadata }).await?;
        Ok(artifact)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        match self {
            Self::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM artifacts WHERE id = $1 AND user_id = $2")
                    .bind(id)
                    .bind(user_id)
                    .execute(pool)
                    .await
                    .map_err(|error| ApiError::internal(error.into()))?;
                if result.rows_affected() == 0 {
                    return Err(DomainError::NotFound.into());
                }
                Ok(())
            }
            Self::Memory(store) => {
                let mut guard = store.write().await;
                match guard.get(&id) {
                    Some(stored) if stored.user_id == user_id => {
                        guard.remove(&id);
                        Ok(())
                    }
                    _ => Err(DomainError::NotFound.into()),
                }
            }
        }
    }

    /// Exact-substring replace. `count` caps how many occurrences are
    /// replaced; without it (and without `replace_all`) the match must
    /// be unique, and the ambiguity error carries disambiguation context.
    pub async fn string_replace(
        &self,
        user_id: Uuid,
        id: Uuid,
        old: String,
        new: String,
        replace_all: bool,
        count: Option<usize>,
    ) -> Result<(Artifact, usize), ApiError> {
        let (artifact, receipt) =
            self.mutate(user_id, id, Mutation::Replace { old, new, replace_all, count }).await?;
        Ok((artifact, receipt.replacements.unwrap_or(0)))
    }

    /// Insert `text` as a new line at 1-based `line` (lines + 1 appends).
    pub async fn string_insert(
        &self,
        user_id: Uuid,
        id: Uuid,
        line: usize,
        text: String,
    ) -> Result<Artifact, ApiError> {
        let (artifact, _) = self.mutate(user_id, id, Mutation::Insert { line, text }).await?;
        Ok(artifact)
    }

    pub async fn list_versions(
        &self,
        user_id: Uuid,
        id: Uuid,
        limit: Option<usize>,
    ) -> Result<VersionPage, ApiError> {
        let ledger = self.load_ledger(user_id, id).await?;
        Ok(VersionPage {
            versions: ledger.list_versions(limit),
            current_version: ledger.version(),
            total_edit_count: ledger.total_edit_count(),
        })
    }

    pub async fn get_version(
        &self,
        user_id: Uuid,
        id: Uuid,
        version: i64,
    ) -> Result<VersionSnapshot, ApiError> {
        let ledger = self.load_ledger(user_id, id).await?;
        ledger.get_version(version).ok_or_else(|| DomainError::NotFound.into())
    }

    pub async fn restore_version(
        &self,
        user_id: Uuid,
        id: Uuid,
        version: i64,
    ) -> Result<Artifact, ApiError> {
        let (artifact, _) = self.mutate(user_id, id, Mutation::Restore { version }).await?;
        Ok(artifact)
    }

    pub async fn diff(
        &self,
        user_id: Uuid,
        id: Uuid,
        from: i64,
        to: i64,
    ) -> Result<VersionDiff, ApiError> {
        let ledger = self.load_ledger(user_id, id).await?;
        ledger.diff(from, to).ok_or_else(|| DomainError::NotFound.into())
    }

    async fn load_ledger(&self, user_id: Uuid, id: Uuid) -> Result<VersionLedger, ApiError> {
        match self {
            Self::Postgres(pool) => Ok(fetch_row(pool, user_id, id).await?.into_ledger()),
            Self::Memory(store) => {
                let guard = store.read().await;
                Ok(lookup_memory(&guard, user_id, id)?.ledger.clone())
            }
        }
    }

    async fn mutate(
        &self,
        user_id: Uuid,
        id: Uuid,
        mutation: Mutation,
    ) -> Result<(Artifact, MutationReceipt), ApiError> {
        match self {
            Self::Postgres(pool) => mutate_pg(pool, user_id, id, mutation).await,
            Self::Memory(store) => {
                let mut guard = store.write().await;
                let stored = match guard.get_mut(&id) {
                    Some(stored) if stored.user_id == user_id => stored,
                    _ => return Err(DomainError::NotFound.into()),
                };
                let receipt = apply_mutation(&mut stored.ledger, mutation, Utc::now())
                    .map_err(ApiError::from)?;
                let artifact = artifact_from(
                    stored.id,
                    stored.user_id,
                    stored.created_at,
                    stored.ledger.current(),
                );
                Ok((artifact, receipt))
            }
        }
    }
}

/// Replays a mutation through the ledger. Pure with respect to storage;
/// both backends share this path so edit semantics never diverge.
fn apply_mutation(
    ledger: &mut VersionLedger,
    mutation: Mutation,
    now: DateTime<Utc>,
) -> Result<MutationReceipt, DomainError> {
    let current = ledger.current();

    let (title, content, metadata, replacements) = match mutation {
        Mutation::Update { title, content, metadata } => {
            // Auto-title tracks content changes: a content update without
            // an explicit title re-derives the title from the new content.
            let new_content = content.clone().unwrap_or_else(|| current.content.clone());
            let new_title = match (title, &content) {
                (Some(title), _) => title,
                (None, Some(new_content)) => markdown::extract_title(new_content),
                (None, None) => current.title.clone(),
            };
            let new_metadata = metadata.unwrap_or_else(|| current.metadata.clone());
            (new_title, new_content, new_metadata, None)
        }
        Mutation::Replace { old, new, replace_all, count } => {
            let limit = match (count, replace_all) {
                (Some(0), _) => {
                    return Err(DomainError::Validation("count must be at least 1".into()));
                }
                (Some(count), _) => Some(count),
                (None, true) => None,
                (None, false) => {
                    edit::validate_unique_match(&current.content, &old, false)?;
                    Some(1)
                }
            };
            let (new_content, replaced) = edit::find_and_replace(&current.content, &old, &new, limit)?;
            (
                markdown::extract_title(&new_content),
                new_content,
                current.metadata.clone(),
                Some(replaced),
            )
        }
        Mutation::Insert { line, text } => {
            let new_content = edit::insert_at_line(&current.content, line, &text)?;
            (markdown::extract_title(&new_content), new_content, current.metadata.clone(), None)
        }
        Mutation::Restore { version } => {
            let target = ledger.get_version(version).ok_or(DomainError::NotFound)?;
            (target.title, target.content, target.metadata, None)
        }
    };

    validate_title(&title)?;
    validate_content(&content)?;

    let outcome = ledger.record_mutation(title, content, metadata, now);
    Ok(MutationReceipt { outcome, replacements })
}

fn artifact_from(
    id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    current: &CurrentState,
) -> Artifact {
    Artifact {
        id,
        user_id,
        title: current.title.clone(),
        content: current.content.clone(),
        metadata: current.metadata.clone(),
        version: current.version,
        created_at,
        updated_at: current.updated_at,
    }
}

fn lookup_memory<'a>(
    guard: &'a HashMap<Uuid, MemoryArtifact>,
    user_id: Uuid,
    id: Uuid,
) -> Result<&'a MemoryArtifact, ApiError> {
    match guard.get(&id) {
        Some(stored) if stored.user_id == user_id => Ok(stored),
        _ => Err(DomainError::NotFound.into()),
    }
}

// ── Postgres implementation ────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    metadata: sqlx::types::Json<Metadata>,
    version: i64,
    version_count: i64,
    version_history: sqlx::types::Json<Vec<VersionSnapshot>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ROW_COLUMNS: &str = "id, user_id, title, content, metadata, version, version_count, \
                           version_history, created_at, updated_at";

impl ArtifactRow {
    fn into_artifact(self) -> Artifact {
        Artifact {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            content: self.content,
            metadata: self.metadata.0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn into_ledger(self) -> VersionLedger {
        VersionLedger::from_parts(
            CurrentState {
                title: self.title,
                content: self.content,
                metadata: self.metadata.0,
                version: self.version,
                updated_at: self.updated_at,
            },
            self.version_history.0,
            self.version_count,
        )
    }
}

async fn fetch_row(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<ArtifactRow, ApiError> {
    sqlx::query_as::<_, ArtifactRow>(&format!(
        "SELECT {ROW_COLUMNS} FROM artifacts WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?
    .ok_or_else(|| DomainError::NotFound.into())
}

async fn create_pg(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    ledger: &VersionLedger,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    let current = ledger.current();
    sqlx::query(
        r#"
        INSERT INTO artifacts
            (id, user_id, title, content, metadata, version, version_count, version_history,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&current.title)
    .bind(&current.content)
    .bind(sqlx::types::Json(&current.metadata))
    .bind(current.version)
    .bind(ledger.total_edit_count())
    .bind(sqlx::types::Json(ledger.history().collect::<Vec<_>>()))
    .bind(now)
    .execute(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    Ok(())
}

async fn list_pg(
    pool: &PgPool,
    user_id: Uuid,
    limit: usize,
    offset: usize,
) -> Result<(Vec<Artifact>, i64), ApiError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|error| ApiError::internal(error.into()))?;

    let rows = sqlx::query_as::<_, ArtifactRow>(&format!(
        "SELECT {ROW_COLUMNS} FROM artifacts WHERE user_id = $1 \
         ORDER BY updated_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    Ok((rows.into_iter().map(ArtifactRow::into_artifact).collect(), total))
}

async fn search_pg(pool: &PgPool, user_id: Uuid, query: &str) -> Result<Vec<SearchHit>, ApiError> {
    let pattern = format!("%{}%", escape_like(query));
    let rows = sqlx::query_as::<_, ArtifactRow>(&format!(
        "SELECT {ROW_COLUMNS} FROM artifacts \
         WHERE user_id = $1 AND (title ILIKE $2 OR content ILIKE $2) \
         ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .bind(pattern)
    .fetch_all(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    Ok(rows
        .into_iter()
        .map(|row| SearchHit {
            id: row.id,
            title: row.title,
            snippet: markdown::snippet(&row.content),
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect())
}

async fn mutate_pg(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    mutation: Mutation,
) -> Result<(Artifact, MutationReceipt), ApiError> {
    let row = fetch_row(pool, user_id, id).await?;
    let created_at = row.created_at;
    let mut ledger = row.into_ledger();
    let expected_version = ledger.version();

    let receipt = apply_mutation(&mut ledger, mutation, Utc::now()).map_err(ApiError::from)?;

    let write_needed = !matches!(receipt.outcome, MutationOutcome::Unchanged { metadata_changed: false });
    if write_needed {
        let current = ledger.current();
        // Version-checked write: losing a concurrent race is reported
        // rather than silently dropping the other writer's history entry.
        let result = sqlx::query(
            r#"
            UPDATE artifacts
            SET title = $4, content = $5, metadata = $6, version = $7, version_count = $8,
                version_history = $9, updated_at = $10
            WHERE id = $1 AND user_id = $2 AND version = $3
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(expected_version)
        .bind(&current.title)
        .bind(&current.content)
        .bind(sqlx::types::Json(&current.metadata))
        .bind(current.version)
        .bind(ledger.total_edit_count())
        .bind(sqlx::types::Json(ledger.history().collect::<Vec<_>>()))
        .bind(current.updated_at)
        .execute(pool)
        .await
        .map_err(|error| ApiError::internal(error.into()))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EditConflict.into());
        }
    }

    Ok((artifact_from(id, user_id, created_at, ledger.current()), receipt))
}

/// Escape LIKE wildcards so user queries match literally.
fn escape_like(query: &str) -> String {
    query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
