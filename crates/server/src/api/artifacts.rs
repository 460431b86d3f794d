// Artifact REST handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vellum_common::types::{
    Artifact, Metadata, Scope, SearchHit, VersionDiff, VersionSnapshot, VersionSummary,
};

use crate::{
    auth::middleware::{require_scope, AuthenticatedCaller},
    error::ApiError,
    store::{ArtifactStore, LIST_DEFAULT_LIMIT},
    validation::ValidatedJson,
};

#[derive(Clone)]
struct ArtifactsState {
    store: ArtifactStore,
}

pub fn router(store: ArtifactStore) -> Router {
    let state = ArtifactsState { store };

    Router::new()
        .route("/v1/artifacts", post(create_artifact).get(list_artifacts))
        .route("/v1/artifacts/search", get(search_artifacts))
        .route(
            "/v1/artifacts/{id}",
            get(get_artifact).patch(update_artifact).delete(delete_artifact),
        )
        .route("/v1/artifacts/{id}/replace", post(string_replace))
        .route("/v1/artifacts/{id}/insert", post(string_insert))
        .route("/v1/artifacts/{id}/versions", get(list_versions))
        .route("/v1/artifacts/{id}/versions/{version}", get(get_version))
        .route("/v1/artifacts/{id}/versions/{version}/restore", post(restore_version))
        .route("/v1/artifacts/{id}/diff", get(diff_versions))
        .with_state(state)
}

// ── Request / response shapes ──────────────────────────────────────

#[derive(Deserialize)]
struct CreateArtifactRequest {
    title: Option<String>,
    content: String,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct UpdateArtifactRequest {
    title: Option<String>,
    content: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct StringReplaceRequest {
    old_str: String,
    new_str: String,
    #[serde(default)]
    replace_all: bool,
    /// Replace up to this many occurrences, skipping the unique-match check.
    count: Option<usize>,
}

#[derive(Deserialize)]
struct StringInsertRequest {
    insert_line: usize,
    insert_text: String,
}

#[derive(Deserialize)]
struct ListArtifactsQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(Deserialize)]
struct ListVersionsQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct DiffQuery {
    from: i64,
    to: i64,
}

#[derive(Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub artifact: Artifact,
}

#[derive(Serialize, Deserialize)]
pub struct ArtifactsPageEnvelope {
    pub items: Vec<Artifact>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Serialize, Deserialize)]
pub struct SearchResultsEnvelope {
    pub items: Vec<SearchHit>,
}

#[derive(Serialize, Deserialize)]
pub struct ReplaceEnvelope {
    pub artifact: Artifact,
    pub replacements: usize,
}

#[derive(Serialize, Deserialize)]
pub struct VersionsEnvelope {
    pub versions: Vec<VersionSummary>,
    pub current_version: i64,
    pub total_edit_count: i64,
}

#[derive(Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub version: VersionSnapshot,
}

#[derive(Serialize, Deserialize)]
pub struct DiffEnvelope {
    pub diff: VersionDiff,
}

// ── Handlers ───────────────────────────────────────────────────────

async fn create_artifact(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    ValidatedJson(payload): ValidatedJson<CreateArtifactRequest>,
) -> Result<(StatusCode, Json<ArtifactEnvelope>), ApiError> {
    require_scope(&caller, Scope::Write)?;

    let artifact = state
        .store
        .create(caller.user_id, payload.title, payload.content, payload.metadata)
        .await?;

    Ok((StatusCode::CREATED, Json(ArtifactEnvelope { artifact })))
}

async fn list_artifacts(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Query(query): Query<ListArtifactsQuery>,
) -> Result<Json<ArtifactsPageEnvelope>, ApiError> {
    require_scope(&caller, Scope::Read)?;

    let limit = query.limit.unwrap_or(LIST_DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let (items, total) = state.store.list(caller.user_id, limit, offset).await?;

    Ok(Json(ArtifactsPageEnvelope { items, total, limit, offset }))
}

async fn search_artifacts(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResultsEnvelope>, ApiError> {
    require_scope(&caller, Scope::Read)?;

    let items = state.store.search(caller.user_id, &query.q).await?;

    Ok(Json(SearchResultsEnvelope { items }))
}

async fn get_artifact(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArtifactEnvelope>, ApiError> {
    require_scope(&caller, Scope::Read)?;

    let artifact = state.store.get(caller.user_id, id).await?;

    Ok(Json(ArtifactEnvelope { artifact }))
}

async fn update_artifact(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateArtifactRequest>,
) -> Result<Json<ArtifactEnvelope>, ApiError> {
    require_scope(&caller, Scope::Write)?;

    let artifact = state
        .store
        .update(caller.user_id, id, payload.title, payload.content, payload.metadata)
        .await?;

    Ok(Json(ArtifactEnvelope { artifact }))
}

async fn delete_artifact(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_scope(&caller, Scope::Delete)?;

    state.store.delete(caller.user_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn string_replace(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<StringReplaceRequest>,
) -> Result<Json<ReplaceEnvelope>, ApiError> {
    require_scope(&caller, Scope::Write)?;

    let (artifact, replacements) = state
        .store
        .string_replace(
            caller.user_id,
            id,
            payload.old_str,
            payload.new_str,
            payload.replace_all,
            payload.count,
        )
        .await?;

    Ok(Json(ReplaceEnvelope { artifact, replacements }))
}

async fn string_insert(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<StringInsertRequest>,
) -> Result<Json<ArtifactEnvelope>, ApiError> {
    require_scope(&caller, Scope::Write)?;

    let artifact = state
        .store
        .string_insert(caller.user_id, id, payload.insert_line, payload.insert_text)
        .await?;

    Ok(Json(ArtifactEnvelope { artifact }))
}

async fn list_versions(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListVersionsQuery>,
) -> Result<Json<VersionsEnvelope>, ApiError> {
    require_scope(&caller, Scope::Read)?;

    let page = state.store.list_versions(caller.user_id, id, query.limit).await?;

    Ok(Json(VersionsEnvelope {
        versions: page.versions,
        current_version: page.current_version,
        total_edit_count: page.total_edit_count,
    }))
}

async fn get_version(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path((id, version)): Path<(Uuid, i64)>,
) -> Result<Json<SnapshotEnvelope>, ApiError> {
    require_scope(&caller, Scope::Read)?;

    let snapshot = state.store.get_version(caller.user_id, id, version).await?;

    Ok(Json(SnapshotEnvelope { version: snapshot }))
}

async fn restore_version(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path((id, version)): Path<(Uuid, i64)>,
) -> Result<Json<ArtifactEnvelope>, ApiError> {
    require_scope(&caller, Scope::Write)?;

    let artifact = state.store.restore_version(caller.user_id, id, version).await?;

    Ok(Json(ArtifactEnvelope { artifact }))
}

async fn diff_versions(
    State(state): State<ArtifactsState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<DiffEnvelope>, ApiError> {
    require_scope(&caller, Scope::Read)?;

    let diff = state.store.diff(caller.user_id, id, query.from, query.to).await?;

    Ok(Json(DiffEnvelope { diff }))
}
