// API key management handlers.
//
// Key management always requires a JWT credential: an API key cannot
// mint, edit, or revoke keys, so a leaked key cannot widen its own
// access.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vellum_common::types::Scope;

use crate::{
    auth::api_keys::{ApiKeyRecord, ApiKeyStore},
    auth::middleware::AuthenticatedCaller,
    error::{ApiError, ErrorCode},
    validation::ValidatedJson,
};

#[derive(Clone)]
struct ApiKeysState {
    keys: ApiKeyStore,
}

pub fn router(keys: ApiKeyStore) -> Router {
    let state = ApiKeysState { keys };

    Router::new()
        .route("/v1/api-keys", get(list_keys).post(create_key))
        .route("/v1/api-keys/{id}", get(get_key).patch(update_key).delete(revoke_key))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateApiKeyRequest {
    name: String,
    scopes: Vec<Scope>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct UpdateApiKeyRequest {
    name: Option<String>,
    scopes: Option<Vec<Scope>>,
}

#[derive(Serialize, Deserialize)]
pub struct ApiKeyBody {
    pub id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub last_4: String,
    pub scopes: Vec<Scope>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKeyRecord> for ApiKeyBody {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            key_prefix: record.key_prefix,
            last_4: record.last_4,
            scopes: record.scopes,
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApiKeyEnvelope {
    pub api_key: ApiKeyBody,
}

/// Returned only from create: `key` is the plaintext secret, shown once.
#[derive(Serialize, Deserialize)]
pub struct CreatedApiKeyEnvelope {
    pub api_key: ApiKeyBody,
    pub key: String,
}

#[derive(Serialize, Deserialize)]
pub struct ApiKeysEnvelope {
    pub items: Vec<ApiKeyBody>,
}

fn require_jwt_caller(caller: &AuthenticatedCaller) -> Result<(), ApiError> {
    if caller.key_id.is_some() {
        return Err(ApiError::new(
            ErrorCode::AuthForbidden,
            "api key management requires a user session, not an api key",
        ));
    }
    Ok(())
}

async fn create_key(
    State(state): State<ApiKeysState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    ValidatedJson(payload): ValidatedJson<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKeyEnvelope>), ApiError> {
    require_jwt_caller(&caller)?;

    let (record, key) = state
        .keys
        .mint(caller.user_id, payload.name, payload.scopes, payload.expires_at)
        .await?;

    Ok((StatusCode::CREATED, Json(CreatedApiKeyEnvelope { api_key: record.into(), key })))
}

async fn list_keys(
    State(state): State<ApiKeysState>,
    Extension(caller): Extension<AuthenticatedCaller>,
) -> Result<Json<ApiKeysEnvelope>, ApiError> {
    require_jwt_caller(&caller)?;

    let items = state
        .keys
        .list(caller.user_id)
        .await?
        .into_iter()
        .map(ApiKeyBody::from)
        .collect();

    Ok(Json(ApiKeysEnvelope { items }))
}

async fn get_key(
    State(state): State<ApiKeysState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiKeyEnvelope>, ApiError> {
    require_jwt_caller(&caller)?;

    let record = state.keys.get(caller.user_id, id).await?;

    Ok(Json(ApiKeyEnvelope { api_key: record.into() }))
}

async fn update_key(
    State(state): State<ApiKeysState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateApiKeyRequest>,
) -> Result<Json<ApiKeyEnvelope>, ApiError> {
    require_jwt_caller(&caller)?;

    let record = state
        .keys
        .update(caller.user_id, id, payload.name, payload.scopes)
        .await?;

    Ok(Json(ApiKeyEnvelope { api_key: record.into() }))
}

async fn revoke_key(
    State(state): State<ApiKeysState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_jwt_caller(&caller)?;

    state.keys.revoke(caller.user_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
