// API key issuance and validation.
//
// Keys are `vk_` + 32 url-safe base64 chars. The plaintext is returned
// exactly once at mint time; storage keeps an argon2 hash for verification
// plus a sha256 hex digest of the first 16 chars for indexed lookup.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;
use vellum_common::types::Scope;

use crate::error::{ApiError, ErrorCode};

/// Maximum number of active (non-revoked) keys per user.
pub const MAX_ACTIVE_KEYS_PER_USER: usize = 10;

/// Prefix on every presented key. Lets the auth middleware route
/// `vk_`-prefixed bearer tokens to this store instead of the JWT path.
pub const API_KEY_PREFIX: &str = "vk_";

/// Maximum length of a key's display name.
pub const KEY_NAME_MAX_CHARS: usize = 100;

const KEY_SECRET_BYTES: usize = 24;
const LOOKUP_PREFIX_CHARS: usize = 16;
const LOOKUP_HASH_CHARS: usize = 16;
const DISPLAY_PREFIX_CHARS: usize = 12;
const DISPLAY_SUFFIX_CHARS: usize = 4;

#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// First few chars of the plaintext key, for display in key listings.
    pub key_prefix: String,
    /// Last four chars of the plaintext key, shown alongside the prefix.
    pub last_4: String,
    pub scopes: Vec<Scope>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// The identity a validated API key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyGrant {
    pub user_id: Uuid,
    pub key_id: Uuid,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone)]
pub struct MemoryApiKey {
    record: ApiKeyRecord,
    lookup_hash: String,
    secret_hash: String,
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub enum ApiKeyStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>),
}

impl ApiKeyStore {
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Mint a new key. Returns the record plus the plaintext key,
    /// which is never retrievable again.
    pub async fn mint(
        &self,
        user_id: Uuid,
        name: String,
        scopes: Vec<Scope>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(ApiKeyRecord, String), ApiError> {
        validate_mint_request(&name, &scopes, expires_at)?;

        let plaintext = generate_api_key();
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            user_id,
            name,
            key_prefix: plaintext.chars().take(DISPLAY_PREFIX_CHARS).collect(),
            last_4: plaintext[plaintext.len() - DISPLAY_SUFFIX_CHARS..].to_owned(),
            scopes,
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };
        let lookup = lookup_hash(&plaintext);
        let secret = hash_api_key(&plaintext)?;

        match self {
            Self::Postgres(pool) => mint_pg(pool, &record, &lookup, &secret).await?,
            Self::Memory(store) => mint_memory(store, &record, &lookup, &secret).await?,
        }

        Ok((record, plaintext))
    }

    /// List the caller's active keys, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, ApiError> {
        match self {
            Self::Postgres(pool) => list_pg(pool, user_id).await,
            Self::Memory(store) => list_memory(store, user_id).await,
        }
    }

    /// Fetch a single active key owned by the caller.
    pub async fn get(&self, user_id: Uuid, key_id: Uuid) -> Result<ApiKeyRecord, ApiError> {
        match self {
            Self::Postgres(pool) => get_pg(pool, user_id, key_id).await,
            Self::Memory(store) => get_memory(store, user_id, key_id).await,
        }
    }

    /// Rename a key and/or replace its scopes. The plaintext secret
    /// never changes; rotate by revoking and minting.
    pub async fn update(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        name: Option<String>,
        scopes: Option<Vec<Scope>>,
    ) -> Result<ApiKeyRecord, ApiError> {
        if let Some(name) = &name {
            if name.trim().is_empty() {
                return Err(ApiError::new(
                    ErrorCode::ValidationFailed,
                    "key name must not be empty",
                ));
            }
            if name.chars().count() > KEY_NAME_MAX_CHARS {
                return Err(ApiError::new(
                    ErrorCode::ValidationFailed,
                    format!("key name exceeds {KEY_NAME_MAX_CHARS} characters"),
                ));
            }
        }
        if scopes.as_ref().is_some_and(Vec::is_empty) {
            return Err(ApiError::new(
                ErrorCode::ValidationFailed,
                "key must carry at least one scope",
            ));
        }

        match self {
            Self::Postgres(pool) => update_pg(pool, user_id, key_id, name, scopes).await,
            Self::Memory(store) => update_memory(store, user_id, key_id, name, scopes).await,
        }
    }

    /// Soft-delete a key. The row survives so usage history is kept.
    pub async fn revoke(&self, user_id: Uuid, key_id: Uuid) -> Result<(), ApiError> {
        match self {
            Self::Postgres(pool) => revoke_pg(pool, user_id, key_id).await,
            Self::Memory(store) => revoke_memory(store, user_id, key_id).await,
        }
    }

    /// Validate a presented key and bump its `last_used_at`.
    pub async fn validate(&self, presented: &str) -> Result<ApiKeyGrant, ApiError> {
        if !presented.starts_with(API_KEY_PREFIX) {
            return Err(invalid_key());
        }
        let lookup = lookup_hash(presented);

        match self {
            Self::Postgres(pool) => validate_pg(pool, presented, &lookup).await,
            Self::Memory(store) => validate_memory(store, presented, &lookup).await,
        }
    }
}

fn validate_mint_request(
    name: &str,
    scopes: &[Scope],
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::new(ErrorCode::ValidationFailed, "key name must not be empty"));
    }
    if name.chars().count() > KEY_NAME_MAX_CHARS {
        return Err(ApiError::new(
            ErrorCode::ValidationFailed,
            format!("key name exceeds {KEY_NAME_MAX_CHARS} characters"),
        ));
    }
    if scopes.is_empty() {
        return Err(ApiError::new(
            ErrorCode::ValidationFailed,
            "key must carry at least one scope",
        ));
    }
    if expires_at.is_some_and(|value| value <= Utc::now()) {
        return Err(ApiError::new(ErrorCode::ValidationFailed, "expires_at must be in the future"));
    }
    Ok(())
}

fn generate_api_key() -> String {
    let mut bytes = [0_u8; KEY_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Truncated sha256 hex of the key's first 16 chars. Indexed in
/// storage so validation does not argon2-verify against every row.
fn lookup_hash(key: &str) -> String {
    let head: String = key.chars().take(LOOKUP_PREFIX_CHARS).collect();
    let digest = Sha256::digest(head.as_bytes());
    let mut out = String::with_capacity(LOOKUP_HASH_CHARS);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(LOOKUP_HASH_CHARS);
    out
}

fn hash_api_key(key: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(key.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| ApiError::internal(anyhow::anyhow!(error.to_string())))
}

fn verify_api_key(key: &str, secret_hash: &str) -> bool {
    PasswordHash::new(secret_hash)
        .map(|parsed| Argon2::default().verify_password(key.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn invalid_key() -> ApiError {
    ApiError::new(ErrorCode::AuthInvalidToken, "invalid api key")
}

fn scopes_from_strings(values: &[String]) -> Result<Vec<Scope>, ApiError> {
    values
        .iter()
        .map(|value| {
            Scope::from_str_value(value).ok_or_else(|| {
                ApiError::internal(anyhow::anyhow!("stored scope '{value}' is not recognized"))
            })
        })
        .collect()
}

// ── Postgres implementation ────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    key_prefix: String,
    last_4: String,
    scopes: Vec<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_record(self) -> Result<ApiKeyRecord, ApiError> {
        let scopes = scopes_from_strings(&self.scopes)?;
        Ok(ApiKeyRecord {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            key_prefix: self.key_prefix,
            last_4: self.last_4,
            scopes,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
        })
    }
}

async fn mint_pg(
    pool: &PgPool,
    record: &ApiKeyRecord,
    lookup: &str,
    secret: &str,
) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(|error| ApiError::internal(error.into()))?;

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM api_keys WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(record.user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    if active as usize >= MAX_ACTIVE_KEYS_PER_USER {
        return Err(key_limit_error());
    }

    let scope_strings: Vec<String> =
        record.scopes.iter().map(|scope| scope.as_str().to_owned()).collect();

    sqlx::query(
        r#"
        INSERT INTO api_keys
            (id, user_id, name, key_prefix, last_4, lookup_hash, secret_hash, scopes,
             created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.name)
    .bind(&record.key_prefix)
    .bind(&record.last_4)
    .bind(lookup)
    .bind(secret)
    .bind(&scope_strings)
    .bind(record.created_at)
    .bind(record.expires_at)
    .execute(&mut *tx)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    tx.commit().await.map_err(|error| ApiError::internal(error.into()))?;
    Ok(())
}

async fn list_pg(pool: &PgPool, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, ApiError> {
    let rows = sqlx::query_as::<_, ApiKeyRow>(
        r#"
        SELECT id, user_id, name, key_prefix, last_4, scopes, created_at, expires_at, last_used_at
        FROM api_keys
        WHERE user_id = $1 AND revoked_at IS NULL
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    rows.into_iter().map(ApiKeyRow::into_record).collect()
}

async fn get_pg(pool: &PgPool, user_id: Uuid, key_id: Uuid) -> Result<ApiKeyRecord, ApiError> {
    let row = sqlx::query_as::<_, ApiKeyRow>(
        r#"
        SELECT id, user_id, name, key_prefix, last_4, scopes, created_at, expires_at, last_used_at
        FROM api_keys
        WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(key_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?
    .ok_or_else(|| ApiError::from_code(ErrorCode::NotFound))?;

    row.into_record()
}

async fn update_pg(
    pool: &PgPool,
    user_id: Uuid,
    key_id: Uuid,
    name: Option<String>,
    scopes: Option<Vec<Scope>>,
) -> Result<ApiKeyRecord, ApiError> {
    let scope_strings: Option<Vec<String>> = scopes
        .map(|scopes| scopes.iter().map(|scope| scope.as_str().to_owned()).collect());

    let row = sqlx::query_as::<_, ApiKeyRow>(
        r#"
        UPDATE api_keys
        SET name = COALESCE($3, name), scopes = COALESCE($4, scopes)
        WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
        RETURNING id, user_id, name, key_prefix, last_4, scopes, created_at, expires_at, last_used_at
        "#,
    )
    .bind(key_id)
    .bind(user_id)
    .bind(name)
    .bind(scope_strings)
    .fetch_optional(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?
    .ok_or_else(|| ApiError::from_code(ErrorCode::NotFound))?;

    row.into_record()
}

async fn revoke_pg(pool: &PgPool, user_id: Uuid, key_id: Uuid) -> Result<(), ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE api_keys
        SET revoked_at = now()
        WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(key_id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::from_code(ErrorCode::NotFound));
    }
    Ok(())
}

async fn validate_pg(
    pool: &PgPool,
    presented: &str,
    lookup: &str,
) -> Result<ApiKeyGrant, ApiError> {
    #[derive(sqlx::FromRow)]
    struct CandidateRow {
        id: Uuid,
        user_id: Uuid,
        secret_hash: String,
        scopes: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    }

    let candidates = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT id, user_id, secret_hash, scopes, expires_at
        FROM api_keys
        WHERE lookup_hash = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(lookup)
    .fetch_all(pool)
    .await
    .map_err(|error| ApiError::internal(error.into()))?;

    for candidate in candidates {
        if !verify_api_key(presented, &candidate.secret_hash) {
            continue;
        }
        if candidate.expires_at.is_some_and(|value| value <= Utc::now()) {
            return Err(invalid_key());
        }
        let scopes = scopes_from_strings(&candidate.scopes)?;

        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(candidate.id)
            .execute(pool)
            .await
            .map_err(|error| ApiError::internal(error.into()))?;

        return Ok(ApiKeyGrant { user_id: candidate.user_id, key_id: candidate.id, scopes });
    }

    Err(invalid_key())
}

// ── In-memory implementation ───────────────────────────────────────

async fn mint_memory(
    store: &Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>,
    record: &ApiKeyRecord,
    lookup: &str,
    secret: &str,
) -> Result<(), ApiError> {
    let mut guard = store.write().await;

    let active = guard
        .values()
        .filter(|key| key.record.user_id == record.user_id && key.revoked_at.is_none())
        .count();
    if active >= MAX_ACTIVE_KEYS_PER_USER {
        return Err(key_limit_error());
    }

    guard.insert(
        record.id,
        MemoryApiKey {
            record: record.clone(),
            lookup_hash: lookup.to_owned(),
            secret_hash: secret.to_owned(),
            revoked_at: None,
        },
    );
    Ok(())
}

async fn list_memory(
    store: &Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>,
    user_id: Uuid,
) -> Result<Vec<ApiKeyRecord>, ApiError> {
    let guard = store.read().await;
    let mut records: Vec<ApiKeyRecord> = guard
        .values()
        .filter(|key| key.record.user_id == user_id && key.revoked_at.is_none())
        .map(|key| key.record.clone())
        .collect();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records)
}

async fn get_memory(
    store: &Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>,
    user_id: Uuid,
    key_id: Uuid,
) -> Result<ApiKeyRecord, ApiError> {
    let guard = store.read().await;
    match guard.get(&key_id) {
        Some(key) if key.record.user_id == user_id && key.revoked_at.is_none() => {
            Ok(key.record.clone())
        }
        _ => Err(ApiError::from_code(ErrorCode::NotFound)),
    }
}

async fn update_memory(
    store: &Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>,
    user_id: Uuid,
    key_id: Uuid,
    name: Option<String>,
    scopes: Option<Vec<Scope>>,
) -> Result<ApiKeyRecord, ApiError> {
    let mut guard = store.write().await;
    match guard.get_mut(&key_id) {
        Some(key) if key.record.user_id == user_id && key.revoked_at.is_none() => {
            if let Some(name) = name {
                key.record.name = name;
            }
            if let Some(scopes) = scopes {
                key.record.scopes = scopes;
            }
            Ok(key.record.clone())
        }
        _ => Err(ApiError::from_code(ErrorCode::NotFound)),
    }
}

async fn revoke_memory(
    store: &Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>,
    user_id: Uuid,
    key_id: Uuid,
) -> Result<(), ApiError> {
    let mut guard = store.write().await;
    match guard.get_mut(&key_id) {
        Some(key) if key.record.user_id == user_id && key.revoked_at.is_none() => {
            key.revoked_at = Some(Utc::now());
            Ok(())
        }
        _ => Err(ApiError::from_code(ErrorCode::NotFound)),
    }
}

async fn validate_memory(
    store: &Arc<RwLock<HashMap<Uuid, MemoryApiKey>>>,
    presented: &str,
    lookup: &str,
) -> Result<ApiKeyGrant, ApiError> {
    let mut guard = store.write().await;

    let matched = guard.values_mut().find(|key| {
        key.revoked_at.is_none()
            && key.lookup_hash == lookup
            && verify_api_key(presented, &key.secret_hash)
    });

    match matched {
        Some(key) => {
            if key.record.expires_at.is_some_and(|value| value <= Utc::now()) {
                return Err(invalid_key());
            }
            key.record.last_used_at = Some(Utc::now());
            Ok(ApiKeyGrant {
                user_id: key.record.user_id,
                key_id: key.record.id,
                scopes: key.record.scopes.clone(),
            })
        }
        None => Err(invalid_key()),
    }
}

fn key_limit_error() -> ApiError {
    ApiError::new(
        ErrorCode::ValidationFailed,
        format!("api key limit reached ({MAX_ACTIVE_KEYS_PER_USER} active keys)"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> ApiKeyStore {
        ApiKeyStore::in_memory()
    }

    #[tokio::test]
    async fn mint_and_validate_roundtrip() {
        let store = store();
        let user_id = Uuid::new_v4();

        let (record, plaintext) = store
            .mint(user_id, "ci key".into(), vec![Scope::Read, Scope::Write], None)
            .await
            .expect("mint should succeed");

        assert!(plaintext.starts_with(API_KEY_PREFIX));
        assert_eq!(plaintext.len(), API_KEY_PREFIX.len() + 32);
        assert!(plaintext.starts_with(&record.key_prefix));
        assert!(plaintext.ends_with(&record.last_4));
        assert_eq!(record.last_4.len(), 4);

        let grant = store.validate(&plaintext).await.expect("key should validate");
        assert_eq!(grant.user_id, user_id);
        assert_eq!(grant.key_id, record.id);
        assert_eq!(grant.scopes, vec![Scope::Read, Scope::Write]);
    }

    #[tokio::test]
    async fn validate_bumps_last_used_at() {
        let store = store();
        let user_id = Uuid::new_v4();
        let (_, plaintext) = store
            .mint(user_id, "key".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");

        store.validate(&plaintext).await.expect("key should validate");

        let listed = store.list(user_id).await.expect("list should succeed");
        assert!(listed[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn rejects_unknown_key() {
        let store = store();
        let err = store.validate("vk_does_not_exist_anywhere_at_all").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthInvalidToken);
    }

    #[tokio::test]
    async fn rejects_key_without_prefix() {
        let store = store();
        let err = store.validate("totally-not-a-key").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthInvalidToken);
    }

    #[tokio::test]
    async fn rejects_revoked_key() {
        let store = store();
        let user_id = Uuid::new_v4();
        let (record, plaintext) = store
            .mint(user_id, "key".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");

        store.revoke(user_id, record.id).await.expect("revoke should succeed");

        assert!(store.validate(&plaintext).await.is_err());
        assert!(store.list(user_id).await.expect("list should succeed").is_empty());
    }

    #[tokio::test]
    async fn rejects_expired_key() {
        let store = store();
        let user_id = Uuid::new_v4();
        // Mint with a future expiry, then simulate passage of time by
        // rewriting the stored record.
        let (record, plaintext) = store
            .mint(user_id, "key".into(), vec![Scope::Read], Some(Utc::now() + Duration::hours(1)))
            .await
            .expect("mint should succeed");

        if let ApiKeyStore::Memory(inner) = &store {
            let mut guard = inner.write().await;
            let key = guard.get_mut(&record.id).expect("key should exist");
            key.record.expires_at = Some(Utc::now() - Duration::seconds(1));
        }

        assert!(store.validate(&plaintext).await.is_err());
    }

    #[tokio::test]
    async fn rejects_mint_with_past_expiry() {
        let store = store();
        let err = store
            .mint(
                Uuid::new_v4(),
                "key".into(),
                vec![Scope::Read],
                Some(Utc::now() - Duration::seconds(1)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn rejects_mint_with_empty_name_or_scopes() {
        let store = store();
        assert!(store.mint(Uuid::new_v4(), "  ".into(), vec![Scope::Read], None).await.is_err());
        assert!(store.mint(Uuid::new_v4(), "key".into(), vec![], None).await.is_err());
    }

    #[tokio::test]
    async fn enforces_active_key_limit() {
        let store = store();
        let user_id = Uuid::new_v4();

        let mut first_id = None;
        for i in 0..MAX_ACTIVE_KEYS_PER_USER {
            let (record, _) = store
                .mint(user_id, format!("key {i}"), vec![Scope::Read], None)
                .await
                .expect("mint under the limit should succeed");
            first_id.get_or_insert(record.id);
        }

        let err = store
            .mint(user_id, "one too many".into(), vec![Scope::Read], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        // Revoking frees a slot.
        store
            .revoke(user_id, first_id.expect("first key id"))
            .await
            .expect("revoke should succeed");
        assert!(store.mint(user_id, "replacement".into(), vec![Scope::Read], None).await.is_ok());
    }

    #[tokio::test]
    async fn get_and_update_roundtrip() {
        let store = store();
        let user_id = Uuid::new_v4();
        let (record, _) = store
            .mint(user_id, "old name".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");

        let fetched = store.get(user_id, record.id).await.expect("get should succeed");
        assert_eq!(fetched.name, "old name");

        let updated = store
            .update(user_id, record.id, Some("new name".into()), Some(vec![Scope::Write]))
            .await
            .expect("update should succeed");
        assert_eq!(updated.name, "new name");
        assert_eq!(updated.scopes, vec![Scope::Write]);

        // Other users cannot see the key.
        assert!(store.get(Uuid::new_v4(), record.id).await.is_err());
    }

    #[tokio::test]
    async fn update_rejects_empty_name_and_scopes() {
        let store = store();
        let user_id = Uuid::new_v4();
        let (record, _) = store
            .mint(user_id, "key".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");

        assert!(store.update(user_id, record.id, Some("  ".into()), None).await.is_err());
        assert!(store.update(user_id, record.id, None, Some(vec![])).await.is_err());
    }

    #[tokio::test]
    async fn revoke_unknown_key_is_not_found() {
        let store = store();
        let err = store.revoke(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn revoke_other_users_key_is_not_found() {
        let store = store();
        let owner = Uuid::new_v4();
        let (record, _) = store
            .mint(owner, "key".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");

        let err = store.revoke(Uuid::new_v4(), record.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn lookup_hash_is_deterministic_and_hex() {
        let a = lookup_hash("vk_abcdefghijklmnop_rest_ignored");
        let b = lookup_hash("vk_abcdefghijklmnop_other_tail");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, lookup_hash("vk_completely_different_head"));
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
    }
}
