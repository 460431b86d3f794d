use crate::{
    auth::api_keys::{ApiKeyStore, API_KEY_PREFIX},
    auth::jwt::JwtAccessTokenService,
    error::{ApiError, ErrorCode},
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;
use vellum_common::types::Scope;

/// The identity resolved by [`require_bearer_auth`], available to
/// handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub user_id: Uuid,
    /// Set when the caller authenticated with an API key rather than a JWT.
    pub key_id: Option<Uuid>,
    pub scopes: Vec<Scope>,
}

impl AuthenticatedCaller {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Shared state for the bearer-auth middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtAccessTokenService>,
    pub api_keys: ApiKeyStore,
}

/// Bearer-token middleware covering both credential kinds: tokens with
/// the `vk_` prefix are resolved through the API key store, everything
/// else is validated as a JWT access token.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing bearer token"),
    };

    let caller = if token.starts_with(API_KEY_PREFIX) {
        match auth.api_keys.validate(token).await {
            Ok(grant) => AuthenticatedCaller {
                user_id: grant.user_id,
                key_id: Some(grant.key_id),
                scopes: grant.scopes,
            },
            Err(_) => return unauthorized_response("invalid api key"),
        }
    } else {
        match auth.jwt.validate_access_token(token) {
            Ok(grant) => AuthenticatedCaller {
                user_id: grant.user_id,
                key_id: None,
                scopes: grant.scopes,
            },
            Err(_) => return unauthorized_response("invalid bearer token"),
        }
    };

    request.extensions_mut().insert(caller);

    next.run(request).await
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

fn unauthorized_response(message: &'static str) -> Response {
    ApiError::new(ErrorCode::AuthInvalidToken, message).into_response()
}

/// Reject the request unless the caller's credential carries `scope`.
pub fn require_scope(caller: &AuthenticatedCaller, scope: Scope) -> Result<(), ApiError> {
    if caller.has_scope(scope) {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::AuthForbidden,
            format!("credential is missing the '{scope}' scope"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{require_bearer_auth, require_scope, AuthState, AuthenticatedCaller};
    use crate::auth::api_keys::ApiKeyStore;
    use crate::auth::jwt::JwtAccessTokenService;
    use axum::{
        body::Body,
        extract::Extension,
        http::{header::AUTHORIZATION, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;
    use vellum_common::types::Scope;

    const TEST_SECRET: &str = "vellum_test_secret_that_is_definitely_long_enough";

    fn auth_state() -> AuthState {
        AuthState {
            jwt: Arc::new(JwtAccessTokenService::new(TEST_SECRET).expect("service")),
            api_keys: ApiKeyStore::in_memory(),
        }
    }

    fn protected_app(auth: AuthState) -> Router {
        Router::new()
            .route(
                "/protected",
                get(|Extension(caller): Extension<AuthenticatedCaller>| async move {
                    format!("{}:{}", caller.user_id, caller.key_id.is_some())
                }),
            )
            .layer(middleware::from_fn_with_state(auth, require_bearer_auth))
    }

    #[tokio::test]
    async fn rejects_requests_without_bearer_token() {
        let app = protected_app(auth_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_requests_with_invalid_bearer_token() {
        let app = protected_app(auth_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, "Bearer invalid-token")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn injects_caller_for_valid_jwt() {
        let auth = auth_state();
        let user_id = Uuid::new_v4();
        let token =
            auth.jwt.issue_access_token(user_id, &Scope::ALL).expect("token should be issued");

        let response = protected_app(auth)
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn injects_caller_for_valid_api_key() {
        let auth = auth_state();
        let user_id = Uuid::new_v4();
        let (_, plaintext) = auth
            .api_keys
            .mint(user_id, "test key".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");

        let response = protected_app(auth)
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, format!("Bearer {plaintext}"))
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_revoked_api_key() {
        let auth = auth_state();
        let user_id = Uuid::new_v4();
        let (record, plaintext) = auth
            .api_keys
            .mint(user_id, "test key".into(), vec![Scope::Read], None)
            .await
            .expect("mint should succeed");
        auth.api_keys.revoke(user_id, record.id).await.expect("revoke should succeed");

        let response = protected_app(auth)
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, format!("Bearer {plaintext}"))
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn require_scope_checks_credential_scopes() {
        let caller = AuthenticatedCaller {
            user_id: Uuid::new_v4(),
            key_id: None,
            scopes: vec![Scope::Read],
        };
        assert!(require_scope(&caller, Scope::Read).is_ok());
        assert!(require_scope(&caller, Scope::Write).is_err());
    }
}
