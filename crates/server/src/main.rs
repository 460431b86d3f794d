mod api;
mod auth;
mod config;
mod db;
mod error;
mod mcp;
mod store;
mod validation;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    auth::{api_keys::ApiKeyStore, jwt::JwtAccessTokenService, middleware::AuthState},
    config::ServerConfig,
    store::ArtifactStore,
    validation::MAX_REST_BODY_BYTES,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if config.is_dev_jwt_secret() {
        warn!("running with the development JWT secret; set VELLUM_JWT_SECRET in production");
    }

    let jwt = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid vellum JWT secret")?,
    );

    let (store, api_keys) = match &config.database_url {
        Some(url) => {
            let pool = db::pool::create_pg_pool(url, db::pool::PoolConfig::from_env())
                .await
                .context("failed to create postgres pool")?;
            db::migrations::run_migrations(&pool).await.context("failed to run migrations")?;
            db::pool::check_pool_health(&pool).await.context("postgres health check failed")?;
            info!("connected to postgres");
            (ArtifactStore::Postgres(pool.clone()), ApiKeyStore::Postgres(pool))
        }
        None => {
            warn!("VELLUM_DATABASE_URL not set; artifacts and api keys are in-memory only");
            (ArtifactStore::in_memory(), ApiKeyStore::in_memory())
        }
    };

    let auth = AuthState { jwt, api_keys };
    let cors = config.cors_origins.as_deref().map(cors_layer);
    let app = build_app(store, auth, cors);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting vellum server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("vellum server exited unexpectedly")
}

fn build_app(store: ArtifactStore, auth: AuthState, cors: Option<CorsLayer>) -> Router {
    let mcp_router = mcp::router(store.clone()).route_layer(middleware::from_fn_with_state(
        auth.clone(),
        auth::middleware::require_bearer_auth,
    ));

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .merge(api::build_router(store, auth))
        .merge(mcp_router);

    if let Some(cors) = cors {
        router = router.layer(cors);
    }

    apply_middleware(router)
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let origins: Vec<HeaderValue> =
        origins.split(',').filter_map(|origin| origin.trim().parse().ok()).collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Assigns every request an id (honoring an inbound `x-request-id`),
/// scopes it so error bodies can echo it, and logs one completion line.
async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = error::request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response =
        error::with_request_id_scope(request_id.clone(), next.run(request)).await;

    error::attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    use super::{apply_middleware, build_app};
    use crate::{
        auth::{api_keys::ApiKeyStore, jwt::JwtAccessTokenService, middleware::AuthState},
        store::ArtifactStore,
        validation::MAX_REST_BODY_BYTES,
    };

    fn test_app() -> Router {
        let auth = AuthState {
            jwt: Arc::new(
                JwtAccessTokenService::new("vellum_test_secret_that_is_definitely_long_enough")
                    .expect("test jwt service should initialize"),
            ),
            api_keys: ApiKeyStore::in_memory(),
        };
        build_app(ArtifactStore::in_memory(), auth, None)
    }

    #[tokio::test]
    async fn health_check_has_request_id_header() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn inbound_request_id_is_echoed() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "req-from-client")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(response.headers()["x-request-id"], "req-from-client");
    }

    #[tokio::test]
    async fn protected_surfaces_require_auth() {
        for (method, uri) in
            [(Method::GET, "/v1/artifacts"), (Method::POST, "/mcp"), (Method::GET, "/v1/api-keys")]
        {
            let response = test_app()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("request should return a response");

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn panic_handler_returns_internal_server_error() {
        async fn panic_route() -> &'static str {
            panic!("test panic");
        }

        let app = apply_middleware(Router::new().route("/panic", get(panic_route)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/panic")
                    .body(Body::empty())
                    .expect("panic request should build"),
            )
            .await
            .expect("panic request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn request_body_limit_is_enforced() {
        async fn echo(body: String) -> String {
            body
        }

        let oversized_body = "a".repeat(MAX_REST_BODY_BYTES + 1);
        let app = apply_middleware(Router::new().route("/echo", post(echo)));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .header("content-type", "text/plain")
                    .body(Body::from(oversized_body))
                    .expect("echo request should build"),
            )
            .await
            .expect("echo request should return a response");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
