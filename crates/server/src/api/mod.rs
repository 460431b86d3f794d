// REST surface assembly.
//
// All artifact and key-management routes sit behind one bearer-auth
// layer; handlers receive the resolved caller as a request extension
// and run their own scope checks before touching the store.

pub mod api_keys;
pub mod artifacts;

use axum::{middleware, Router};

use crate::{
    auth::middleware::{require_bearer_auth, AuthState},
    store::ArtifactStore,
};

pub fn build_router(store: ArtifactStore, auth: AuthState) -> Router {
    artifacts::router(store)
        .merge(api_keys::router(auth.api_keys.clone()))
        .route_layer(middleware::from_fn_with_state(auth, require_bearer_auth))
}
