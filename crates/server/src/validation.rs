// Input validation helpers.
//
// `ValidatedJson<T>` extractor: content-type check + serde with structured
// error responses instead of Axum's plain-text rejections.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ErrorCode};

/// Maximum request body in bytes (1 MiB), enforced by the
/// `DefaultBodyLimit` layer in main.rs.
pub const MAX_REST_BODY_BYTES: usize = 1024 * 1024;

/// A JSON body extractor that returns a structured `ApiError` on failure.
///
/// Use this instead of `axum::Json<T>` in handlers to get consistent
/// VALIDATION_FAILED error responses.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(ApiError::new(ErrorCode::ValidationFailed, message)
                    .with_details(details)
                    .into_response())
            }
        }
    }
}

/// Classify a JSON rejection into a human-readable message and details object.
fn classify_json_rejection(rejection: &JsonRejection) -> (String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => (
            format!("invalid JSON payload: {e}"),
            serde_json::json!({ "kind": "data_error" }),
        ),
        JsonRejection::JsonSyntaxError(e) => (
            format!("malformed JSON: {e}"),
            serde_json::json!({ "kind": "syntax_error" }),
        ),
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            serde_json::json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => (
            format!("request body error: {e}"),
            serde_json::json!({ "kind": "body_error" }),
        ),
        other => (
            format!("request body error: {other}"),
            serde_json::json!({ "kind": "unknown" }),
        ),
    }
}
