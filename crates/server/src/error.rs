use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;
use vellum_common::{edit::EditError, error::DomainError};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    AuthInvalidToken,
    AuthForbidden,
    NotFound,
    NoMatch,
    AmbiguousMatch,
    LineOutOfRange,
    EditConflict,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::AuthInvalidToken => "AUTH_INVALID_TOKEN",
            Self::AuthForbidden => "AUTH_FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::NoMatch => "NO_MATCH",
            Self::AmbiguousMatch => "AMBIGUOUS_MATCH",
            Self::LineOutOfRange => "LINE_OUT_OF_RANGE",
            Self::EditConflict => "EDIT_CONFLICT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::AuthInvalidToken => StatusCode::UNAUTHORIZED,
            Self::AuthForbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NoMatch => StatusCode::CONFLICT,
            Self::AmbiguousMatch => StatusCode::CONFLICT,
            Self::LineOutOfRange => StatusCode::BAD_REQUEST,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::EditConflict | Self::InternalError)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::AuthInvalidToken => "invalid authentication credential",
            Self::AuthForbidden => "caller lacks required scope",
            Self::NotFound => "requested resource not found",
            Self::NoMatch => "string not found in artifact content",
            Self::AmbiguousMatch => "string matches more than once; widen the anchor",
            Self::LineOutOfRange => "line number outside the content",
            Self::EditConflict => "artifact was modified concurrently",
            Self::InternalError => "internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Value,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: json!({}), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn internal(error: anyhow::Error) -> Self {
        tracing::error!(error = ?error, "internal api error");
        Self::from_code(ErrorCode::InternalError)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Value {
        &self.details
    }
}

/// Renders a core domain failure as its transport-level error. This is
/// the single mapping both the REST handlers and the MCP tool dispatch
/// go through.
impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::NotFound => Self::from_code(ErrorCode::NotFound),
            DomainError::Validation(message) => Self::new(ErrorCode::ValidationFailed, message),
            DomainError::EditConflict => Self::from_code(ErrorCode::EditConflict),
            DomainError::Edit(edit) => match &edit {
                EditError::EmptyNeedle => {
                    Self::new(ErrorCode::ValidationFailed, edit.to_string())
                }
                EditError::NoMatch => Self::from_code(ErrorCode::NoMatch),
                EditError::AmbiguousMatch { occurrences, context } => {
                    Self::new(ErrorCode::AmbiguousMatch, edit.to_string()).with_details(json!({
                        "occurrences": occurrences,
                        "matches": context,
                    }))
                }
                EditError::LineOutOfRange { line, max } => {
                    Self::new(ErrorCode::LineOutOfRange, edit.to_string())
                        .with_details(json!({ "line": line, "max": max }))
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);

        let mut response = (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                    "request_id": request_id.clone(),
                    "details": self.details,
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::Value;
    use vellum_common::{edit::EditError, error::DomainError};

    use super::{with_request_id_scope, ApiError, ErrorCode};

    #[tokio::test]
    async fn api_error_uses_scoped_request_id() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            ApiError::from_code(ErrorCode::InternalError).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        let parsed: Value =
            serde_json::from_slice(&body).expect("error response body should be valid json");

        assert_eq!(parsed["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["error"]["retryable"], true);
        assert_eq!(parsed["error"]["request_id"], "req-scoped-123");
    }

    #[tokio::test]
    async fn ambiguous_match_carries_disambiguation_details() {
        let domain = DomainError::Edit(EditError::AmbiguousMatch {
            occurrences: 4,
            context: vec!["line 1: foo".to_owned(), "+3 more".to_owned()],
        });
        let response = ApiError::from(domain).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let parsed: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(parsed["error"]["code"], "AMBIGUOUS_MATCH");
        assert_eq!(parsed["error"]["details"]["occurrences"], 4);
        assert_eq!(parsed["error"]["details"]["matches"][0], "line 1: foo");
    }

    #[tokio::test]
    async fn no_match_maps_to_conflict_status() {
        let response = ApiError::from(DomainError::Edit(EditError::NoMatch)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn not_found_hides_ownership_details() {
        let response = ApiError::from(DomainError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let parsed: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(parsed["error"]["message"], "requested resource not found");
    }
}
