//! Error taxonomy shared by the HTTP control plane and the WebSocket coordinator.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

/// The error kinds named in the coordinator's failure-handling policy.
///
/// These are *kinds*, not exception types: each one maps to a fixed local
/// reporting behavior (an `error` frame to the offending session, or an
/// HTTP status for the control plane) rather than carrying a stack trace.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("frame received before authentication completed")]
    Unauthorized,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("active editor limit reached")]
    EditorLimitReached,
    #[error("version conflict")]
    VersionConflict,
    #[error("malformed frame")]
    InvalidFrame,
    #[error("syntax tag not in allow-list")]
    InvalidSyntax,
    #[error("note not found")]
    NotFound,
    #[error("transport failure")]
    Transport,
}

impl ErrorKind {
    /// The HTTP status this kind maps to when surfaced from the control plane.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::EditorLimitReached => StatusCode::CONFLICT,
            ErrorKind::VersionConflict => StatusCode::CONFLICT,
            ErrorKind::InvalidFrame | ErrorKind::InvalidSyntax => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transport => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable tag carried on the outbound `error` frame and in JSON
    /// error bodies, e.g. `"editor_limit_reached"`.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::EditorLimitReached => "editor_limit_reached",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::InvalidFrame => "invalid_frame",
            ErrorKind::InvalidSyntax => "invalid_syntax",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transport => "transport",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Wraps an [`anyhow::Error`] for use as an axum handler error: log the real
/// cause, expose a generic message unless the cause is a known [`ErrorKind`].
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(kind) = self.0.downcast_ref::<ErrorKind>() {
            let kind = *kind;
            return (
                kind.status(),
                axum::Json(ErrorBody {
                    error: kind.tag(),
                    message: kind.to_string(),
                }),
            )
                .into_response();
        }
        error!("unhandled application error: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(ErrorBody {
                error: "internal",
                message: "something went wrong".to_string(),
            }),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
