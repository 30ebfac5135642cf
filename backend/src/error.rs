use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorBody;
use thiserror::Error;

/// Request-level error, mapped to an HTTP status and a JSON body at the
/// handler boundary. The four upstream kinds stay distinguishable so a
/// caller can tell a bad upload from a misconfigured key or a flaky
/// service. Upstream text is truncated and never contains our API keys
/// (keys travel in query strings, which are not echoed back by Google).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream authentication failed: {0}")]
    Auth(String),
    #[error("upstream service unavailable: {0}")]
    Transient(String),
    #[error("unexpected upstream response: {0}")]
    Protocol(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Auth(_) => "auth",
            ApiError::Transient(_) => "upstream_unavailable",
            ApiError::Protocol(_) => "upstream_protocol",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Raw upstream text for the three upstream kinds. Client-input and
    /// internal errors carry everything in the message itself.
    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Auth(m) | ApiError::Transient(m) | ApiError::Protocol(m) => Some(m.clone()),
            ApiError::BadRequest(_) | ApiError::Internal(_) => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Protocol(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
            details: self.detail(),
        })
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// Cap upstream error text carried into our own error messages.
pub fn truncate_detail(text: &str) -> String {
    const MAX: usize = 300;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}
