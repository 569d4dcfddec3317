use atlas_shared::AtlasError;
use atlas_shared::api::ErrorBody;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response. `code` and `fallback` come from the server's
    /// JSON error body when it sent one.
    #[error("server returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        fallback: Option<String>,
        message: String,
    },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error(transparent)]
    Engine(#[from] AtlasError),

    /// A newer request for the same view slot was issued while this one was
    /// in flight.
    #[error("response superseded by a newer request")]
    Superseded,
}

impl ClientError {
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(body) => Self::Status {
                status,
                code: Some(body.code),
                fallback: body.fallback,
                message: body.error,
            },
            Err(_) => Self::Status {
                status,
                code: None,
                fallback: None,
                message: body.chars().take(200).collect(),
            },
        }
    }

    /// Transient failures worth one more attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Status { status, .. } => *status >= 500 && *status != 503,
            _ => false,
        }
    }

    /// The server cannot answer point lookups; navigate by boundaries instead.
    pub fn is_spatial_unavailable(&self) -> bool {
        match self {
            Self::Engine(AtlasError::SpatialIndexUnavailable) => true,
            Self::Status { code, .. } => code.as_deref() == Some("SPATIAL_INDEX_UNAVAILABLE"),
            _ => false,
        }
    }
}
