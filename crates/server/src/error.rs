//! The HTTP error surface of the admission engine.
//!
//! Every variant maps to one exact status and plain-text body; clients
//! match on these strings, so they are part of the wire contract.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use link_store::StoreError;

/// Everything a REST request can be refused with.
pub enum ApiError {
    /// The path segment was not valid base64url.
    MalformedKeyEncoding,
    /// The decoded path segment was not exactly 32 bytes.
    WrongKeyLength,
    /// The body is shorter than metadata prefix plus signature.
    NotEnoughData,
    /// The body carries a payload over 256 bytes.
    PayloadTooLarge,
    /// The container version byte is not zero.
    WrongVersion,
    /// The editor signature did not verify.
    InvalidSignature,
    /// The proof-of-knowledge did not verify.
    InvalidProofOfKnowledge,
    /// The new counter did not strictly exceed the persisted one.
    CounterMustIncrease,
    /// The new expiration was earlier than the persisted one.
    ExpirationCannotDecrease,
    /// No link exists for the requested editor key.
    LinkNotFound,
    /// A storage or other server-side failure; details stay in the log.
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::MalformedKeyEncoding => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "public key is not correctly base 64 encoded",
            ),
            Self::WrongKeyLength => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "public key must be exactly 32 bytes long",
            ),
            Self::NotEnoughData => (StatusCode::UNPROCESSABLE_ENTITY, "not enough data"),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload cannot exceed 256 bytes",
            ),
            Self::WrongVersion => (StatusCode::BAD_REQUEST, "this is version zero"),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid signature"),
            Self::InvalidProofOfKnowledge => {
                (StatusCode::UNAUTHORIZED, "invalid proof of knowledge")
            }
            Self::CounterMustIncrease => (StatusCode::CONFLICT, "counter must increase"),
            Self::ExpirationCannotDecrease => {
                (StatusCode::CONFLICT, "expiration cannot decrease")
            }
            Self::LinkNotFound => (StatusCode::NOT_FOUND, "link not found"),
            Self::Internal(e) => {
                tracing::error!(target: "link-server", "internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.into())
    }
}
