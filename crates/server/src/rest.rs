//! The REST admission engine: GET and PUT of signed containers.

use crate::error::ApiError;
use crate::metrics;
use crate::{pubsub, AppState};
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine as _, GeneralPurpose, GeneralPurposeConfig};
use link_crypto::{verify_pok, verify_signature};
use link_types::container::{self, ContainerError, CONTAINER_VERSION};
use link_types::record::{EditorPublicKey, LinkRecord};
use link_store::{LinkStore, UpsertOutcome};

/// base64url, accepting input with or without trailing padding.
const BASE64_URL_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes the path segment into an editor public key.
pub(crate) fn decode_editor_public_key(encoded: &str) -> Result<EditorPublicKey, ApiError> {
    let bytes = BASE64_URL_LENIENT
        .decode(encoded)
        .map_err(|_| ApiError::MalformedKeyEncoding)?;
    let key: [u8; 32] = bytes.try_into().map_err(|_| ApiError::WrongKeyLength)?;
    Ok(EditorPublicKey(key))
}

fn octet_stream(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response()
}

/// `/` doubles as the WebSocket mount and the service-info document: an
/// upgrade request enters the pub/sub fabric, a plain GET describes the
/// service.
pub(crate) async fn root(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => upgrade.on_upgrade(move |socket| pubsub::serve_socket(socket, state)),
        None => Json(serde_json::json!({
            "name": "Link Server",
            "description": "An end-to-end encrypted link server",
            "website": "https://github.com/graffiti-garden/link-server-rs",
        }))
        .into_response(),
    }
}

/// `GET /{editor_public_key_base64}`: the raw signed container, verbatim.
///
/// Expired links are still readable until the sweeper removes them; only
/// backlog scans filter by expiration.
pub(crate) async fn get_link(
    State(state): State<AppState>,
    Path(editor_public_key_base64): Path<String>,
) -> Result<Response, ApiError> {
    let editor_public_key = decode_editor_public_key(&editor_public_key_base64)?;

    match state.store.get(&editor_public_key).await? {
        Some(record) => {
            metrics::GET_TOTAL.with_label_values(&["ok"]).inc();
            Ok(octet_stream(record.container_signed))
        }
        None => {
            metrics::GET_TOTAL.with_label_values(&["miss"]).inc();
            Err(ApiError::LinkNotFound)
        }
    }
}

/// `PUT /{editor_public_key_base64}`: admit a signed container.
///
/// The validation order is part of the contract: key decoding, length
/// bounds, version, editor signature, proof-of-knowledge, and only then the
/// monotonic upsert.
pub(crate) async fn put_link(
    State(state): State<AppState>,
    Path(editor_public_key_base64): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let editor_public_key = decode_editor_public_key(&editor_public_key_base64)?;

    let container = container::unpack(&body).map_err(|e| match e {
        ContainerError::TooShort { .. } => ApiError::NotEnoughData,
        ContainerError::TooLong { .. } => ApiError::PayloadTooLarge,
    })?;

    if container.meta.version != CONTAINER_VERSION {
        return Err(ApiError::WrongVersion);
    }

    verify_signature(&editor_public_key, container.signed, &container.signature)
        .map_err(|_| ApiError::InvalidSignature)?;
    verify_pok(
        &container.meta.info_hash,
        &editor_public_key,
        &container.meta.pok,
    )
    .map_err(|_| ApiError::InvalidProofOfKnowledge)?;

    let record = LinkRecord::from_container(editor_public_key, &container, &body);
    match state.store.upsert_if_monotonic(record).await? {
        UpsertOutcome::Inserted => {
            metrics::PUT_TOTAL.with_label_values(&["inserted"]).inc();
            Ok(().into_response())
        }
        UpsertOutcome::Replaced(old) => {
            metrics::PUT_TOTAL.with_label_values(&["replaced"]).inc();
            Ok(octet_stream(old.container_signed))
        }
        UpsertOutcome::RejectedCounter(_) => {
            metrics::PUT_TOTAL
                .with_label_values(&["rejected_counter"])
                .inc();
            Err(ApiError::CounterMustIncrease)
        }
        UpsertOutcome::RejectedExpiration(_) => {
            metrics::PUT_TOTAL
                .with_label_values(&["rejected_expiration"])
                .inc();
            Err(ApiError::ExpirationCannotDecrease)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    #[test]
    fn decodes_padded_and_unpadded_keys() {
        let key = [7u8; 32];
        for encoded in [URL_SAFE_NO_PAD.encode(key), URL_SAFE.encode(key)] {
            assert!(matches!(
                decode_editor_public_key(&encoded),
                Ok(EditorPublicKey(decoded)) if decoded == key
            ));
        }
    }

    #[test]
    fn rejects_bad_encodings_before_length() {
        assert!(matches!(
            decode_editor_public_key("!@#$%^"),
            Err(ApiError::MalformedKeyEncoding)
        ));
        // Standard-alphabet characters are not valid base64url.
        assert!(matches!(
            decode_editor_public_key("a+b/"),
            Err(ApiError::MalformedKeyEncoding)
        ));
    }

    #[test]
    fn rejects_wrong_length_keys() {
        for len in [0usize, 16, 31, 33, 64] {
            let encoded = URL_SAFE_NO_PAD.encode(vec![1u8; len]);
            assert!(matches!(
                decode_editor_public_key(&encoded),
                Err(ApiError::WrongKeyLength)
            ));
        }
    }
}
