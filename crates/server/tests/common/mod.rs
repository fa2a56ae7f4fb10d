#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use http_body_util::BodyExt;
use link_crypto::Keypair;
use link_server::{app, AppState, Hub};
use link_store::{LinkStore, RedbLinkStore};
use link_types::container::{self, ContainerMeta, CONTAINER_VERSION};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestServer {
    pub app: Router,
    pub store: Arc<RedbLinkStore>,
    pub hub: Arc<Hub>,
    _dir: TempDir,
}

pub fn test_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RedbLinkStore::open(dir.path().join("links.redb")).unwrap());
    let hub = Arc::new(Hub::new());
    let state = AppState {
        store: store.clone() as Arc<dyn LinkStore>,
        hub: hub.clone(),
    };
    TestServer {
        app: app(state),
        store,
        hub,
        _dir: dir,
    }
}

/// Builds a complete signed container the way a client would: pack the
/// metadata and payload, then append the editor's signature.
pub fn signed_container(
    editor: &Keypair,
    uri: &Keypair,
    counter: i64,
    expiration: i64,
    payload: &[u8],
) -> Vec<u8> {
    let meta = ContainerMeta {
        version: CONTAINER_VERSION,
        info_hash: uri.info_hash(),
        pok: uri.prove_knowledge(&editor.editor_public_key()),
        counter,
        expiration,
    };
    let mut bytes = container::pack(&meta, payload);
    let signature = editor.sign(&bytes);
    bytes.extend_from_slice(&signature);
    bytes
}

pub fn editor_path(editor: &Keypair) -> String {
    format!("/{}", URL_SAFE_NO_PAD.encode(editor.public_bytes()))
}

pub async fn request(
    server: &TestServer,
    method: Method,
    path: &str,
    body: Vec<u8>,
) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::from(body))
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();
    (status, body)
}

pub async fn put(server: &TestServer, editor: &Keypair, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    request(server, Method::PUT, &editor_path(editor), body).await
}

pub async fn get(server: &TestServer, path: &str) -> (StatusCode, Vec<u8>) {
    request(server, Method::GET, path, Vec::new()).await
}

pub async fn get_with_content_type(
    server: &TestServer,
    path: &str,
) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();
    (status, content_type, body)
}
