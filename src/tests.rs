//! Router-level tests driving the full HTTP surface

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use rand::RngCore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::Database;
use crate::ledger::{IntegrityLedger, LedgerSigner, SqliteLedger};
use crate::services::{AccessGate, ContentHasher, FileStore, Mailer};
use crate::storage::LocalStorage;
use crate::{create_router, AppState};

const BOUNDARY: &str = "----notarydrop-test-boundary";

struct TestApp {
    router: Router,
    ledger: Arc<IntegrityLedger>,
    _dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::in_memory().await.unwrap();
    let store = Arc::new(FileStore::new(
        db.clone(),
        Arc::new(LocalStorage::new(dir.path())),
    ));
    let ledger = Arc::new(IntegrityLedger::new(
        Arc::new(SqliteLedger::new(db)),
        LedgerSigner::generate(),
        Duration::from_secs(5),
        8,
    ));
    let config = Config::default();

    let state = AppState {
        gate: Arc::new(AccessGate::new(store.clone())),
        store,
        ledger: ledger.clone(),
        mailer: Arc::new(Mailer::new(config.mail.clone())),
        config: Arc::new(config),
    };

    TestApp {
        router: create_router(state),
        ledger,
        _dir: dir,
    }
}

/// Hand-built multipart/form-data body
#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, file_name: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

fn multipart_request(uri: &str, owner: Option<&str>, form: Form) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(owner) = owner {
        builder = builder.header("user-id", owner);
    }
    builder.body(Body::from(form.finish())).unwrap()
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn upload(app: &TestApp, form: Form) -> Value {
    let response = send(app, multipart_request("/api/v1/upload", Some("alice"), form)).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[tokio::test]
async fn test_ping() {
    let app = test_app().await;
    let response = send(&app, get("/api/v1/ping").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"pong");
}

#[tokio::test]
async fn test_single_use_download() {
    let app = test_app().await;
    let data = random_bytes(1024);

    let uploaded = upload(&app, Form::default().file("report.pdf", &data)).await;
    let id = uploaded["id"].as_str().unwrap().to_string();
    assert_eq!(uploaded["file_hash"], ContentHasher::digest(&data));
    assert_eq!(uploaded["file_size"], 1024);
    assert_eq!(uploaded["notarization"]["status"], "committed");
    assert!(uploaded["link"].as_str().unwrap().ends_with(&format!("/api/v1/download/{}", id)));

    let uri = format!("/api/v1/download/{}", id);
    let response = send(
        &app,
        get(&uri).header("password", "anything").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("filename=\"report.pdf\""));
    assert!(disposition.contains("filename*=UTF-8''report.pdf"));
    assert_eq!(body_bytes(response).await, data);

    let again = send(&app, get(&uri).body(Body::empty()).unwrap()).await;
    assert!(
        matches!(again.status(), StatusCode::FORBIDDEN | StatusCode::NOT_FOUND),
        "second download returned {}",
        again.status()
    );
}

#[tokio::test]
async fn test_expired_on_arrival() {
    let app = test_app().await;
    let uploaded = upload(
        &app,
        Form::default()
            .file("secret.txt", b"classified")
            .text("password", "pw123")
            .text("expiryMinutes", "0"),
    )
    .await;

    let uri = format!("/api/v1/download/{}", uploaded["id"].as_str().unwrap());
    let response = send(
        &app,
        get(&uri).header("password", "pw123").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_json(response).await["reason"], "expired");
}

#[tokio::test]
async fn test_wrong_password_is_refused() {
    let app = test_app().await;
    let uploaded = upload(
        &app,
        Form::default()
            .file("secret.txt", b"classified")
            .text("password", "pw123"),
    )
    .await;
    let uri = format!("/api/v1/download/{}", uploaded["id"].as_str().unwrap());

    let response = send(
        &app,
        get(&uri).header("password", "wrong").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["reason"], "access_refused");

    let missing = send(&app, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        get(&uri).header("password", "pw123").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"classified");
}

#[tokio::test]
async fn test_unknown_download_is_refused() {
    let app = test_app().await;
    let response = send(
        &app,
        get("/api/v1/download/does-not-exist").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_owner_header_required() {
    let app = test_app().await;
    let response = send(
        &app,
        multipart_request("/api/v1/upload", None, Form::default().file("a.txt", b"a")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, get("/api/v1/my-files").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["reason"], "unauthorized");
}

#[tokio::test]
async fn test_missing_file_is_rejected() {
    let app = test_app().await;
    let response = send(
        &app,
        multipart_request(
            "/api/v1/upload",
            Some("alice"),
            Form::default().text("originalName", "nothing.txt"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["reason"], "input_missing");
}

#[tokio::test]
async fn test_invalid_expiry_is_rejected() {
    let app = test_app().await;
    let response = send(
        &app,
        multipart_request(
            "/api/v1/upload",
            Some("alice"),
            Form::default()
                .file("a.txt", b"a")
                .text("expiryMinutes", "-5"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let listed = send(
        &app,
        get("/api/v1/my-files").header("user-id", "alice").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body_json(listed).await["data"]["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_duplicate_notarized_upload_conflicts() {
    let app = test_app().await;
    upload(&app, Form::default().file("deed.pdf", b"same deed")).await;

    let response = send(
        &app,
        multipart_request(
            "/api/v1/upload",
            Some("alice"),
            Form::default().file("copy.pdf", b"same deed"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["reason"], "already_registered");

    // Without notarization the same bytes are accepted
    let plain = upload(
        &app,
        Form::default()
            .file("copy.pdf", b"same deed")
            .text("notarize", "false"),
    )
    .await;
    assert_eq!(plain["notarization"]["status"], "skipped");
}

#[tokio::test]
async fn test_verify() {
    let app = test_app().await;
    let uploaded = upload(&app, Form::default().file("deed.pdf", b"registered deed")).await;

    let response = send(
        &app,
        multipart_request(
            "/api/v1/verify",
            None,
            Form::default().file("deed.pdf", b"registered deed"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let verified = body_json(response).await["data"].clone();
    assert_eq!(verified["valid"], true);
    assert_eq!(verified["file_hash"], uploaded["file_hash"]);

    let response = send(
        &app,
        multipart_request(
            "/api/v1/verify",
            None,
            Form::default().file("forged.pdf", b"forged deed"),
        ),
    )
    .await;
    let verified = body_json(response).await["data"].clone();
    assert_eq!(verified["valid"], false);
    assert_eq!(verified["status"], "not_registered");

    let by_digest = send(
        &app,
        multipart_request(
            "/api/v1/verify",
            None,
            Form::default().text("digest", uploaded["file_hash"].as_str().unwrap()),
        ),
    )
    .await;
    assert_eq!(body_json(by_digest).await["data"]["valid"], true);

    let empty = send(&app, multipart_request("/api/v1/verify", None, Form::default())).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_my_files_newest_first() {
    let app = test_app().await;
    let first = upload(&app, Form::default().file("first.txt", b"1")).await;
    let second = upload(&app, Form::default().file("second.txt", b"2")).await;
    let response = send(
        &app,
        multipart_request("/api/v1/upload", Some("mallory"), Form::default().file("m.txt", b"m")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        get("/api/v1/my-files").header("user-id", "alice").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let files = body_json(response).await["data"]["files"].clone();
    let ids: Vec<&str> = files
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![second["id"].as_str().unwrap(), first["id"].as_str().unwrap()]
    );
    assert_eq!(files[0]["has_password"], false);
    assert!(files[0].get("access_secret_hash").is_none());
}

#[tokio::test]
async fn test_ledger_read_model_and_chain() {
    let app = test_app().await;
    let a = upload(&app, Form::default().file("a.txt", b"alpha")).await;
    let b = upload(&app, Form::default().file("b.txt", b"beta")).await;
    let signer = app.ledger.signer().address().to_string();

    let response = send(&app, get("/api/v1/ledger/files").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let items = body_json(response).await["data"].clone();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["file_hash"], a["file_hash"]);
    assert_eq!(items[0]["uploader"], signer.as_str());
    assert_eq!(items[1]["previous_hash"], a["file_hash"]);
    assert_eq!(items[1]["file_name"], "b.txt");
    assert_eq!(items[1]["tx_hash"], b["notarization"]["tx_hash"]);

    let uri = format!("/api/v1/ledger/chain/{}", signer);
    let response = send(&app, get(&uri).body(Body::empty()).unwrap()).await;
    let audit = body_json(response).await["data"].clone();
    assert_eq!(audit["valid"], true);
    assert_eq!(audit["length"], 2);
    assert_eq!(audit["head"], b["file_hash"]);
}

#[tokio::test]
async fn test_send_link_requires_owned_file() {
    let app = test_app().await;
    let uploaded = upload(&app, Form::default().file("a.txt", b"a")).await;

    let request = |owner: &str, file_id: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/send")
            .header("user-id", owner)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "receiverEmail": "bob@example.org", "fileId": file_id })
                    .to_string(),
            ))
            .unwrap()
    };

    let response = send(&app, request("alice", "missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let id = uploaded["id"].as_str().unwrap();
    let response = send(&app, request("mallory", id)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Mail is not configured in tests
    let response = send(&app, request("alice", id)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
