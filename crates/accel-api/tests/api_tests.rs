//! End-to-end tests of the HTTP surface over a temporary job store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use accel_api::{create_router, ApiConfig, AppState};
use accel_media::{decode_image, encode_jpeg, FfmpegCodec, Frame, SoftwareAccelerator};
use accel_models::{JobId, SubmissionLimits};
use accel_storage::{JobStore, StoreConfig};
use accel_worker::{HandlerRegistry, JobExecutor, WorkerConfig};

const BOUNDARY: &str = "accel-test-boundary";

struct TestApp {
    _dir: TempDir,
    store: JobStore,
    state: AppState,
    router: Router,
}

impl TestApp {
    async fn new(config: ApiConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(StoreConfig::new(dir.path()));
        store.init().await.unwrap();
        let state = AppState::new(config, store.clone());
        let router = create_router(state.clone(), None);
        Self {
            _dir: dir,
            store,
            state,
            router,
        }
    }

    /// Worker draining the same store until the returned handle is shut down.
    fn spawn_worker(&self) -> Arc<JobExecutor> {
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        };
        let executor = Arc::new(JobExecutor::new(
            config,
            self.store.clone(),
            Box::new(SoftwareAccelerator::new()),
            HandlerRegistry::standard(Arc::new(FfmpegCodec::new())),
        ));
        let runner = executor.clone();
        tokio::spawn(async move { runner.run().await });
        executor
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post_form(&self, uri: &str, fields: &[(&str, Field)]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(multipart_body(fields)))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn job_count(&self) -> usize {
        self.store.list_handles().await.unwrap().len()
    }
}

enum Field {
    File(&'static str, Vec<u8>),
    Text(&'static str),
}

fn multipart_body(fields: &[(&str, Field)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, field) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match field {
            Field::File(file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Field::Text(value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn jpeg(rgb: [u8; 3]) -> Vec<u8> {
    encode_jpeg(&Frame::filled(16, 16, rgb)).unwrap()
}

fn quick_config() -> ApiConfig {
    ApiConfig {
        quick_path_timeout: Duration::from_secs(10),
        quick_path_poll: Duration::from_millis(10),
        ..ApiConfig::default()
    }
}

fn job_id(value: &Value) -> JobId {
    JobId::parse(value["job_id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(ApiConfig::default()).await;
    let (status, body) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get_json("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_invalid_submission_creates_no_job() {
    let app = TestApp::new(ApiConfig::default()).await;

    let (status, _) = app
        .post_form("/api/image/grayscale", &[("compare", Field::Text("true"))])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post_form(
            "/api/image/filter",
            &[
                ("image", Field::File("a.jpg", jpeg([10, 20, 30]))),
                ("filter", Field::Text("1 2 3")),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Validation"));

    assert_eq!(app.job_count().await, 0);
}

#[tokio::test]
async fn test_oversize_payload_is_rejected() {
    let config = ApiConfig {
        limits: SubmissionLimits {
            max_image_bytes: 32,
            max_video_bytes: 32,
        },
        ..ApiConfig::default()
    };
    let app = TestApp::new(config).await;

    let (status, _) = app
        .post_form("/api/video/grayscale", &[("video", Field::File("a.mp4", vec![0u8; 64]))])
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.job_count().await, 0);
}

#[tokio::test]
async fn test_video_is_always_queued() {
    let app = TestApp::new(quick_config()).await;

    let (status, body) = app
        .post_form("/api/video/grayscale", &[("video", Field::File("clip.mp4", vec![1u8; 64]))])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");

    let id = job_id(&body);
    assert_eq!(body["status_url"], format!("/api/jobs/{}/status", id));
    assert_eq!(body["result_url"], format!("/api/video/result/{}", id));

    let (status, body) = app.get_json(&format!("/api/jobs/{}/status", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "queued");
    assert_eq!(body["terminal"], false);
    assert_eq!(body["in_flight"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_image_quick_path_returns_result() {
    let app = TestApp::new(quick_config()).await;
    let worker = app.spawn_worker();

    let (status, body) = app
        .post_form(
            "/api/image/grayscale",
            &[
                ("image", Field::File("red.jpg", jpeg([255, 0, 0]))),
                ("compare", Field::Text("true")),
            ],
        )
        .await;
    worker.shutdown();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "finished");
    assert!(body["hw_time"].as_str().unwrap().contains("ms"));

    let hw = BASE64.decode(body["hw_image"].as_str().unwrap()).unwrap();
    let frame = decode_image(&hw).unwrap();
    let [r, g, b] = frame.pixel(8, 8);
    assert!((r as i32 - 76).abs() <= 4);
    assert!((r as i32 - g as i32).abs() <= 2 && (g as i32 - b as i32).abs() <= 2);

    let sw = BASE64.decode(body["sw_image"].as_str().unwrap()).unwrap();
    let [r, _, _] = decode_image(&sw).unwrap().pixel(8, 8);
    assert!((r as i32 - 76).abs() <= 4);
}

#[tokio::test]
async fn test_busy_queue_acknowledges_image() {
    let app = TestApp::new(quick_config()).await;

    let (status, _) = app
        .post_form("/api/video/grayscale", &[("video", Field::File("clip.mp4", vec![1u8; 64]))])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = app
        .post_form("/api/image/grayscale", &[("image", Field::File("a.jpg", jpeg([1, 2, 3])))])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["result_url"], format!("/api/image/result/{}", job_id(&body)));
    assert_eq!(app.job_count().await, 2);
}

#[tokio::test]
async fn test_quick_path_timeout_degrades_to_queued() {
    let config = ApiConfig {
        quick_path_timeout: Duration::from_millis(50),
        quick_path_poll: Duration::from_millis(10),
        ..ApiConfig::default()
    };
    let app = TestApp::new(config).await;

    let (status, body) = app
        .post_form("/api/image/grayscale", &[("image", Field::File("a.jpg", jpeg([1, 2, 3])))])
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, status_body) = app.get_json(&format!("/api/jobs/{}/status", job_id(&body))).await;
    assert_eq!(status_body["stage"], "queued");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quick_path_error_is_reported_with_job_id() {
    let app = TestApp::new(quick_config()).await;
    let worker = app.spawn_worker();

    let (status, body) = app
        .post_form(
            "/api/image/grayscale",
            &[("image", Field::File("broken.jpg", b"definitely not a jpeg".to_vec()))],
        )
        .await;
    worker.shutdown();

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let id = job_id(&body);

    let (_, status_body) = app.get_json(&format!("/api/jobs/{}/status", id)).await;
    assert_eq!(status_body["stage"], "error");
    assert_eq!(status_body["terminal"], true);

    let (status, body) = app.get_json(&format!("/api/image/result/{}", id)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["job_id"], id.to_string());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new(ApiConfig::default()).await;

    let (status, _) = app.get_json("/api/jobs/not-a-job/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json(&format!("/api/jobs/{}/status", JobId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json(&format!("/api/image/result/{}", JobId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_of_pending_job_conflicts() {
    let app = TestApp::new(quick_config()).await;

    let (_, body) = app
        .post_form("/api/video/grayscale", &[("video", Field::File("clip.mp4", vec![1u8; 64]))])
        .await;
    let id = job_id(&body);

    let (status, _) = app.get_json(&format!("/api/video/result/{}", id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // wrong category
    let (status, _) = app.get_json(&format!("/api/image/result/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json(&format!("/api/jobs/{}/thumbnail", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finished_result_and_thumbnail_download() {
    let app = TestApp::new(quick_config()).await;
    let worker = app.spawn_worker();

    let (status, body) = app
        .post_form(
            "/api/image/filter",
            &[
                ("image", Field::File("a.jpg", jpeg([40, 80, 120]))),
                ("filter", Field::Text("0 0 0 0 1 0 0 0 0")),
            ],
        )
        .await;
    worker.shutdown();
    assert_eq!(status, StatusCode::OK);
    let id = job_id(&body);

    let request = Request::builder()
        .uri(format!("/api/image/result/{}", id))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let [r, g, b] = decode_image(&bytes).unwrap().pixel(4, 4);
    assert!((r as i32 - 40).abs() <= 6 && (g as i32 - 80).abs() <= 6 && (b as i32 - 120).abs() <= 6);

    let request = Request::builder()
        .uri(format!("/api/jobs/{}/thumbnail", id))
        .body(Body::empty())
        .unwrap();
    let (status, thumb) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(decode_image(&thumb).is_ok());

    let (_, status_body) = app.get_json(&format!("/api/jobs/{}/status", id)).await;
    assert_eq!(status_body["stage"], "finished");
    assert_eq!(status_body["percent"], 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_history_lists_and_clears_terminal_jobs() {
    let app = TestApp::new(quick_config()).await;
    let worker = app.spawn_worker();

    for color in [[10, 10, 10], [200, 200, 200]] {
        let (status, _) = app
            .post_form("/api/image/grayscale", &[("image", Field::File("a.jpg", jpeg(color)))])
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    worker.shutdown();
    // let the worker observe shutdown before a pending job is added
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_, pending) = app
        .post_form("/api/video/grayscale", &[("video", Field::File("clip.mp4", vec![1u8; 64]))])
        .await;
    let pending_id = job_id(&pending);

    let (status, body) = app.get_json("/api/history").await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j["stage"] == "finished"));

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/history")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["deleted"], 2);

    let (_, body) = app.get_json("/api/history").await;
    assert!(body["jobs"].as_array().unwrap().is_empty());
    assert!(app.state.store().exists(&pending_id).await);
}
