//! HTTP surface tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use mcomp_api::{create_router, ApiConfig, AppState};
use mcomp_media::{CopyTranscoder, MediaError, MediaResult, TranscodeProcess, TranscodeRequest, Transcoder};
use mcomp_worker::{Scheduler, WorkerConfig};

/// Runs never finish until terminated.
struct HoldTranscoder;

struct HoldProcess {
    terminated: bool,
}

#[async_trait]
impl Transcoder for HoldTranscoder {
    fn name(&self) -> &'static str {
        "hold"
    }

    async fn start(&self, _: &TranscodeRequest) -> MediaResult<Box<dyn TranscodeProcess>> {
        Ok(Box::new(HoldProcess { terminated: false }))
    }
}

#[async_trait]
impl TranscodeProcess for HoldProcess {
    async fn wait(&mut self) -> MediaResult<()> {
        if self.terminated {
            return Err(MediaError::Terminated);
        }
        std::future::pending().await
    }

    fn terminate(&mut self) -> MediaResult<()> {
        self.terminated = true;
        Ok(())
    }

    async fn kill(&mut self) -> MediaResult<()> {
        self.terminated = true;
        Ok(())
    }
}

struct TestApp {
    dir: TempDir,
    scheduler: Arc<Scheduler>,
    router: Router,
}

fn worker_config(dir: &TempDir) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_processes: 1,
        work_dir: dir.path().join("work"),
        upload_dir: dir.path().join("uploads"),
        shutdown_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

fn build(config: WorkerConfig, api: ApiConfig, transcoder: Arc<dyn Transcoder>, dir: TempDir) -> TestApp {
    let scheduler = Arc::new(Scheduler::start(config, transcoder).unwrap());
    let state = AppState::new(api, Arc::clone(&scheduler));
    TestApp {
        dir,
        scheduler,
        router: create_router(state, None),
    }
}

fn copy_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = worker_config(&dir);
    build(config, ApiConfig::default(), Arc::new(CopyTranscoder::new()), dir)
}

impl TestApp {
    fn upload(&self, name: &str, size: usize) -> Value {
        let uploads = self.dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let path = uploads.join(name);
        std::fs::write(&path, vec![1u8; size]).unwrap();
        json!({
            "user_id": "alice",
            "path": path,
            "kind": "audio",
            "size": size,
        })
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_as(None, method, uri, body).await
    }

    async fn call_as(
        &self,
        token: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    async fn wait_for_status(&self, job_id: &str, expected: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (status, body) = self
                .call(Method::GET, &format!("/api/jobs/{}", job_id), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] == expected {
                return body;
            }
            assert!(tokio::time::Instant::now() < deadline, "job stuck at {}", body["status"]);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test]
async fn test_health_reports_transcoder() {
    let app = copy_app();
    let (status, body) = app.call(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["transcoder"], "copy");
    assert!(body["ffmpeg_available"].is_boolean());
    assert_eq!(body["load"]["capacity"], 1);
}

#[tokio::test]
async fn test_submit_run_and_acknowledge_delivery() {
    let app = copy_app();
    let upload = app.upload("voice.ogg", 2048);

    let (status, body) = app.call(Method::POST, "/api/jobs", Some(upload)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let job = app.wait_for_status(&job_id, "succeeded").await;
    assert_eq!(job["user_id"], "alice");
    assert_eq!(job["preset"], "medium");
    assert_eq!(job["report"]["original_size"], 2048);
    let output = job["report"]["output_path"].as_str().unwrap().to_string();
    assert!(std::path::Path::new(&output).exists());

    let (status, body) = app
        .call(Method::POST, &format!("/api/jobs/{}/delivered", job_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert!(!std::path::Path::new(&output).exists());

    let (_, usage) = app.call(Method::GET, "/api/users/alice/usage", None).await;
    assert_eq!(usage["usage"]["hourly"], 1);
    assert_eq!(usage["limit_per_hour"], 10);
    assert_eq!(usage["stats"]["files_processed"], 1);
}

#[tokio::test]
async fn test_invalid_submission_is_bad_request() {
    let app = copy_app();
    let mut upload = app.upload("empty.mp3", 16);
    upload["size"] = json!(0);

    let (status, body) = app.call(Method::POST, "/api/jobs", Some(upload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("empty"));

    let (_, usage) = app.call(Method::GET, "/api/users/alice/usage", None).await;
    assert_eq!(usage["usage"]["hourly"], 0);
}

#[tokio::test]
async fn test_quota_rejection_sets_retry_after() {
    let dir = TempDir::new().unwrap();
    let config = WorkerConfig {
        max_files_per_hour: 1,
        ..worker_config(&dir)
    };
    let app = build(config, ApiConfig::default(), Arc::new(CopyTranscoder::new()), dir);

    let first = app.upload("a.wav", 64);
    let (status, _) = app.call(Method::POST, "/api/jobs", Some(first)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let second = app.upload("b.wav", 64);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(second.to_string()))
        .unwrap();
    let (status, headers, body) = app.send(request).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 3600);
    assert_eq!(body["retry_after_secs"], retry_after);
}

#[tokio::test]
async fn test_cancel_queued_job_only() {
    let dir = TempDir::new().unwrap();
    let config = worker_config(&dir);
    let app = build(config, ApiConfig::default(), Arc::new(HoldTranscoder), dir);

    let (_, running) = app
        .call(Method::POST, "/api/jobs", Some(app.upload("first.mp4", 128)))
        .await;
    let running_id = running["job_id"].as_str().unwrap().to_string();
    app.wait_for_status(&running_id, "running").await;

    let second = app.upload("second.mp4", 128);
    let (status, queued) = app.call(Method::POST, "/api/jobs", Some(second)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(queued["status"], "queued");
    assert_eq!(queued["queue_position"], 1);
    let queued_id = queued["job_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/jobs/{}", queued_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert!(!app.dir.path().join("uploads").join("second.mp4").exists());

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/jobs/{}", running_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.call(Method::DELETE, "/api/jobs/no-such-job", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, usage) = app.call(Method::GET, "/api/users/alice/usage", None).await;
    assert_eq!(usage["usage"]["hourly"], 1);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = copy_app();
    let (status, body) = app.call(Method::GET, "/api/jobs/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("missing"));

    let (status, _) = app
        .call(Method::POST, "/api/jobs/missing/delivered", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let dir = TempDir::new().unwrap();
    let config = worker_config(&dir);
    let api = ApiConfig {
        rate_limit_rps: 1,
        ..Default::default()
    };
    let app = build(config, api, Arc::new(CopyTranscoder::new()), dir);

    let request = |ip: &str| {
        Request::builder()
            .uri("/api/jobs/anything")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, _) = app.send(request("198.51.100.1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, headers, _) = app.send(request("198.51.100.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "1");
    let (status, _, _) = app.send(request("198.51.100.2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

const ADMIN_TOKEN: &str = "ops-token-7f3a";

fn admin_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = worker_config(&dir);
    let api = ApiConfig {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        ..Default::default()
    };
    build(config, api, Arc::new(CopyTranscoder::new()), dir)
}

#[tokio::test]
async fn test_admin_stats_and_cleanup() {
    let app = admin_app();
    let (_, body) = app
        .call(Method::POST, "/api/jobs", Some(app.upload("clip.wav", 512)))
        .await;
    let job_id = body["job_id"].as_str().unwrap().to_string();
    let job = app.wait_for_status(&job_id, "succeeded").await;
    let output = job["report"]["output_path"].as_str().unwrap().to_string();

    let (status, stats) = app
        .call_as(Some(ADMIN_TOKEN), Method::GET, "/admin/stats", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["submitted"], 1);
    assert_eq!(stats["succeeded"], 1);
    assert_eq!(stats["bytes_in"], 512);
    assert_eq!(stats["users"]["alice"]["files_processed"], 1);
    assert_eq!(stats["load"]["queued"], 0);

    // Recently finished outputs are kept until they age out.
    let (status, body) = app
        .call_as(Some(ADMIN_TOKEN), Method::POST, "/admin/cleanup", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);
    assert!(std::path::Path::new(&output).exists());

    assert_eq!(app.scheduler.sweep(Duration::ZERO), 1);
    assert!(!std::path::Path::new(&output).exists());
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let dir = TempDir::new().unwrap();
    let scheduler = Arc::new(Scheduler::start(worker_config(&dir), Arc::new(CopyTranscoder::new())).unwrap());
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let router = create_router(AppState::new(ApiConfig::default(), scheduler), Some(handle));

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let app = copy_app();
    let (status, _) = app.call(Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = admin_app();
    let output = app.dir.path().join("work").join("kept.mp3");
    std::fs::write(&output, b"out").unwrap();

    let (status, _) = app.call(Method::GET, "/admin/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .call_as(Some("guess"), Method::POST, "/admin/cleanup", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/cleanup")
        .header(header::AUTHORIZATION, ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call_as(Some(ADMIN_TOKEN), Method::GET, "/admin/stats", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(output.exists());
}

#[tokio::test]
async fn test_admin_routes_closed_without_configured_token() {
    let app = copy_app();
    let (status, body) = app
        .call_as(Some("anything"), Method::POST, "/admin/cleanup", None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["detail"].as_str().unwrap().contains("disabled"));

    let (status, _) = app.call(Method::GET, "/admin/stats", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submission_outside_upload_dir_is_bad_request() {
    let app = copy_app();
    let outside = TempDir::new().unwrap();
    let keep = outside.path().join("keep.wav");
    std::fs::write(&keep, vec![1u8; 64]).unwrap();

    let body = json!({
        "user_id": "alice",
        "path": keep,
        "kind": "audio",
        "size": 64,
    });
    let (status, body) = app.call(Method::POST, "/api/jobs", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("upload directory"));

    let folder = json!({
        "user_id": "alice",
        "path": app.dir.path().join("uploads"),
        "kind": "audio",
        "size": 64,
    });
    let (status, _) = app.call(Method::POST, "/api/jobs", Some(folder)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.scheduler.sweep(Duration::ZERO);
    assert!(keep.exists());
}

#[tokio::test]
async fn test_request_id_is_set_or_echoed() {
    let app = copy_app();

    let (_, headers, _) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    let generated = headers["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "client-chosen-1")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = app.send(request).await;
    assert_eq!(headers["x-request-id"], "client-chosen-1");
}
