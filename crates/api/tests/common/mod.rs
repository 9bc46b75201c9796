#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use atelier_adapters::testing::FakeLoader;
use atelier_broker::{ChannelQueue, JobBroker, MemoryStatusStore};
use atelier_core::model::{AdapterKind, ModelCatalog, ModelConfig};
use atelier_events::EventBus;
use atelier_pipeline::{ExecutorConfig, JobExecutor, ModelCache};
use atelier_storage::{MemoryStorage, StorageGateway};
use atelier_worker::{Worker, WorkerConfig};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and the two catalog models of [`test_catalog`] as per-kind defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        catalog_path: None,
        default_text_to_image_model: "sd".to_string(),
        default_image_to_3d_model: "hunyuan".to_string(),
        queue_capacity: 64,
        retention_hours: 24,
    }
}

pub fn test_catalog() -> ModelCatalog {
    ModelCatalog::new([
        ModelConfig::new("sd", "org/sd", AdapterKind::Diffusion),
        ModelConfig::new("hunyuan", "org/hunyuan", AdapterKind::Mesh),
    ])
    .unwrap()
}

/// Application wired over in-memory backends and fake adapters.
///
/// Holds the worker's cancellation token; dropping the app stops the worker.
pub struct TestApp {
    pub router: Router,
    pub broker: JobBroker,
    pub storage: Arc<MemoryStorage>,
    pub loader: Arc<FakeLoader>,
    cancel: CancellationToken,
    _scratch: tempfile::TempDir,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the full application router with all middleware layers.
///
/// With `with_worker` the app also runs a worker, so submitted jobs reach a
/// terminal status; without one they stay PENDING.
pub fn build_test_app(with_worker: bool) -> TestApp {
    let config = test_config();
    let loader = Arc::new(FakeLoader::new());
    let cache = Arc::new(ModelCache::new(
        Arc::new(test_catalog()),
        FakeLoader::registry(&loader),
    ));
    let storage = Arc::new(MemoryStorage::new());
    let scratch = tempfile::tempdir().unwrap();

    let event_bus = Arc::new(EventBus::default());
    let broker = JobBroker::new(
        Arc::new(MemoryStatusStore::new()),
        Arc::new(ChannelQueue::new(config.queue_capacity)),
        Arc::clone(&event_bus),
    );

    let cancel = CancellationToken::new();
    if with_worker {
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&cache),
            Arc::clone(&storage) as Arc<dyn StorageGateway>,
            ExecutorConfig {
                scratch_root: scratch.path().to_path_buf(),
                job_timeout: Duration::from_secs(30),
            },
        ));
        let worker = Worker::new(
            broker.worker_channel(),
            executor,
            WorkerConfig { concurrency: 2 },
        );
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await });
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        broker: broker.clone(),
        cache,
        event_bus,
    };

    TestApp {
        router: build_app_router(state, &config),
        broker,
        storage,
        loader,
        cancel,
        _scratch: scratch,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Submit a job and return its id, asserting 201.
pub async fn submit(app: &TestApp, body: serde_json::Value) -> String {
    let response = post_json(app.router.clone(), "/api/v1/jobs", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["job_id"].as_str().unwrap().to_string()
}

/// Poll `GET /jobs/{id}` until the job is SUCCESS or FAILURE.
pub async fn wait_terminal(app: &TestApp, job_id: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = get(app.router.clone(), &format!("/api/v1/jobs/{job_id}")).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            let status = json["data"]["status"].as_str().unwrap().to_string();
            if status == "SUCCESS" || status == "FAILURE" {
                return json["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}
