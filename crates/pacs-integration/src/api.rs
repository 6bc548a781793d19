//! 监控管理API模块
//!
//! 为运维人员提供监控器的启停、间隔调整、手动检查和状态查询接口，
//! 并通过WebSocket推送实时事件。

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use pacs_core::{MonitorStatus, PacsError};
use pacs_monitor::StudyMonitor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::sink::{BroadcastSink, EventEnvelope};

/// API状态
#[derive(Clone)]
pub struct ApiState {
    pub monitor: StudyMonitor,
    pub broadcaster: BroadcastSink,
}

impl ApiState {
    pub fn new(monitor: StudyMonitor, broadcaster: BroadcastSink) -> Self {
        Self {
            monitor,
            broadcaster,
        }
    }
}

/// 调整检查间隔请求
#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    #[serde(rename = "intervalMs")]
    pub interval_ms: u64,
}

/// 手动检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(rename = "newStudies")]
    pub new_studies: usize,
}

/// 已知检查列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct KnownStudiesResponse {
    pub studies: Vec<String>,
}

/// API错误
pub struct ApiError(PacsError);

impl From<PacsError> for ApiError {
    fn from(err: PacsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_config_error() => StatusCode::BAD_REQUEST,
            PacsError::Archive(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = HashMap::new();
        body.insert("error", self.0.to_string());
        (status, Json(body)).into_response()
    }
}

/// API处理器
pub struct ApiHandler;

impl ApiHandler {
    /// 健康检查
    pub async fn health_check() -> Json<HashMap<String, String>> {
        let mut status = HashMap::new();
        status.insert("status".to_string(), "healthy".to_string());
        status.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());
        status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        Json(status)
    }

    pub async fn start(State(state): State<ApiState>) -> Result<Json<MonitorStatus>, ApiError> {
        state.monitor.start().await?;
        Ok(Json(state.monitor.get_status().await))
    }

    pub async fn stop(State(state): State<ApiState>) -> Json<MonitorStatus> {
        state.monitor.stop().await;
        Json(state.monitor.get_status().await)
    }

    pub async fn set_interval(
        State(state): State<ApiState>,
        Json(request): Json<IntervalRequest>,
    ) -> Result<Json<MonitorStatus>, ApiError> {
        info!("Updating DICOM monitor interval to {}ms", request.interval_ms);
        state.monitor.set_interval(request.interval_ms).await?;
        Ok(Json(state.monitor.get_status().await))
    }

    pub async fn check_now(State(state): State<ApiState>) -> Json<CheckResponse> {
        let new_studies = state.monitor.check_now().await;
        Json(CheckResponse { new_studies })
    }

    pub async fn status(State(state): State<ApiState>) -> Json<MonitorStatus> {
        Json(state.monitor.get_status().await)
    }

    pub async fn known_studies(State(state): State<ApiState>) -> Json<KnownStudiesResponse> {
        Json(KnownStudiesResponse {
            studies: state.monitor.get_known_studies().await,
        })
    }

    pub async fn reset_known_studies(State(state): State<ApiState>) -> StatusCode {
        state.monitor.reset_known_studies().await;
        StatusCode::NO_CONTENT
    }

    /// Prometheus指标
    pub async fn metrics(State(state): State<ApiState>) -> Response {
        match state.monitor.metrics().render() {
            Ok(text) => (
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                text,
            )
                .into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    }

    /// 实时事件流
    pub async fn events(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
        let receiver = state.broadcaster.subscribe();
        ws.on_upgrade(move |socket| forward_events(socket, receiver))
    }
}

/// 将广播事件转发给单个WebSocket客户端，直到任一方关闭
async fn forward_events(mut socket: WebSocket, mut receiver: broadcast::Receiver<EventEnvelope>) {
    info!("WebSocket client connected");

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(envelope) => {
                    let text = match serde_json::to_string(&envelope) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize event {}: {}", envelope.id, e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(other)) => debug!("Ignoring WebSocket client message: {:?}", other),
            },
        }
    }

    info!("WebSocket client disconnected");
}

async fn log_requests(request: Request, next: Next) -> Response {
    info!("API request: {} {}", request.method(), request.uri());
    let response = next.run(request).await;
    info!("API response: {}", response.status());
    response
}

/// 创建API路由
pub fn create_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(ApiHandler::health_check))
        .route("/metrics", get(ApiHandler::metrics))
        .route("/ws", get(ApiHandler::events))
        .route("/monitor/start", post(ApiHandler::start))
        .route("/monitor/stop", post(ApiHandler::stop))
        .route("/monitor/interval", put(ApiHandler::set_interval))
        .route("/monitor/check", post(ApiHandler::check_now))
        .route("/monitor/status", get(ApiHandler::status))
        .route(
            "/monitor/studies",
            get(ApiHandler::known_studies).delete(ApiHandler::reset_known_studies),
        )
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

/// API服务器
pub struct ApiServer {
    app: Router,
}

impl ApiServer {
    pub fn new(state: ApiState) -> Self {
        let app = create_api_routes(state).layer(tower_http::cors::CorsLayer::permissive());
        Self { app }
    }

    /// 运行直到关闭信号触发
    pub async fn run(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        info!("Starting API server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use pacs_core::{Result, StudySummary};
    use pacs_monitor::ArchiveQuery;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemoryArchive {
        ids: Mutex<Vec<&'static str>>,
        failing: Mutex<bool>,
    }

    #[async_trait]
    impl ArchiveQuery for MemoryArchive {
        async fn list_studies(&self) -> Result<Vec<StudySummary>> {
            if *self.failing.lock().unwrap() {
                return Err(PacsError::Archive("connection refused".to_string()));
            }
            Ok(self.ids.lock().unwrap().iter().map(|id| StudySummary::new(*id)).collect())
        }
    }

    fn app_with(archive: Arc<MemoryArchive>) -> (Router, StudyMonitor) {
        let broadcaster = BroadcastSink::new(16);
        let monitor = StudyMonitor::builder(archive)
            .with_sink(Arc::new(broadcaster.clone()))
            .with_check_interval(60_000)
            .build()
            .unwrap();
        let app = create_api_routes(ApiState::new(monitor.clone(), broadcaster));
        (app, monitor)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with(Arc::new(MemoryArchive::default()));

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));
    }

    #[tokio::test]
    async fn test_start_check_and_list() {
        let archive = Arc::new(MemoryArchive::default());
        *archive.ids.lock().unwrap() = vec!["A"];
        let (app, monitor) = app_with(archive.clone());

        let (status, body) = send(&app, "POST", "/monitor/start", None).await;
        assert_eq!(status, StatusCode::OK);
        let started: MonitorStatus = serde_json::from_str(&body).unwrap();
        assert!(started.monitoring);
        assert_eq!(started.known_studies_count, 1);

        *archive.ids.lock().unwrap() = vec!["A", "B"];
        let (_, body) = send(&app, "POST", "/monitor/check", None).await;
        let check: CheckResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(check.new_studies, 1);

        let (_, body) = send(&app, "GET", "/monitor/studies", None).await;
        let known: KnownStudiesResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(known.studies, vec!["A", "B"]);

        let (status, _) = send(&app, "POST", "/monitor/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_rejects_short_interval() {
        let (app, monitor) = app_with(Arc::new(MemoryArchive::default()));

        let (status, body) =
            send(&app, "PUT", "/monitor/interval", Some(r#"{"intervalMs": 500}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("error"));
        assert_eq!(monitor.check_interval_ms(), 60_000);

        let (status, body) =
            send(&app, "PUT", "/monitor/interval", Some(r#"{"intervalMs": 2000}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let updated: MonitorStatus = serde_json::from_str(&body).unwrap();
        assert_eq!(updated.check_interval, 2_000);
    }

    #[tokio::test]
    async fn test_baseline_failure_is_bad_gateway() {
        let archive = Arc::new(MemoryArchive::default());
        *archive.failing.lock().unwrap() = true;
        let (app, monitor) = app_with(archive);

        let (status, _) = send(&app, "POST", "/monitor/start", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_failed_interval_restart_is_bad_gateway() {
        let archive = Arc::new(MemoryArchive::default());
        *archive.ids.lock().unwrap() = vec!["A"];
        let (app, monitor) = app_with(archive.clone());

        let (status, _) = send(&app, "POST", "/monitor/start", None).await;
        assert_eq!(status, StatusCode::OK);

        *archive.failing.lock().unwrap() = true;
        let (status, body) =
            send(&app, "PUT", "/monitor/interval", Some(r#"{"intervalMs": 5000}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("error"));

        assert!(!monitor.is_running());
        assert_eq!(monitor.check_interval_ms(), 5_000);
        assert_eq!(monitor.get_known_studies().await, vec!["A"]);
    }

    #[tokio::test]
    async fn test_reset_known_studies() {
        let archive = Arc::new(MemoryArchive::default());
        *archive.ids.lock().unwrap() = vec!["A", "B"];
        let (app, monitor) = app_with(archive);

        monitor.check_now().await;
        let (status, _) = send(&app, "DELETE", "/monitor/studies", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, "GET", "/monitor/status", None).await;
        let status: MonitorStatus = serde_json::from_str(&body).unwrap();
        assert_eq!(status.known_studies_count, 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let archive = Arc::new(MemoryArchive::default());
        *archive.ids.lock().unwrap() = vec!["A"];
        let (app, monitor) = app_with(archive);

        monitor.check_now().await;
        let (status, body) = send(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("study_monitor_new_studies_total 1"));
    }
}
