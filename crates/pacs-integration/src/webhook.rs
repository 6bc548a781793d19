//! Webhook新检查回调
//!
//! 将新到达的检查摘要推送给外部系统（例如检查登记服务），支持：
//! - SHA-256签名头，便于接收方校验来源
//! - 非成功状态码视为失败，由监控器记录并隔离

use anyhow::{Context, Result};
use async_trait::async_trait;
use pacs_core::StudySummary;
use pacs_monitor::StudyCallback;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// 事件类型请求头的取值
pub const STUDY_ARRIVED_EVENT: &str = "study.arrived";

/// Webhook配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl WebhookConfig {
    /// 生成签名
    pub fn generate_signature(&self, payload: &str) -> Option<String> {
        use sha2::{Digest, Sha256};

        self.secret.as_ref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(payload);
            hasher.update(secret);
            format!("sha256={:x}", hasher.finalize())
        })
    }
}

/// 通过Webhook通知新检查
pub struct WebhookCallback {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookCallback {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl StudyCallback for WebhookCallback {
    async fn on_new_study(&self, study: &StudySummary) -> Result<()> {
        let payload = serde_json::to_string(study).context("Failed to serialize study")?;

        let mut request = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "PACS-Webhook/1.0")
            .header("X-PACS-Event", STUDY_ARRIVED_EVENT);

        if let Some(signature) = self.config.generate_signature(&payload) {
            request = request.header("X-PACS-Signature", signature);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .with_context(|| format!("Failed to send webhook to {}", self.config.url))?;

        let status = response.status();
        if !status.is_success() {
            error!("Webhook failed with status {}: {}", status, self.config.url);
            anyhow::bail!("Webhook failed with status: {}", status);
        }

        info!(
            "Sent study {} to webhook: {}",
            study.study_instance_uid, self.config.url
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    fn config(url: String, secret: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            url,
            secret: secret.map(str::to_string),
            timeout_secs: 5,
        }
    }

    async fn spawn_receiver(status: StatusCode, seen: Arc<Mutex<Vec<(HeaderMap, String)>>>) -> String {
        let app = Router::new().route(
            "/hook",
            post(move |headers: HeaderMap, body: String| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push((headers, body));
                    status
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/hook", addr)
    }

    #[test]
    fn test_signature() {
        let signed = config("https://example.com/webhook".to_string(), Some("test-secret"));
        let signature = signed.generate_signature(r#"{"test": "data"}"#);
        assert!(signature.unwrap().starts_with("sha256="));

        let unsigned = config("https://example.com/webhook".to_string(), None);
        assert!(unsigned.generate_signature("{}").is_none());
    }

    #[tokio::test]
    async fn test_posts_signed_study() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_receiver(StatusCode::OK, seen.clone()).await;
        let callback = WebhookCallback::new(config(url, Some("s3cret"))).unwrap();

        let study = StudySummary::new("1.2.3").with_patient("DOE^JOHN", "P001");
        callback.on_new_study(&study).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (headers, body) = &seen[0];
        assert_eq!(headers["x-pacs-event"], STUDY_ARRIVED_EVENT);
        assert!(headers.contains_key("x-pacs-signature"));

        let received: StudySummary = serde_json::from_str(body).unwrap();
        assert_eq!(received, study);
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_receiver(StatusCode::SERVICE_UNAVAILABLE, seen).await;
        let callback = WebhookCallback::new(config(url, None)).unwrap();

        let result = callback.on_new_study(&StudySummary::new("1.2.3")).await;
        assert!(result.is_err());
    }
}
