//! 事件接收端实现
//!
//! - 广播接收端：通过tokio广播通道推送给实时客户端（WebSocket）
//! - 日志接收端：写入tracing日志
//! - 扇出接收端：按顺序转发给多个接收端

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pacs_core::{NotificationEvent, NotificationLevel};
use pacs_monitor::EventSink;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 推送给实时客户端的事件封装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: NotificationEvent,
}

impl EventEnvelope {
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// 实时广播接收端
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &NotificationEvent) {
        match self.sender.send(EventEnvelope::new(event.clone())) {
            Ok(sent) => info!("Broadcasted {} to {} clients", event.kind(), sent),
            Err(_) => debug!("No clients connected, dropped {}", event.kind()),
        }
    }
}

/// 日志接收端
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &NotificationEvent) {
        match event {
            NotificationEvent::StudyArrival(arrival) => info!(
                study_uid = %arrival.study_instance_uid,
                patient_id = %arrival.patient_id,
                modality = arrival.modality.as_deref().unwrap_or("-"),
                "New DICOM study arrived for {}",
                arrival.patient_name
            ),
            NotificationEvent::SystemNotification(notification) => match notification.level {
                NotificationLevel::Info => info!("System notification: {}", notification.message),
                NotificationLevel::Warning => warn!("System notification: {}", notification.message),
                NotificationLevel::Error => error!("System notification: {}", notification.message),
            },
            NotificationEvent::MonitoringError(err) => error!(
                operation = %err.operation,
                monitoring_active = err.details.monitoring_active,
                "{}",
                err.error
            ),
        }
    }
}

/// 扇出接收端
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &NotificationEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
