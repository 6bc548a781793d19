//! # PACS集成模块
//!
//! 为检查到达监控器提供外部协作方的具体实现，包括：
//! - Orthanc影像归档连接器，实现归档查询端口
//! - 事件接收端：实时广播、日志、扇出
//! - Webhook新检查回调，向外部系统推送检查摘要
//! - 监控管理REST API与WebSocket实时事件流

pub mod api;
pub mod orthanc;
pub mod sink;
pub mod webhook;

pub use api::{create_api_routes, ApiServer, ApiState};
pub use orthanc::{OrthancArchive, OrthancConfig};
pub use sink::{BroadcastSink, EventEnvelope, FanoutSink, LogSink};
pub use webhook::{WebhookCallback, WebhookConfig};
