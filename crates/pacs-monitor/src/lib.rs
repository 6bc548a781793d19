//! # PACS检查到达监控模块
//!
//! 后台轮询影像归档（PACS），通过与已知集合比对发现新到达的检查，
//! 并向订阅者分发通知：
//! - 已知集合：记录已处理过的检查标识，保证同一检查不会被重复通知
//! - 检测周期：查询归档、比对、更新已知集合、分发通知
//! - 生命周期：启动（建立基线）、停止、调整检查间隔、手动检查
//! - 注册表：由组合根显式持有的监控实例注册表

pub mod known_set;
pub mod metrics;
pub mod monitor;
pub mod ports;
pub mod registry;

// 重新导出主要类型
pub use known_set::KnownSet;
pub use metrics::MonitorMetrics;
pub use monitor::{
    StudyMonitor, StudyMonitorBuilder, DEFAULT_CHECK_INTERVAL_MS, MIN_CHECK_INTERVAL_MS,
};
pub use ports::{ArchiveQuery, EventSink, StudyCallback};
pub use registry::{create_monitor, get_monitor, MonitorRegistry};
