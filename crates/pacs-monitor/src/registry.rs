//! 监控实例注册表
//!
//! 由进程的组合根显式持有并传递，取代模块级的单例。

use pacs_core::Result;
use tracing::debug;

use crate::monitor::{StudyMonitor, StudyMonitorBuilder};

/// 监控实例注册表
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitor: Option<StudyMonitor>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 创建监控实例；已注册时直接返回已有实例，构建器被丢弃
pub fn create_monitor(
    registry: &mut MonitorRegistry,
    builder: StudyMonitorBuilder,
) -> Result<StudyMonitor> {
    if let Some(existing) = &registry.monitor {
        debug!("Study monitor already registered, reusing existing instance");
        return Ok(existing.clone());
    }

    let monitor = builder.build()?;
    registry.monitor = Some(monitor.clone());
    Ok(monitor)
}

/// 查找已注册的监控实例
pub fn get_monitor(registry: &MonitorRegistry) -> Option<StudyMonitor> {
    registry.monitor.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ArchiveQuery;
    use async_trait::async_trait;
    use pacs_core::StudySummary;
    use std::sync::Arc;

    struct EmptyArchive;

    #[async_trait]
    impl ArchiveQuery for EmptyArchive {
        async fn list_studies(&self) -> Result<Vec<StudySummary>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_lookup_before_create() {
        let registry = MonitorRegistry::new();
        assert!(get_monitor(&registry).is_none());
    }

    #[test]
    fn test_create_returns_existing_instance() {
        let mut registry = MonitorRegistry::new();

        let first = create_monitor(
            &mut registry,
            StudyMonitor::builder(Arc::new(EmptyArchive)).with_check_interval(2_000),
        )
        .unwrap();
        let second = create_monitor(
            &mut registry,
            StudyMonitor::builder(Arc::new(EmptyArchive)).with_check_interval(5_000),
        )
        .unwrap();

        assert_eq!(first.check_interval_ms(), 2_000);
        assert_eq!(second.check_interval_ms(), 2_000);
        assert!(get_monitor(&registry).is_some());
    }

    #[test]
    fn test_failed_build_registers_nothing() {
        let mut registry = MonitorRegistry::new();

        let result = create_monitor(
            &mut registry,
            StudyMonitor::builder(Arc::new(EmptyArchive)).with_check_interval(10),
        );

        assert!(result.is_err());
        assert!(get_monitor(&registry).is_none());
    }
}
