//! 监控器依赖的外部协作方接口

use async_trait::async_trait;
use pacs_core::{NotificationEvent, Result, StudySummary};

/// 影像归档查询端口
///
/// 每次调用返回归档中当前全部检查的完整快照，分页由实现方负责。
#[async_trait]
pub trait ArchiveQuery: Send + Sync {
    /// 列出当前所有检查
    async fn list_studies(&self) -> Result<Vec<StudySummary>>;
}

/// 事件接收端（实时广播、日志等）
///
/// 发送即遗忘：实现方自行处理投递失败，不得向监控器返回错误。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &NotificationEvent);
}

/// 新检查到达时的应用回调
#[async_trait]
pub trait StudyCallback: Send + Sync {
    async fn on_new_study(&self, study: &StudySummary) -> anyhow::Result<()>;
}
