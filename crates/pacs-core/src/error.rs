//! 错误定义模块

use thiserror::Error;

/// PACS系统统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("检查间隔无效: {requested}ms 低于最小值 {minimum}ms")]
    InvalidInterval { requested: u64, minimum: u64 },

    #[error("影像归档查询错误: {0}")]
    Archive(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl PacsError {
    /// 是否为配置类错误（调用方输入导致，不应重试）
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidInterval { .. })
    }
}

/// PACS系统统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
