//! 服务配置
//!
//! 配置来源按优先级从低到高：内置默认值、配置文件、`PACS_` 前缀的环境变量
//! （层级之间用 `__` 分隔，例如 `PACS_MONITOR__CHECK_INTERVAL_MS=5000`），
//! 最后由命令行参数覆盖。

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use pacs_integration::{OrthancConfig, WebhookConfig};
use pacs_monitor::{DEFAULT_CHECK_INTERVAL_MS, MIN_CHECK_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// 服务完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监控器配置
    pub monitor: MonitorSettings,
    /// 影像归档（Orthanc）配置
    pub archive: OrthancConfig,
    /// 管理API配置
    pub api: ApiSettings,
    /// 新检查Webhook回调
    pub webhook: Option<WebhookConfig>,
}

/// 监控器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// 检查间隔（毫秒）
    pub check_interval_ms: u64,
    /// 服务启动后是否立即开始监控
    pub auto_start: bool,
    /// 实时事件广播通道容量
    pub event_buffer: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            auto_start: true,
            event_buffer: 256,
        }
    }
}

/// 管理API配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// 监听地址
    pub bind: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
        }
    }
}

impl ServerConfig {
    /// 加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("PACS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = Self::from_builder(builder)?;
        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 在内置默认值之上叠加给定来源
    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .context("Failed to serialize default configuration")?;

        let settings = Config::builder()
            .add_source(defaults)
            .add_source(builder.build().context("Failed to read configuration sources")?)
            .build()
            .context("Failed to merge configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        ConfigValidator::new().validate(self)
    }
}

/// 验证规则
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&ServerConfig) -> Result<()>,
}

/// 配置验证器
struct ConfigValidator {
    rules: Vec<ValidationRule>,
}

impl ConfigValidator {
    fn new() -> Self {
        let rules = vec![
            ValidationRule {
                field_path: "monitor.check_interval_ms",
                validator: |config| {
                    if config.monitor.check_interval_ms < MIN_CHECK_INTERVAL_MS {
                        anyhow::bail!(
                            "Check interval must be at least {}ms",
                            MIN_CHECK_INTERVAL_MS
                        );
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "monitor.event_buffer",
                validator: |config| {
                    if config.monitor.event_buffer == 0 {
                        anyhow::bail!("Event buffer cannot be 0");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "archive.url",
                validator: |config| {
                    let url = &config.archive.url;
                    if !(url.starts_with("http://") || url.starts_with("https://")) {
                        anyhow::bail!("Archive URL must be http(s): {}", url);
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "api.bind",
                validator: |config| {
                    config
                        .api
                        .bind
                        .parse::<std::net::SocketAddr>()
                        .map(|_| ())
                        .with_context(|| format!("Invalid bind address: {}", config.api.bind))
                },
            },
            ValidationRule {
                field_path: "webhook.url",
                validator: |config| match &config.webhook {
                    Some(webhook) if webhook.url.is_empty() => {
                        anyhow::bail!("Webhook URL cannot be empty")
                    }
                    _ => Ok(()),
                },
            },
        ];

        Self { rules }
    }

    fn validate(&self, config: &ServerConfig) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("Invalid configuration: {}", rule.field_path)));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}
