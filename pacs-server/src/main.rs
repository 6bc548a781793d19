//! 检查到达监控服务主程序

mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pacs_integration::{
    ApiServer, ApiState, BroadcastSink, FanoutSink, LogSink, OrthancArchive, WebhookCallback,
};
use pacs_monitor::{create_monitor, get_monitor, MonitorRegistry, StudyMonitor};
use tracing::{error, info, warn};

use crate::settings::ServerConfig;

/// 服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "pacs-server")]
#[command(about = "DICOM检查到达监控服务：轮询PACS并实时推送新检查通知")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Orthanc REST接口地址
    #[arg(short, long)]
    archive_url: Option<String>,

    /// 检查间隔（毫秒）
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// 管理API监听地址
    #[arg(short, long)]
    bind: Option<String>,
}

impl Args {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(url) = &self.archive_url {
            config.archive.url = url.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.monitor.check_interval_ms = interval_ms;
        }
        if let Some(bind) = &self.bind {
            config.api.bind = bind.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动DICOM检查到达监控服务...");

    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!("服务配置:");
    info!("  归档地址: {}", config.archive.url);
    info!("  检查间隔: {}ms", config.monitor.check_interval_ms);
    info!("  API地址: {}", config.api.bind);

    let archive = Arc::new(OrthancArchive::new(config.archive.clone())?);
    let broadcaster = BroadcastSink::new(config.monitor.event_buffer);
    let sink = FanoutSink::new()
        .with(Arc::new(LogSink))
        .with(Arc::new(broadcaster.clone()));

    let mut builder = StudyMonitor::builder(archive)
        .with_sink(Arc::new(sink))
        .with_check_interval(config.monitor.check_interval_ms);
    if let Some(webhook) = &config.webhook {
        info!("  新检查Webhook: {}", webhook.url);
        builder = builder.with_callback(Arc::new(WebhookCallback::new(webhook.clone())?));
    }

    let mut registry = MonitorRegistry::new();
    let monitor = create_monitor(&mut registry, builder).context("Failed to create study monitor")?;

    if config.monitor.auto_start {
        // 基线失败不退出进程，运维人员可通过API重试启动
        if let Err(e) = monitor.start().await {
            error!("DICOM监控启动失败: {}", e);
            warn!("Retry with POST /monitor/start once the archive is reachable");
        }
    }

    let server = ApiServer::new(ApiState::new(monitor, broadcaster));
    server.run(&config.api.bind, shutdown_signal()).await?;

    if let Some(monitor) = get_monitor(&registry) {
        monitor.stop().await;
    }

    info!("DICOM检查到达监控服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号");
}
