//! 监控器Prometheus指标

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// 检测周期相关指标
#[derive(Debug, Clone)]
pub struct MonitorMetrics {
    /// Prometheus指标注册表
    registry: Registry,
    /// 已执行的检测周期数
    pub cycles_total: IntCounter,
    /// 归档查询失败的周期数
    pub cycle_failures_total: IntCounter,
    /// 发现的新检查总数
    pub new_studies_total: IntCounter,
    /// 应用回调失败次数
    pub callback_failures_total: IntCounter,
    /// 当前已知检查数量
    pub known_studies: IntGauge,
}

impl MonitorMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounter::with_opts(Opts::new(
            "study_monitor_cycles_total",
            "Number of detection cycles executed",
        ))?;
        let cycle_failures_total = IntCounter::with_opts(Opts::new(
            "study_monitor_cycle_failures_total",
            "Number of detection cycles aborted by an archive query failure",
        ))?;
        let new_studies_total = IntCounter::with_opts(Opts::new(
            "study_monitor_new_studies_total",
            "Number of newly arrived studies detected",
        ))?;
        let callback_failures_total = IntCounter::with_opts(Opts::new(
            "study_monitor_callback_failures_total",
            "Number of failed new-study callback invocations",
        ))?;
        let known_studies = IntGauge::with_opts(Opts::new(
            "study_monitor_known_studies",
            "Number of studies currently tracked as known",
        ))?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(cycle_failures_total.clone()))?;
        registry.register(Box::new(new_studies_total.clone()))?;
        registry.register(Box::new(callback_failures_total.clone()))?;
        registry.register(Box::new(known_studies.clone()))?;

        Ok(Self {
            registry,
            cycles_total,
            cycle_failures_total,
            new_studies_total,
            callback_failures_total,
            known_studies,
        })
    }

    /// 以Prometheus文本格式导出
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
