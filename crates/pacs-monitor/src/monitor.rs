//! 检查到达监控器
//!
//! 对外只有两个状态：`Stopped`（初始）与 `Running`。
//! 启动时先对归档做一次完整查询建立基线，之后按固定间隔执行检测周期。
//! 基线查询期间内部处于 `Starting`，不持有生命周期锁，对外仍视为 `Stopped`，
//! 此时的停止请求会直接作废这次启动。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use pacs_core::{
    MonitorStatus, MonitoringError, MonitoringErrorDetails, NotificationEvent, PacsError, Result,
    StudyArrival, StudyIdentifier, StudySummary, SystemNotification,
};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::known_set::KnownSet;
use crate::metrics::MonitorMetrics;
use crate::ports::{ArchiveQuery, EventSink, StudyCallback};

/// 最小检查间隔（毫秒）
pub const MIN_CHECK_INTERVAL_MS: u64 = 1000;

/// 默认检查间隔（毫秒）
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 10_000;

/// 校验检查间隔，低于下限直接拒绝，不做截断
fn validate_interval(interval_ms: u64) -> Result<()> {
    if interval_ms < MIN_CHECK_INTERVAL_MS {
        return Err(PacsError::InvalidInterval {
            requested: interval_ms,
            minimum: MIN_CHECK_INTERVAL_MS,
        });
    }
    Ok(())
}

/// 监控器构建器
pub struct StudyMonitorBuilder {
    archive: Arc<dyn ArchiveQuery>,
    sink: Option<Arc<dyn EventSink>>,
    callback: Option<Arc<dyn StudyCallback>>,
    check_interval_ms: u64,
}

impl StudyMonitorBuilder {
    pub fn new(archive: Arc<dyn ArchiveQuery>) -> Self {
        Self {
            archive,
            sink: None,
            callback: None,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }

    /// 设置事件接收端
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 设置新检查回调
    pub fn with_callback(mut self, callback: Arc<dyn StudyCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_check_interval(mut self, interval_ms: u64) -> Self {
        self.check_interval_ms = interval_ms;
        self
    }

    pub fn build(self) -> Result<StudyMonitor> {
        validate_interval(self.check_interval_ms)?;

        let metrics = MonitorMetrics::new()
            .map_err(|e| PacsError::Internal(format!("failed to register monitor metrics: {}", e)))?;

        Ok(StudyMonitor {
            inner: Arc::new(MonitorInner {
                archive: self.archive,
                sink: self.sink,
                callback: self.callback,
                known: RwLock::new(KnownSet::new()),
                running: AtomicBool::new(false),
                check_interval_ms: AtomicU64::new(self.check_interval_ms),
                lifecycle: Mutex::new(Lifecycle::default()),
                metrics,
            }),
        })
    }
}

/// 检查到达监控器
///
/// 克隆开销很小，所有克隆共享同一份状态。
#[derive(Clone)]
pub struct StudyMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    archive: Arc<dyn ArchiveQuery>,
    sink: Option<Arc<dyn EventSink>>,
    callback: Option<Arc<dyn StudyCallback>>,
    /// 已知检查集合，锁只在比对与插入期间持有，不跨越网络调用
    known: RwLock<KnownSet>,
    running: AtomicBool,
    check_interval_ms: AtomicU64,
    /// 生命周期状态；锁只保护状态切换，不跨越归档查询
    lifecycle: Mutex<Lifecycle>,
    metrics: MonitorMetrics,
}

enum Phase {
    Stopped,
    /// 基线查询进行中，`generation` 标识这次启动
    Starting { generation: u64 },
    /// 持有周期调度的取消令牌
    Running { schedule: CancellationToken },
}

struct Lifecycle {
    phase: Phase,
    next_generation: u64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            phase: Phase::Stopped,
            next_generation: 0,
        }
    }
}

impl Lifecycle {
    fn begin_start(&mut self) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.phase = Phase::Starting { generation };
        generation
    }

    /// 该次启动是否仍然有效（未被停止或更新的启动取代）
    fn is_pending(&self, generation: u64) -> bool {
        matches!(self.phase, Phase::Starting { generation: current } if current == generation)
    }
}

impl std::fmt::Debug for StudyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyMonitor")
            .field("running", &self.is_running())
            .field("check_interval_ms", &self.check_interval_ms())
            .field("has_sink", &self.inner.sink.is_some())
            .field("has_callback", &self.inner.callback.is_some())
            .finish()
    }
}

impl StudyMonitor {
    pub fn builder(archive: Arc<dyn ArchiveQuery>) -> StudyMonitorBuilder {
        StudyMonitorBuilder::new(archive)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn check_interval_ms(&self) -> u64 {
        self.inner.check_interval_ms.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.inner.metrics
    }

    /// 启动监控
    ///
    /// 已在运行或正在启动时为空操作。基线查询失败时返回该错误，状态保持 `Stopped`。
    /// 启动过程中被 `stop` 作废时返回 `Ok`，监控器保持停止。
    pub async fn start(&self) -> Result<()> {
        let generation = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            match &lifecycle.phase {
                Phase::Running { .. } => {
                    info!("DICOM monitor already running");
                    return Ok(());
                }
                Phase::Starting { .. } => {
                    info!("DICOM monitor start already in progress");
                    return Ok(());
                }
                Phase::Stopped => {}
            }
            lifecycle.begin_start()
        };
        self.complete_start(generation).await
    }

    /// 停止监控
    ///
    /// 正在执行的检测周期允许跑完，但不会再触发下一次。
    /// 不等待进行中的基线查询。
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle);
    }

    /// 调整检查间隔
    ///
    /// 运行中调整等价于先停止再启动（重新建立基线）。
    /// 启动过程中调整只更新间隔，由进行中的启动采用。
    pub async fn set_interval(&self, interval_ms: u64) -> Result<()> {
        validate_interval(interval_ms)?;

        let generation = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            self.inner.check_interval_ms.store(interval_ms, Ordering::SeqCst);
            info!("DICOM monitor check interval set to {}ms", interval_ms);

            if !matches!(lifecycle.phase, Phase::Running { .. }) {
                return Ok(());
            }
            self.stop_locked(&mut lifecycle);
            lifecycle.begin_start()
        };
        self.complete_start(generation).await
    }

    /// 立即执行一次检测周期，返回本次发现的新检查数量
    ///
    /// 不改变运行状态和调度。归档查询失败以错误事件上报，返回0。
    pub async fn check_now(&self) -> usize {
        self.inner.run_cycle().await
    }

    /// 获取监控状态
    pub async fn get_status(&self) -> MonitorStatus {
        let known_studies_count = self.inner.known.read().await.len();
        MonitorStatus {
            monitoring: self.is_running(),
            known_studies_count,
            check_interval: self.check_interval_ms(),
            last_check: Utc::now(),
        }
    }

    /// 获取所有已知检查标识
    pub async fn get_known_studies(&self) -> Vec<StudyIdentifier> {
        self.inner.known.read().await.identifiers()
    }

    /// 清空已知集合，下一次检测会把归档中的所有检查视为新到达
    pub async fn reset_known_studies(&self) {
        let mut known = self.inner.known.write().await;
        known.clear();
        self.inner.metrics.known_studies.set(0);
        info!("Reset known studies list");
    }

    /// 在不持有生命周期锁的情况下查询基线，完成后仅当该次启动仍有效时才安装
    async fn complete_start(&self, generation: u64) -> Result<()> {
        info!("Starting DICOM study monitor...");

        let baseline = self.inner.archive.list_studies().await;

        let mut lifecycle = self.inner.lifecycle.lock().await;
        if !lifecycle.is_pending(generation) {
            info!("DICOM monitor start was cancelled before the baseline completed");
            return Ok(());
        }

        let baseline = match baseline {
            Ok(studies) => studies,
            Err(e) => {
                lifecycle.phase = Phase::Stopped;
                error!("Failed to start DICOM monitor: {}", e);
                return Err(e);
            }
        };

        // 基线在临时集合中建立，查询成功后再整体替换
        let known = KnownSet::from_studies(&baseline);
        let known_count = known.len();
        {
            let mut current = self.inner.known.write().await;
            *current = known;
            self.inner.metrics.known_studies.set(known_count as i64);
        }
        info!("Initialized DICOM monitor with {} known studies", known_count);

        let interval_ms = self.check_interval_ms();
        self.inner.running.store(true, Ordering::SeqCst);
        lifecycle.phase = Phase::Running {
            schedule: spawn_schedule(Arc::downgrade(&self.inner), interval_ms),
        };

        info!(
            "DICOM monitor started, checking every {} seconds",
            interval_ms as f64 / 1000.0
        );
        self.inner.emit(NotificationEvent::SystemNotification(SystemNotification::info(
            "DICOM monitoring service started",
        )));
        Ok(())
    }

    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        match std::mem::replace(&mut lifecycle.phase, Phase::Stopped) {
            Phase::Stopped => return,
            Phase::Starting { .. } => {
                info!("Cancelled pending DICOM monitor start");
                return;
            }
            Phase::Running { schedule } => {
                info!("Stopping DICOM study monitor...");
                schedule.cancel();
            }
        }

        self.inner.running.store(false, Ordering::SeqCst);

        self.inner.emit(NotificationEvent::SystemNotification(SystemNotification::info(
            "DICOM monitoring service stopped",
        )));
    }
}

/// 启动周期调度任务
///
/// 任务只持有弱引用，监控器被释放后自动退出。
fn spawn_schedule(inner: Weak<MonitorInner>, interval_ms: u64) -> CancellationToken {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    tokio::spawn(async move {
        let period = Duration::from_millis(interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.run_cycle().await;
        }

        debug!("DICOM monitor schedule exited");
    });

    token
}

impl MonitorInner {
    fn emit(&self, event: NotificationEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(&event);
        }
    }

    /// 检测周期：查询、比对、更新已知集合、分发通知
    async fn run_cycle(&self) -> usize {
        self.metrics.cycles_total.inc();

        let studies = match self.archive.list_studies().await {
            Ok(studies) => studies,
            Err(e) => {
                self.report_cycle_failure(&e).await;
                return 0;
            }
        };

        // 先插入再通知：通知失败也不会导致下一周期重复通知
        let new_studies = {
            let mut known = self.known.write().await;
            let fresh = known.absorb(studies);
            self.metrics.known_studies.set(known.len() as i64);
            fresh
        };

        if new_studies.is_empty() {
            debug!("No new DICOM studies detected");
            return 0;
        }

        info!("Detected {} new DICOM studies", new_studies.len());
        self.metrics.new_studies_total.inc_by(new_studies.len() as u64);

        for study in &new_studies {
            self.process_new_study(study).await;
        }

        new_studies.len()
    }

    async fn report_cycle_failure(&self, err: &PacsError) {
        error!("Error during DICOM monitoring check: {}", err);
        self.metrics.cycle_failures_total.inc();

        let details = MonitoringErrorDetails {
            monitoring_active: self.running.load(Ordering::SeqCst),
            known_studies_count: self.known.read().await.len(),
        };
        self.emit(NotificationEvent::MonitoringError(MonitoringError::new(
            err.to_string(),
            details,
        )));
    }

    async fn process_new_study(&self, study: &StudySummary) {
        let patient = study
            .patient_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(study.patient_id.as_deref())
            .unwrap_or("unknown");
        info!(
            "Processing new study: {} for patient {}",
            study.study_instance_uid, patient
        );

        self.emit(NotificationEvent::StudyArrival(StudyArrival::from(study)));

        let Some(callback) = &self.callback else {
            return;
        };

        // 回调在独立任务中执行并等待完成，错误与panic都被隔离
        let callback = Arc::clone(callback);
        let owned = study.clone();
        let outcome = tokio::spawn(async move { callback.on_new_study(&owned).await }).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.callback_failures_total.inc();
                error!(
                    "Error in new study callback for {}: {:#}",
                    study.study_instance_uid, e
                );
            }
            Err(e) => {
                self.metrics.callback_failures_total.inc();
                warn!(
                    "New study callback for {} did not complete: {}",
                    study.study_instance_uid, e
                );
            }
        }
    }
}
