//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::non_empty;

/// 检查唯一标识（Study Instance UID），仅作为集合成员键使用，不做解析
pub type StudyIdentifier = String;

/// 患者姓名缺失时的占位符
pub const UNKNOWN_PATIENT_NAME: &str = "Unknown Patient";

/// 患者ID缺失时的占位符
pub const UNKNOWN_PATIENT_ID: &str = "Unknown ID";

/// 监控错误事件的固定操作名
pub const MONITORING_OPERATION: &str = "DICOM monitoring";

/// 影像归档返回的检查摘要（只读快照）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StudySummary {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: StudyIdentifier,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default, rename = "PatientID")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub study_description: Option<String>,
    #[serde(default)]
    pub modalities_in_study: Vec<String>,
    #[serde(default)]
    pub study_date: Option<String>,
    #[serde(default)]
    pub accession_number: Option<String>,
    #[serde(default)]
    pub institution_name: Option<String>,
}

impl StudySummary {
    pub fn new(study_instance_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_instance_uid.into(),
            ..Default::default()
        }
    }

    pub fn with_patient(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.patient_name = Some(name.into());
        self.patient_id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.study_description = Some(description.into());
        self
    }

    pub fn with_modalities(mut self, modalities: &[&str]) -> Self {
        self.modalities_in_study = modalities.iter().map(|m| m.to_string()).collect();
        self
    }

    /// 主模态：模态列表的第一个元素
    pub fn primary_modality(&self) -> Option<&str> {
        self.modalities_in_study.first().map(String::as_str)
    }

    /// 标识为空的检查无法被跟踪
    pub fn is_trackable(&self) -> bool {
        !self.study_instance_uid.is_empty()
    }
}

/// 新检查到达通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyArrival {
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: StudyIdentifier,
    pub patient_name: String,
    #[serde(rename = "patientID")]
    pub patient_id: String,
    pub study_description: Option<String>,
    pub modality: Option<String>,
    pub study_date: Option<String>,
    pub accession_number: Option<String>,
    pub institution_name: Option<String>,
}

impl From<&StudySummary> for StudyArrival {
    fn from(study: &StudySummary) -> Self {
        Self {
            study_instance_uid: study.study_instance_uid.clone(),
            patient_name: non_empty(study.patient_name.as_deref())
                .unwrap_or_else(|| UNKNOWN_PATIENT_NAME.to_string()),
            patient_id: non_empty(study.patient_id.as_deref())
                .unwrap_or_else(|| UNKNOWN_PATIENT_ID.to_string()),
            study_description: study.study_description.clone(),
            modality: study.primary_modality().map(str::to_string),
            study_date: study.study_date.clone(),
            accession_number: study.accession_number.clone(),
            institution_name: study.institution_name.clone(),
        }
    }
}

/// 系统通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// 系统通知（监控启动、停止等生命周期事件）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotification {
    pub message: String,
    pub level: NotificationLevel,
}

impl SystemNotification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Info,
        }
    }
}

/// 监控错误的结构化详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringErrorDetails {
    /// 出错时监控是否处于运行状态
    pub monitoring_active: bool,
    /// 出错时已知检查数量
    pub known_studies_count: usize,
}

/// 监控错误通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringError {
    pub operation: String,
    pub error: String,
    pub details: MonitoringErrorDetails,
}

impl MonitoringError {
    pub fn new(error: impl Into<String>, details: MonitoringErrorDetails) -> Self {
        Self {
            operation: MONITORING_OPERATION.to_string(),
            error: error.into(),
            details,
        }
    }
}

/// 推送给事件接收端的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationEvent {
    #[serde(rename = "dicom_arrival")]
    StudyArrival(StudyArrival),
    #[serde(rename = "system_notification")]
    SystemNotification(SystemNotification),
    #[serde(rename = "dicom_error")]
    MonitoringError(MonitoringError),
}

impl NotificationEvent {
    /// 事件类型名称（与序列化标签一致）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StudyArrival(_) => "dicom_arrival",
            Self::SystemNotification(_) => "system_notification",
            Self::MonitoringError(_) => "dicom_error",
        }
    }
}

/// 监控状态（按需计算，不存储）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub monitoring: bool,
    pub known_studies_count: usize,
    /// 检查间隔（毫秒）
    pub check_interval: u64,
    pub last_check: DateTime<Utc>,
}
