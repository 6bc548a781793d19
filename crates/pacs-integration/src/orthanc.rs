//! Orthanc影像归档连接器
//!
//! 通过Orthanc REST接口列出归档中的全部检查：
//! 先获取检查ID列表，再并发获取每个检查的主要DICOM标签。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pacs_core::utils::{non_empty, split_multi_value};
use pacs_core::{PacsError, Result, StudySummary};
use pacs_monitor::ArchiveQuery;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Orthanc连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrthancConfig {
    /// REST接口地址
    pub url: String,
    /// HTTP基本认证用户名
    pub username: Option<String>,
    /// HTTP基本认证密码
    pub password: Option<String>,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 获取检查详情的最大并发请求数
    pub max_concurrent_requests: usize,
}

impl Default for OrthancConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8042".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
            max_concurrent_requests: 8,
        }
    }
}

/// `GET /studies/{id}` 的响应（只取需要的部分）
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrthancStudy {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    main_dicom_tags: HashMap<String, serde_json::Value>,
    #[serde(default)]
    patient_main_dicom_tags: HashMap<String, serde_json::Value>,
}

impl OrthancStudy {
    fn tag<'a>(tags: &'a HashMap<String, serde_json::Value>, name: &str) -> Option<&'a str> {
        tags.get(name).and_then(|v| v.as_str())
    }

    fn into_summary(self) -> StudySummary {
        let main = &self.main_dicom_tags;
        let patient = &self.patient_main_dicom_tags;

        StudySummary {
            study_instance_uid: Self::tag(main, "StudyInstanceUID")
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            patient_name: non_empty(Self::tag(patient, "PatientName")),
            patient_id: non_empty(Self::tag(patient, "PatientID")),
            study_description: non_empty(Self::tag(main, "StudyDescription")),
            modalities_in_study: Self::tag(main, "ModalitiesInStudy")
                .map(split_multi_value)
                .unwrap_or_default(),
            study_date: non_empty(Self::tag(main, "StudyDate")),
            accession_number: non_empty(Self::tag(main, "AccessionNumber")),
            institution_name: non_empty(Self::tag(main, "InstitutionName")),
        }
    }
}

/// Orthanc归档查询实现
#[derive(Debug, Clone)]
pub struct OrthancArchive {
    config: Arc<OrthancConfig>,
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
}

impl OrthancArchive {
    pub fn new(config: OrthancConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PacsError::Config(format!("failed to build HTTP client: {}", e)))?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        Ok(Self {
            config: Arc::new(config),
            client,
            limiter,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        let mut request = self.client.get(&url);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PacsError::Archive(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PacsError::Archive(format!("{} returned status {}", url, status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PacsError::Archive(format!("invalid response from {}: {}", url, e)))
    }

    async fn get_study(&self, id: &str) -> Result<StudySummary> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| PacsError::Internal(e.to_string()))?;

        let study: OrthancStudy = self.get_json(&format!("/studies/{}", id)).await?;
        debug!("Fetched Orthanc study {}", study.id);
        Ok(study.into_summary())
    }

    async fn fetch_all(&self) -> Result<Vec<StudySummary>> {
        let ids: Vec<String> = self.get_json("/studies").await?;
        let total = ids.len();

        let mut tasks = JoinSet::new();
        for (index, id) in ids.into_iter().enumerate() {
            let archive = self.clone();
            tasks.spawn(async move { (index, archive.get_study(&id).await) });
        }

        // 任一检查获取失败即整体失败，剩余任务随JoinSet释放而中止
        let mut fetched = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| PacsError::Internal(e.to_string()))?;
            fetched.push((index, result?));
        }
        fetched.sort_by_key(|(index, _)| *index);

        debug!("Fetched {} studies from Orthanc", total);
        Ok(fetched.into_iter().map(|(_, study)| study).collect())
    }
}

#[async_trait]
impl ArchiveQuery for OrthancArchive {
    async fn list_studies(&self) -> Result<Vec<StudySummary>> {
        self.fetch_all().await.map_err(|e| match e {
            PacsError::Archive(reason) => {
                PacsError::Archive(format!("Failed to fetch studies from PACS: {}", reason))
            }
            other => other,
        })
    }
}
