/// 表格 API 客户端
///
/// 通过 HTTP 调用表格的 `values:batchUpdate` 接口，整批写入缓冲的更新
use crate::config::Config;
use crate::error::SinkError;
use crate::models::BufferedUpdate;
use crate::services::batch_writer::Sink;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// 表格 API 客户端
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
}

impl SheetsClient {
    /// 创建新的表格客户端
    pub fn new(config: &Config) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: config.sink_api_base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.sink_spreadsheet_id.clone(),
            sheet_name: config.sink_sheet_name.clone(),
            access_token: config.sink_access_token.clone(),
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// 构造 batchUpdate 请求体
    ///
    /// 每条更新对应一个 `{range, values}`，值按原样写入（RAW）
    pub fn batch_body(&self, updates: &[BufferedUpdate]) -> Value {
        let data: Vec<Value> = updates
            .iter()
            .map(|u| {
                json!({
                    "range": u.location.to_a1(&self.sheet_name),
                    "values": [u.values],
                })
            })
            .collect();
        json!({
            "valueInputOption": "RAW",
            "data": data,
        })
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/spreadsheets/{}", self.base_url, self.spreadsheet_id)
    }
}

#[async_trait]
impl Sink for SheetsClient {
    async fn apply_batch(&self, updates: &[BufferedUpdate]) -> Result<(), SinkError> {
        let url = format!("{}/values:batchUpdate", self.spreadsheet_url());
        debug!("写入表格: {} 条更新 -> {}", updates.len(), url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&self.batch_body(updates))
            .send()
            .await?;

        check_response(response).await
    }

    async fn probe(&self) -> Result<(), SinkError> {
        let url = format!("{}?fields=spreadsheetId", self.spreadsheet_url());
        debug!("检查表格可达性: {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        check_response(response).await
    }
}

/// 把非 2xx 响应映射为 `SinkError`，区分限流
async fn check_response(response: reqwest::Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, body))
}

fn classify_failure(status: StatusCode, body: String) -> SinkError {
    if status == StatusCode::TOO_MANY_REQUESTS || is_quota_message(&body) {
        SinkError::RateLimited(format!("{} {}", status.as_u16(), body.trim()))
    } else {
        SinkError::Rejected {
            status: status.as_u16(),
            message: body.trim().to_string(),
        }
    }
}

fn is_quota_message(body: &str) -> bool {
    static QUOTA: OnceLock<Option<Regex>> = OnceLock::new();
    QUOTA
        .get_or_init(|| Regex::new(r"(?i)quota exceeded|rate_limit_exceeded|resource_exhausted").ok())
        .as_ref()
        .map(|re| re.is_match(body))
        .unwrap_or(false)
}
