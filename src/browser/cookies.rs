//! Cookie 文件读取与转换

use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use serde::Deserialize;
use tracing::warn;

/// `cookies.json` 中的一条记录
///
/// 只读取需要的字段，其他字段忽略
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default, alias = "expirationDate")]
    pub expiry: Option<f64>,
}

impl StoredCookie {
    /// 转换为 CDP 参数，没有 domain 的 Cookie 归属到 `origin_url`
    pub fn to_param(&self, origin_url: &str) -> Result<CookieParam> {
        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone());

        builder = match &self.domain {
            Some(domain) => builder.domain(domain.clone()),
            None => builder.url(origin_url.to_string()),
        };
        if let Some(path) = &self.path {
            builder = builder.path(path.clone());
        }
        if let Some(secure) = self.secure {
            builder = builder.secure(secure);
        }
        if let Some(expiry) = self.expiry {
            builder = builder.expires(TimeSinceEpoch::new(expiry));
        }

        builder
            .build()
            .map_err(|e| anyhow::anyhow!("无效的 Cookie {}: {}", self.name, e))
    }
}

/// 读取 Cookie 文件
///
/// 文件不存在时返回空列表；单条记录格式错误时跳过
pub async fn load_cookies(path: &Path) -> Result<Vec<StoredCookie>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取 Cookie 文件: {}", path.display()))?;
    parse_cookies(&content).with_context(|| format!("Cookie 文件格式错误: {}", path.display()))
}

/// 解析 Cookie JSON 数组
pub fn parse_cookies(content: &str) -> Result<Vec<StoredCookie>> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(content)?;
    let cookies = raw
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<StoredCookie>(v) {
            Ok(cookie) => Some(cookie),
            Err(e) => {
                warn!("⚠️ 跳过格式错误的 Cookie: {}", e);
                None
            }
        })
        .collect();
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookies_skips_bad_entries() {
        let content = r#"[
            {"name": "sessionid", "value": "abc", "domain": ".example.com", "path": "/", "secure": true, "expiry": 1900000000},
            {"name": "broken"},
            {"name": "theme", "value": "dark", "expirationDate": 1800000000.5, "httpOnly": false}
        ]"#;

        let cookies = parse_cookies(content).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].domain.as_deref(), Some(".example.com"));
        assert_eq!(cookies[1].expiry, Some(1800000000.5));
    }

    #[test]
    fn test_parse_cookies_rejects_non_array() {
        tokio_test::assert_err!(parse_cookies(r#"{"name": "x"}"#));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = load_cookies(&dir.path().join("cookies.json")).await.unwrap();
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_to_param_without_domain_uses_origin() {
        let cookie = StoredCookie {
            name: "sessionid".to_string(),
            value: "abc".to_string(),
            domain: None,
            path: Some("/".to_string()),
            secure: Some(true),
            expiry: None,
        };
        let param = cookie.to_param("https://example.com/").unwrap();
        assert_eq!(param.url.as_deref(), Some("https://example.com/"));
        assert_eq!(param.name, "sessionid");
    }
}
