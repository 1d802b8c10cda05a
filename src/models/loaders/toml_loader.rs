use crate::models::work_item::WorkItem;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 工作列表文件格式
///
/// ```toml
/// [[items]]
/// name = "RELIANCE"
/// urls = ["https://in.tradingview.com/chart/aaa/", "https://in.tradingview.com/chart/bbb/"]
/// ```
#[derive(Debug, Deserialize)]
struct WorkListFile {
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    urls: Vec<String>,
}

/// 从 TOML 文件加载工作列表
///
/// 记录的顺序即为 `index`，名称为空时使用 `Row {index+1}`，
/// 超出 `max_sources` 的链接会被丢弃
pub async fn load_work_list(path: &Path, max_sources: usize) -> Result<Vec<WorkItem>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取工作列表: {}", path.display()))?;

    parse_work_list(&content, max_sources)
        .with_context(|| format!("无法解析工作列表: {}", path.display()))
}

/// 解析工作列表内容
pub fn parse_work_list(content: &str, max_sources: usize) -> Result<Vec<WorkItem>> {
    let file: WorkListFile = toml::from_str(content)?;

    let items = file
        .items
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let name = raw.name.trim();
            let display_name = if name.is_empty() {
                format!("Row {}", index + 1)
            } else {
                name.to_string()
            };

            let mut urls: Vec<String> = raw
                .urls
                .into_iter()
                .map(|u| u.replace('"', "").trim().to_string())
                .collect();
            if urls.len() > max_sources {
                tracing::warn!(
                    "[第 {} 行] 链接数 {} 超过上限 {}，多余的链接将被忽略",
                    index + 1,
                    urls.len(),
                    max_sources
                );
                urls.truncate(max_sources);
            }

            WorkItem::new(index, display_name, urls)
        })
        .collect();

    Ok(items)
}
