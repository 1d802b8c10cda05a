use serde::{Deserialize, Serialize};

/// 工作列表中的一条记录
///
/// `index` 是贯穿全流程的稳定身份：分片、断点、表格行号都由它决定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// 在工作列表中的位置（从 0 开始）
    pub index: usize,
    /// 显示名称，写入表格 A 列
    pub display_name: String,
    /// 数据来源链接（1 或 2 个），可能为空或格式错误
    pub source_refs: Vec<String>,
}

impl WorkItem {
    pub fn new(index: usize, display_name: impl Into<String>, source_refs: Vec<String>) -> Self {
        Self {
            index,
            display_name: display_name.into(),
            source_refs,
        }
    }

    /// 对应的表格行号（从 1 开始），超出 `u32` 时饱和到 `u32::MAX`
    pub fn sink_row(&self) -> u32 {
        u32::try_from(self.index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .unwrap_or(u32::MAX)
    }

    /// 是否至少有一个合法链接
    pub fn has_valid_source(&self) -> bool {
        self.source_refs.iter().any(|r| is_valid_source(r))
    }
}

/// 判断链接是否可用：必须能被解析且为 http/https
pub fn is_valid_source(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}
