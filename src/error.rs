//! 错误类型
//!
//! - `SetupError`：启动阶段的致命错误，直接终止整个运行
//! - `SinkError`：表格写入错误，区分限流与其他错误
//! - `CheckpointError`：断点文件读写错误

use thiserror::Error;

/// 启动阶段错误
///
/// 此时尚未写入任何断点，重启后可安全地从上一个断点（或 0）继续
#[derive(Debug, Error)]
pub enum SetupError {
    /// 分片参数不合法
    #[error("分片参数不合法: SHARD_INDEX={index}, SHARD_STEP={step}")]
    InvalidShard { index: usize, step: usize },

    /// 其他配置错误
    #[error("配置错误: {0}")]
    InvalidConfig(String),

    /// 工作列表无法读取或解析
    #[error("无法加载工作列表 ({path}): {reason}")]
    WorkSource { path: String, reason: String },

    /// 表格不可达
    #[error("表格不可达: {0}")]
    SinkUnreachable(#[source] SinkError),

    /// 渲染器启动失败
    #[error("渲染器启动失败: {0}")]
    Renderer(String),
}

/// 表格写入错误
#[derive(Debug, Error)]
pub enum SinkError {
    /// 频率/配额限制，冷却后重试
    #[error("表格配额限制: {0}")]
    RateLimited(String),

    /// 网络请求失败
    #[error("表格请求失败: {0}")]
    Request(String),

    /// 表格返回了错误响应
    #[error("表格返回错误 (status={status}): {message}")]
    Rejected { status: u16, message: String },
}

impl SinkError {
    /// 是否为限流错误
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SinkError::RateLimited(_))
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Request(err.to_string())
    }
}

/// 断点文件错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("读取断点文件失败 ({path}): {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("写入断点文件失败 ({path}): {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
