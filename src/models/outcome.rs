use std::fmt;

/// 单次抓取的结果
///
/// `Empty` 与 `Fatal` 走不同的恢复路径，不能混用：
/// - `Empty`：页面可达但本次没有数据（通常是渲染慢），原地退避重试
/// - `Fatal`：渲染器层面的失败（崩溃、拦截页、超时风暴），需要更换会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success(Vec<String>),
    Empty,
    Fatal,
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionOutcome::Fatal)
    }
}

impl fmt::Display for ExtractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionOutcome::Success(values) => write!(f, "Success({} 个值)", values.len()),
            ExtractionOutcome::Empty => write!(f, "Empty"),
            ExtractionOutcome::Fatal => write!(f, "Fatal"),
        }
    }
}

/// 写入失败清单的原因代码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// 没有任何合法链接
    NoValidSource,
    /// 重试耗尽后仍然没有数据
    EmptyAfterRetries,
    /// 更换会话后仍然致命失败
    FatalAfterRestart,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::NoValidSource => "NO_VALID_SOURCE",
            FailureReason::EmptyAfterRetries => "EMPTY_AFTER_RETRIES",
            FailureReason::FatalAfterRestart => "FATAL_AFTER_RESTART",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
