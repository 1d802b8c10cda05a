//! 失败清单 - 基础设施层
//!
//! 只负责"记录无法解决的条目"能力，不关心流程

use crate::models::FailureReason;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// 失败清单
///
/// 职责：
/// - 每条无法解决的记录追加一行 `INDEX|REASON_CODE`
/// - 同一次运行内按 index 去重，重复处理不会刷屏
/// - 写入失败只打日志，不影响主循环
pub struct FailureLedger {
    path: PathBuf,
    recorded: HashSet<usize>,
}

impl FailureLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recorded: HashSet::new(),
        }
    }

    /// 记录一条失败
    ///
    /// # 返回
    /// 本次是否为新记录（已记录过的 index 返回 false）
    pub fn record(&mut self, index: usize, reason: FailureReason) -> bool {
        if !self.recorded.insert(index) {
            debug!("失败清单已包含 index {}，跳过", index);
            return false;
        }

        if let Err(e) = self.append_line(index, reason) {
            warn!(
                "⚠️ 写入失败清单失败 ({}): index={} reason={} err={}",
                self.path.display(),
                index,
                reason,
                e
            );
        }
        true
    }

    /// 本次运行已记录的条数
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    fn append_line(&self, index: usize, reason: FailureReason) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}|{}", index, reason.code())
    }
}
