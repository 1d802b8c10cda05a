//! 记录处理上下文
//!
//! 封装"哪个分片正在处理第几条记录、写到第几行"这一信息

use std::fmt::Display;

use crate::models::WorkItem;

/// 记录处理上下文（仅用于日志显示）
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 分片编号
    pub shard_id: usize,

    /// 记录在工作列表中的位置
    pub index: usize,

    /// 表格行号（从1开始）
    pub row: u32,

    /// 显示名称
    pub name: String,
}

impl ItemCtx {
    pub fn new(shard_id: usize, item: &WorkItem) -> Self {
        Self {
            shard_id,
            index: item.index,
            row: item.sink_row(),
            name: item.display_name.clone(),
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[分片 {} 记录#{} 行#{} {}]",
            self.shard_id, self.index, self.row, self.name
        )
    }
}
