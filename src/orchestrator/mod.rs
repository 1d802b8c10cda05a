//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 启动检查（分片参数、工作列表、表格、浏览器）
//! - 监听中断信号
//! - 输出最终统计
//!
//! ### `shard_runner` - 分片处理器
//! - 按升序遍历本分片的记录
//! - 维护断点、失败清单、写入缓冲和渲染会话
//! - 收尾：写入剩余更新、关闭会话
//!
//! ## 层次关系
//!
//! ```text
//! app (启动 + 信号)
//!     ↓
//! shard_runner (处理 Vec<WorkItem>)
//!     ↓
//! workflow::ItemFlow (处理单条 WorkItem)
//!     ↓
//! services (能力层：retry / renderer / batch_writer)
//!     ↓
//! infrastructure (基础设施：断点、失败清单、JsExecutor)
//! ```

pub mod app;
pub mod shard_runner;

pub use app::App;
pub use shard_runner::{RunStats, ShardRunner};
