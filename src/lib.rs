//! # Shard Scraper
//!
//! 分片、可断点续跑的图表数值抓取程序：从工作列表读取记录，用无头浏览器抓取数值，
//! 批量写入表格。多个进程各自处理一个分片，互不共享状态。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（断点文件、失败清单、Page），只暴露能力
//! - `CheckpointStore` - 原子覆盖写入 `DONE:i` / `INPROG:i`
//! - `FailureLedger` - 追加写 `INDEX|REASON_CODE`
//! - `JsExecutor` - 唯一的 page owner
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ShardPartitioner` - 分片划分
//! - `RendererSession` - 渲染器生命周期（重启 / 重建）
//! - `RetryController` - 退避重试与致命失败降级
//! - `BatchWriter` - 批量写入与限流冷却
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一条记录"的完整处理流程
//! - `ItemCtx` - 上下文封装（分片 + index + 行号）
//! - `ItemFlow` - 流程编排（抓取 → 清洗 → 生成更新）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 启动检查、信号处理
//! - `orchestrator/shard_runner` - 分片主循环、断点、收尾
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 测试替身与集成测试共用，内部以 crate 名引用
#[cfg(test)]
extern crate self as shard_scraper;

// 重新导出常用类型
pub use config::Config;
pub use error::{CheckpointError, SetupError, SinkError};
pub use models::{BufferedUpdate, CellRange, ExtractionOutcome, FailureReason, WorkItem};
pub use orchestrator::{App, RunStats, ShardRunner};
pub use services::{
    BatchWriter, FlushPolicy, FlushResult, Renderer, RendererFactory, RendererSession,
    RetryController, RetryPolicy, ShardPartitioner, Sink,
};
pub use workflow::{ItemCtx, ItemFlow};
