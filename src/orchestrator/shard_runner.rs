//! 分片处理器 - 编排层
//!
//! ## 职责
//!
//! 按升序遍历本分片拥有的记录，是分片级别的编排器。
//!
//! ## 单条记录的状态
//!
//! ```text
//! Pending → InProgress → Written
//!        ↘ SkippedInvalid（没有合法链接：记入失败清单，断点直接前进，不抓取也不写表格）
//! ```
//!
//! ## 收尾
//!
//! 无论正常结束、收到中断信号还是循环出错，都会执行一次收尾：
//! 无条件写入缓冲区，然后关闭渲染会话。

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{CheckpointStore, FailureLedger};
use crate::models::{FailureReason, WorkItem};
use crate::services::batch_writer::{BatchWriter, FlushResult, Sink};
use crate::services::renderer::{RendererFactory, RendererSession};
use crate::services::retry_controller::{FatalGuard, RetryController};
use crate::services::shard::ShardPartitioner;
use crate::utils::logging;
use crate::workflow::{ItemCtx, ItemFlow, RowLayout};

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// 本次从哪个 index 开始
    pub resumed_from: usize,
    /// 最后一条标记为完成的 index
    pub last_done: Option<usize>,
    /// 已处理（含跳过）的记录数
    pub processed: usize,
    /// 至少拿到一个链接数据的记录数
    pub written: usize,
    /// 没有合法链接而跳过的记录数
    pub skipped: usize,
    /// 重试耗尽仍为空的链接数
    pub empty_sources: usize,
    /// 重启后仍致命失败的链接数
    pub fatal_sources: usize,
    pub flushes: usize,
    pub failed_flushes: usize,
    /// 收尾后仍未写入的更新数
    pub unflushed: usize,
    pub restarts: u32,
    pub rebuilds: u32,
    /// 是否被中断信号提前结束
    pub interrupted: bool,
}

impl RunStats {
    /// 统计摘要，每项一行
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("▶️ 起始位置: {}", self.resumed_from),
            format!(
                "🏁 最后完成: {}",
                self.last_done
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
            format!("📄 已处理: {}", self.processed),
            format!("✅ 已写入: {}", self.written),
            format!("⏭️ 跳过(无合法链接): {}", self.skipped),
            format!("⚠️ 空链接: {}", self.empty_sources),
            format!("🛑 致命链接: {}", self.fatal_sources),
            format!(
                "🚚 写入: 成功 {} 次, 失败 {} 次, 未写入 {} 条",
                self.flushes, self.failed_flushes, self.unflushed
            ),
            format!("🧯 会话重启: {} 次, 完整重建: {} 次", self.restarts, self.rebuilds),
        ]
    }
}

/// 主循环的结束方式
enum LoopEnd {
    Finished(Result<()>),
    Interrupted,
}

/// 分片处理器
///
/// 独占持有断点、失败清单、写入缓冲和渲染会话
pub struct ShardRunner<F: RendererFactory, S: Sink> {
    partitioner: ShardPartitioner,
    checkpoint: CheckpointStore,
    ledger: FailureLedger,
    flow: ItemFlow,
    writer: BatchWriter<S>,
    session: RendererSession<F>,
    guard: FatalGuard,
    max_index: Option<usize>,
    row_sleep: Duration,
    stats: RunStats,
}

impl<F: RendererFactory, S: Sink> ShardRunner<F, S> {
    pub fn new(
        config: &Config,
        session: RendererSession<F>,
        sink: S,
        run_date: impl Into<String>,
    ) -> Self {
        let flow = ItemFlow::new(
            RetryController::new(config.retry.clone()),
            RowLayout::new(config.fields_per_source),
            run_date,
            config.verbose_logging,
        );

        Self {
            partitioner: ShardPartitioner::new(config.shard_index, config.shard_step),
            checkpoint: CheckpointStore::new(config.shard_index, &config.checkpoint_file),
            ledger: FailureLedger::new(&config.failure_ledger_file),
            flow,
            writer: BatchWriter::new(sink, config.batch_size, config.flush.clone(), config.shard_index),
            session,
            guard: FatalGuard::new(config.fatal_rebuild_threshold),
            max_index: config.max_index,
            row_sleep: config.row_sleep,
            stats: RunStats::default(),
        }
    }

    pub fn sink(&self) -> &S {
        self.writer.sink()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// 处理到结束
    pub async fn run(&mut self, items: &[WorkItem]) -> Result<RunStats> {
        self.run_until(items, std::future::pending()).await
    }

    /// 处理到结束或 `shutdown` 完成
    ///
    /// 被中断时，正在处理的记录保持 `INPROG`，下次启动会重新处理
    pub async fn run_until<Fut>(&mut self, items: &[WorkItem], shutdown: Fut) -> Result<RunStats>
    where
        Fut: Future<Output = ()>,
    {
        let start = match self.checkpoint.read() {
            Ok(start) => start,
            Err(e) => {
                self.session.close().await;
                return Err(e.into());
            }
        };
        let end = self
            .max_index
            .map_or(items.len(), |max| max.min(items.len()));
        self.stats.resumed_from = start;

        info!(
            "[分片 {}/{}] ▶️ 从 {} 开始，范围上限 {}",
            self.partitioner.shard_id(),
            self.partitioner.shard_count(),
            start,
            end
        );

        let end_state = tokio::select! {
            result = self.process_range(items, start, end) => LoopEnd::Finished(result),
            _ = shutdown => LoopEnd::Interrupted,
        };

        let result = match end_state {
            LoopEnd::Finished(Ok(())) => {
                info!("✓ 分片范围已处理完毕");
                Ok(())
            }
            LoopEnd::Finished(Err(e)) => {
                error!("❌ 主循环出错，开始收尾: {:#}", e);
                Err(e)
            }
            LoopEnd::Interrupted => {
                warn!("🛑 收到中断信号，开始收尾...");
                self.stats.interrupted = true;
                Ok(())
            }
        };

        self.finalize().await;
        result.map(|()| self.stats.clone())
    }

    async fn process_range(&mut self, items: &[WorkItem], start: usize, end: usize) -> Result<()> {
        let partitioner = self.partitioner;
        for index in partitioner.indices(start, end) {
            let Some(item) = items.get(index) else {
                break;
            };

            self.process_item(item).await?;

            if let Some(FlushResult::Retained { updates, .. }) = self.writer.flush_if_full().await {
                warn!("⚠️ 本次写入未成功，{} 条更新保留到下一次", updates);
            }
            logging::log_buffer_state(self.writer.len(), self.writer.threshold());

            if !self.row_sleep.is_zero() {
                sleep(self.row_sleep).await;
            }
        }
        Ok(())
    }

    async fn process_item(&mut self, item: &WorkItem) -> Result<()> {
        let ctx = ItemCtx::new(self.partitioner.shard_id(), item);
        logging::log_item_start(&ctx);

        // 跳过的记录没有抓取结果，不影响连续致命计数
        if !item.has_valid_source() {
            warn!("{} ⏭️ 没有合法链接，跳过", ctx);
            self.ledger.record(item.index, FailureReason::NoValidSource);
            self.checkpoint.mark_done(item.index)?;
            self.stats.skipped += 1;
            self.stats.processed += 1;
            self.stats.last_done = Some(item.index);
            return Ok(());
        }

        self.checkpoint.mark_in_progress(item.index)?;

        let report = self.flow.run(&mut self.session, item, &ctx).await;

        let report_fatal = report.is_fatal();
        self.stats.empty_sources += report.empty_sources();
        self.stats.fatal_sources += report.fatal_sources();
        if report.sources.iter().any(|r| r.outcome.is_success()) {
            self.stats.written += 1;
        }
        if let Some(reason) = report.failure {
            self.ledger.record(item.index, reason);
        }

        for update in report.updates {
            self.writer.append(update);
        }
        self.checkpoint.mark_done(item.index)?;

        self.stats.processed += 1;
        self.stats.last_done = Some(item.index);
        info!("{} ✓ 完成", ctx);

        // 下一条记录开始之前重建
        if self.guard.observe(report_fatal) {
            warn!(
                "{} 🔁 连续 {} 条记录致命失败，完整重建会话",
                ctx,
                self.guard.threshold()
            );
            self.session.rebuild().await;
        }
        Ok(())
    }

    /// 收尾：无条件写入缓冲区，然后关闭会话
    async fn finalize(&mut self) {
        info!("🧹 收尾: 写入剩余 {} 条更新...", self.writer.len());
        if let FlushResult::Retained { updates, last_error, .. } = self.writer.flush().await {
            error!(
                "❌ 收尾写入失败，{} 条更新未保存 (断点已前进，需要重新运行对应范围): {}",
                updates, last_error
            );
        }

        self.session.close().await;

        self.stats.flushes = self.writer.flushes();
        self.stats.failed_flushes = self.writer.failed_flushes();
        self.stats.unflushed = self.writer.len();
        self.stats.restarts = self.session.restarts();
        self.stats.rebuilds = self.session.rebuilds();
    }
}
