//! 记录处理流程 - 流程层
//!
//! 核心职责：定义"一条记录"的完整处理流程
//!
//! 流程顺序：
//! 1. 逐个链接通过重试控制器抓取（非法链接直接跳过）
//! 2. 清洗数值，按固定宽度补齐/截断
//! 3. 生成该行的更新：名称、日期、每个有数据的链接对应的数值区间
//!
//! 没有任何合法链接的记录不会进入本流程，由编排层直接跳过；
//! 连续致命记录的统计和会话重建也在编排层完成

use tracing::{info, warn};

use crate::models::{
    is_valid_source, BufferedUpdate, CellRange, ExtractionOutcome, FailureReason, WorkItem,
};
use crate::services::renderer::{RendererFactory, RendererSession};
use crate::services::retry_controller::{FetchReport, RetryController};
use crate::workflow::item_ctx::ItemCtx;

/// 行布局
///
/// 名称写 A 列，日期写 J 列，数值从 K 列开始，每个链接占 `fields_per_source` 列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub name_col: u32,
    pub date_col: u32,
    pub first_value_col: u32,
    pub fields_per_source: usize,
}

impl RowLayout {
    pub fn new(fields_per_source: usize) -> Self {
        Self {
            name_col: 1,
            date_col: 10,
            first_value_col: 11,
            fields_per_source: fields_per_source.max(1),
        }
    }

    /// 第 `slot` 个链接的数值区间
    pub fn source_range(&self, row: u32, slot: usize) -> CellRange {
        let width = self.fields_per_source as u32;
        let start = self.first_value_col + slot as u32 * width;
        CellRange::new(row, start, start + width - 1)
    }
}

/// 单条记录的处理结果
#[derive(Debug, Clone)]
pub struct ItemReport {
    /// 要写入的更新，按列顺序
    pub updates: Vec<BufferedUpdate>,
    /// 每个被抓取链接的报告，按链接顺序
    pub sources: Vec<FetchReport>,
    /// 需要写入失败清单的原因
    pub failure: Option<FailureReason>,
}

impl ItemReport {
    pub fn empty_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|r| !r.outcome.is_success() && !r.fatal)
            .count()
    }

    pub fn fatal_sources(&self) -> usize {
        self.sources.iter().filter(|r| r.fatal).count()
    }

    /// 致命记录：至少一个链接重启后仍致命失败，且没有任何链接拿到数据
    pub fn is_fatal(&self) -> bool {
        self.fatal_sources() > 0 && !self.sources.iter().any(|r| r.outcome.is_success())
    }
}

const ZERO_WIDTH: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{200e}', '\u{200f}', '\u{2060}', '\u{feff}'];

/// 清洗单个数值：统一负号、空值符号，去掉零宽字符和首尾空白
pub fn clean_value(raw: &str) -> String {
    raw.replace('−', "-")
        .replace('∅', "None")
        .chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// 补齐或截断到固定宽度
fn fit_to_width(values: Vec<String>, width: usize) -> Vec<String> {
    let mut values: Vec<String> = values.iter().map(|v| clean_value(v)).collect();
    values.resize(width, String::new());
    values
}

/// 记录处理流程
///
/// - 不持有渲染会话，由编排层以 `&mut` 借入
/// - 不直接写表格，只产出更新
pub struct ItemFlow {
    retry: RetryController,
    layout: RowLayout,
    run_date: String,
    verbose_logging: bool,
}

impl ItemFlow {
    pub fn new(
        retry: RetryController,
        layout: RowLayout,
        run_date: impl Into<String>,
        verbose_logging: bool,
    ) -> Self {
        Self {
            retry,
            layout,
            run_date: run_date.into(),
            verbose_logging,
        }
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub async fn run<F: RendererFactory>(
        &self,
        session: &mut RendererSession<F>,
        item: &WorkItem,
        ctx: &ItemCtx,
    ) -> ItemReport {
        let mut sources = Vec::new();
        let mut fetched: Vec<(usize, Vec<String>)> = Vec::new();

        for (slot, url) in item.source_refs.iter().enumerate() {
            if !is_valid_source(url) {
                warn!("{} 链接 {} 不合法，跳过: {:?}", ctx, slot + 1, url);
                continue;
            }

            info!("{}   🌐 抓取链接 {}...", ctx, slot + 1);
            let report = self.retry.fetch(session, url.trim()).await;
            if self.verbose_logging {
                info!(
                    "{}   结果: {} (尝试 {} 次, 重启={})",
                    ctx, report.outcome, report.attempts, report.restarted
                );
            }

            match &report.outcome {
                ExtractionOutcome::Success(values) => {
                    info!("{}   ✓ 链接 {} 获取到 {} 个值", ctx, slot + 1, values.len());
                    fetched.push((slot, values.clone()));
                }
                _ => warn!("{}   ⚠️ 链接 {} 没有数据，保留原有值", ctx, slot + 1),
            }
            sources.push(report);
        }

        let failure = if sources.iter().any(|r| r.fatal) {
            Some(FailureReason::FatalAfterRestart)
        } else if sources.iter().any(|r| !r.outcome.is_success()) {
            Some(FailureReason::EmptyAfterRetries)
        } else {
            None
        };

        ItemReport {
            updates: self.build_updates(item, fetched),
            sources,
            failure,
        }
    }

    /// 生成一行的更新
    ///
    /// 没有数据的链接不生成数值更新，之前写入的值保持不变
    pub fn build_updates(&self, item: &WorkItem, fetched: Vec<(usize, Vec<String>)>) -> Vec<BufferedUpdate> {
        let row = item.sink_row();
        let mut updates = vec![
            BufferedUpdate::new(
                CellRange::cell(row, self.layout.name_col),
                vec![item.display_name.clone()],
            ),
            BufferedUpdate::new(
                CellRange::cell(row, self.layout.date_col),
                vec![self.run_date.clone()],
            ),
        ];

        for (slot, values) in fetched {
            updates.push(BufferedUpdate::new(
                self.layout.source_range(row, slot),
                fit_to_width(values, self.layout.fields_per_source),
            ));
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::retry_controller::RetryPolicy;
    use crate::services::test_support::{Script, ScriptedFactory};
    use std::time::Duration;

    fn flow() -> ItemFlow {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        ItemFlow::new(RetryController::new(policy), RowLayout::new(3), "10/17/2026", false)
    }

    fn success(values: &[&str]) -> ExtractionOutcome {
        ExtractionOutcome::Success(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_clean_value() {
        assert_eq!(clean_value("−12.5"), "-12.5");
        assert_eq!(clean_value("∅"), "None");
        assert_eq!(clean_value("\u{200b} 3.1\u{feff} "), "3.1");
        assert_eq!(clean_value("abc"), "abc");
    }

    #[test]
    fn test_fit_to_width() {
        let padded = fit_to_width(vec!["1".into()], 3);
        assert_eq!(padded, vec!["1", "", ""]);
        let truncated = fit_to_width(vec!["1".into(), "2".into(), "3".into(), "4".into()], 3);
        assert_eq!(truncated, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_source_ranges_are_adjacent() {
        let layout = RowLayout::new(12);
        assert_eq!(layout.source_range(2, 0), CellRange::new(2, 11, 22));
        assert_eq!(layout.source_range(2, 1), CellRange::new(2, 23, 34));
    }

    #[test]
    fn test_build_updates_layout() {
        let item = WorkItem::new(4, "AAPL", vec!["http://a".into(), "http://b".into()]);
        let updates = flow().build_updates(&item, vec![(1, vec!["−1".into()])]);

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].location, CellRange::cell(5, 1));
        assert_eq!(updates[0].values, vec!["AAPL"]);
        assert_eq!(updates[1].location, CellRange::cell(5, 10));
        assert_eq!(updates[1].values, vec!["10/17/2026"]);
        assert_eq!(updates[2].location, CellRange::new(5, 14, 16));
        assert_eq!(updates[2].values, vec!["-1", "", ""]);
    }

    #[tokio::test]
    async fn test_run_skips_empty_source_values() {
        let script = Script::new();
        script.push("http://a", vec![success(&["1", "2"])]);
        let mut session = RendererSession::open(ScriptedFactory::new(script.clone()))
            .await
            .unwrap();
        let item = WorkItem::new(0, "X", vec!["http://a".into(), "http://b".into()]);
        let ctx = ItemCtx::new(0, &item);

        let report = flow().run(&mut session, &item, &ctx).await;

        // 名称 + 日期 + 链接 1 的数值
        assert_eq!(report.updates.len(), 3);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.empty_sources(), 1);
        assert_eq!(report.failure, Some(FailureReason::EmptyAfterRetries));
        assert!(!report.is_fatal());
    }

    #[tokio::test]
    async fn test_run_skips_invalid_slot_without_fetch() {
        let script = Script::new();
        script.push("http://b", vec![success(&["9"])]);
        let mut session = RendererSession::open(ScriptedFactory::new(script.clone()))
            .await
            .unwrap();
        let item = WorkItem::new(2, "Y", vec!["".into(), "http://b".into()]);
        let ctx = ItemCtx::new(0, &item);

        let report = flow().run(&mut session, &item, &ctx).await;

        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.failure, None);
        assert_eq!(report.updates[2].location, CellRange::new(3, 14, 16));
        assert_eq!(script.fetches(""), 0);
    }

    #[tokio::test]
    async fn test_item_with_all_sources_fatal_is_fatal() {
        let script = Script::new();
        script.set_default("http://dead", ExtractionOutcome::Fatal);
        let mut session = RendererSession::open(ScriptedFactory::new(script.clone()))
            .await
            .unwrap();
        let item = WorkItem::new(0, "Z", vec!["http://dead".into(), "http://dead".into()]);
        let ctx = ItemCtx::new(0, &item);

        let report = flow().run(&mut session, &item, &ctx).await;

        assert!(report.is_fatal());
        assert_eq!(report.fatal_sources(), 2);
        assert_eq!(report.failure, Some(FailureReason::FatalAfterRestart));
        // 流程本身不重建会话，每个致命链接只重启一次
        assert_eq!(session.rebuilds(), 0);
        assert_eq!(session.restarts(), 2);
        // 只有名称和日期
        assert_eq!(report.updates.len(), 2);
    }

    #[tokio::test]
    async fn test_item_with_one_good_source_is_not_fatal() {
        let script = Script::new();
        script.set_default("http://dead", ExtractionOutcome::Fatal);
        script.set_default("http://ok", success(&["7"]));
        let mut session = RendererSession::open(ScriptedFactory::new(script.clone()))
            .await
            .unwrap();
        let item = WorkItem::new(0, "W", vec!["http://dead".into(), "http://ok".into()]);
        let ctx = ItemCtx::new(0, &item);

        let report = flow().run(&mut session, &item, &ctx).await;

        assert_eq!(report.fatal_sources(), 1);
        assert!(!report.is_fatal());
        assert_eq!(report.failure, Some(FailureReason::FatalAfterRestart));
    }
}
