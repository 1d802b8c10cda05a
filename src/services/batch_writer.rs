//! 批量写入 - 业务能力层
//!
//! 按到达顺序缓冲更新，攒够一批后整体写入表格：
//!
//! - `append()` 同步、纯内存、不会失败
//! - `flush()` 有固定的尝试预算；遇到限流冷却较长时间，其他错误短暂等待
//! - 预算耗尽时缓冲区原样保留，留给下一次写入（达到阈值或收尾）
//! - 只有写入成功后才清空缓冲区，写入过程中被取消也不会丢数据

use crate::error::SinkError;
use crate::models::BufferedUpdate;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// 表格写入契约
///
/// 接受有序的 `(区域, 值)` 列表并整体写入；调用方不假设部分写入语义，失败则整批重试
#[async_trait]
pub trait Sink: Send + Sync {
    /// 整批写入
    async fn apply_batch(&self, updates: &[BufferedUpdate]) -> Result<(), SinkError>;

    /// 启动时的可达性检查
    async fn probe(&self) -> Result<(), SinkError>;
}

/// 写入参数
#[derive(Debug, Clone)]
pub struct FlushPolicy {
    /// 每次 flush 的尝试次数
    pub max_attempts: u32,
    /// 限流后的冷却时间
    pub rate_limit_cooldown: Duration,
    /// 每个分片额外错开的冷却时间（乘以分片编号）
    pub stagger_per_shard: Duration,
    /// 其他错误的等待时间（乘以尝试次数）
    pub transient_backoff: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_cooldown: Duration::from_secs(60),
            stagger_per_shard: Duration::from_secs(5),
            transient_backoff: Duration::from_secs(3),
        }
    }
}

/// 一次 flush 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushResult {
    /// 缓冲区为空，什么也没做
    Skipped,
    /// 写入成功
    Flushed { updates: usize },
    /// 尝试耗尽，缓冲区保留
    Retained {
        updates: usize,
        attempts: u32,
        last_error: String,
    },
}

impl FlushResult {
    pub fn is_ok(&self) -> bool {
        !matches!(self, FlushResult::Retained { .. })
    }
}

/// 批量写入器
pub struct BatchWriter<S: Sink> {
    sink: S,
    buffer: Vec<BufferedUpdate>,
    threshold: usize,
    policy: FlushPolicy,
    shard_id: usize,
    flushes: usize,
    failed_flushes: usize,
}

impl<S: Sink> BatchWriter<S> {
    pub fn new(sink: S, threshold: usize, policy: FlushPolicy, shard_id: usize) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
            threshold: threshold.max(1),
            policy,
            shard_id,
            flushes: 0,
            failed_flushes: 0,
        }
    }

    /// 追加一条更新
    pub fn append(&mut self, update: BufferedUpdate) {
        self.buffer.push(update);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 当前缓冲的更新（按到达顺序）
    pub fn buffered(&self) -> &[BufferedUpdate] {
        &self.buffer
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.threshold
    }

    /// 成功写入的次数
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// 尝试耗尽的次数
    pub fn failed_flushes(&self) -> usize {
        self.failed_flushes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// 达到阈值时写入
    pub async fn flush_if_full(&mut self) -> Option<FlushResult> {
        if self.is_full() {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// 整批写入缓冲区
    pub async fn flush(&mut self) -> FlushResult {
        if self.buffer.is_empty() {
            info!("📭 缓冲区为空，跳过写入");
            return FlushResult::Skipped;
        }

        let updates = self.buffer.len();
        let max_attempts = self.policy.max_attempts.max(1);
        info!("🚚 开始写入 | 更新数={}", updates);

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.sink.apply_batch(&self.buffer).await {
                Ok(()) => {
                    self.buffer.clear();
                    self.flushes += 1;
                    info!(
                        "🚀 写入成功 | 已保存 {} 条更新 | 累计写入 {} 次",
                        updates, self.flushes
                    );
                    return FlushResult::Flushed { updates };
                }
                Err(e) => {
                    warn!("⚠️ 写入失败 (尝试 {}/{}): {}", attempt, max_attempts, e);
                    let delay = self.delay_after(&e, attempt);
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        if e.is_rate_limited() {
                            info!("⏳ 触发配额限制，冷却 {:?}...", delay);
                        }
                        sleep(delay).await;
                    }
                }
            }
        }

        self.failed_flushes += 1;
        error!(
            "🛑 写入 {} 次均失败，缓冲区保留 {} 条更新，稍后重试",
            max_attempts, updates
        );
        FlushResult::Retained {
            updates,
            attempts: max_attempts,
            last_error,
        }
    }

    fn delay_after(&self, err: &SinkError, attempt: u32) -> Duration {
        if err.is_rate_limited() {
            self.policy.rate_limit_cooldown + self.policy.stagger_per_shard * self.shard_id as u32
        } else {
            self.policy.transient_backoff * attempt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellRange;
    use crate::services::test_support::MemorySink;

    fn fast_policy() -> FlushPolicy {
        FlushPolicy {
            max_attempts: 3,
            rate_limit_cooldown: Duration::from_millis(2),
            stagger_per_shard: Duration::from_millis(1),
            transient_backoff: Duration::from_millis(1),
        }
    }

    fn update(row: u32, value: &str) -> BufferedUpdate {
        BufferedUpdate::new(CellRange::cell(row, 1), vec![value.to_string()])
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let sink = MemorySink::new();
        let mut writer = BatchWriter::new(sink.clone(), 10, fast_policy(), 0);
        assert_eq!(writer.flush().await, FlushResult::Skipped);
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn test_flush_applies_whole_buffer() {
        let sink = MemorySink::new();
        let mut writer = BatchWriter::new(sink.clone(), 10, fast_policy(), 0);
        writer.append(update(1, "a"));
        writer.append(update(2, "b"));

        assert_eq!(writer.flush().await, FlushResult::Flushed { updates: 2 });
        assert!(writer.is_empty());
        assert_eq!(sink.batches(), vec![vec![update(1, "a"), update(2, "b")]]);
        assert_eq!(writer.flushes(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_buffer() {
        let sink = MemorySink::new();
        sink.fail_next(vec![
            SinkError::RateLimited("429".into()),
            SinkError::Request("reset".into()),
            SinkError::RateLimited("429".into()),
        ]);
        let mut writer = BatchWriter::new(sink.clone(), 10, fast_policy(), 2);
        writer.append(update(1, "a"));
        writer.append(update(2, "b"));
        let before = writer.buffered().to_vec();

        let result = writer.flush().await;
        assert!(matches!(result, FlushResult::Retained { updates: 2, attempts: 3, .. }));
        assert_eq!(writer.buffered(), before.as_slice());
        assert_eq!(sink.calls(), 3);
        assert_eq!(writer.failed_flushes(), 1);

        // 下一次写入包含旧数据和新追加的数据
        writer.append(update(3, "c"));
        assert_eq!(writer.flush().await, FlushResult::Flushed { updates: 3 });
        let last = sink.batches().last().cloned().unwrap();
        assert_eq!(last, vec![update(1, "a"), update(2, "b"), update(3, "c")]);
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let sink = MemorySink::new();
        sink.fail_next(vec![SinkError::RateLimited("Quota exceeded".into())]);
        let mut writer = BatchWriter::new(sink.clone(), 10, fast_policy(), 0);
        writer.append(update(1, "a"));

        assert_eq!(writer.flush().await, FlushResult::Flushed { updates: 1 });
        assert_eq!(sink.calls(), 2);
    }

    #[tokio::test]
    async fn test_flush_if_full() {
        let sink = MemorySink::new();
        let mut writer = BatchWriter::new(sink.clone(), 2, fast_policy(), 0);
        writer.append(update(1, "a"));
        assert_eq!(writer.flush_if_full().await, None);
        writer.append(update(2, "b"));
        assert_eq!(
            writer.flush_if_full().await,
            Some(FlushResult::Flushed { updates: 2 })
        );
    }

    #[tokio::test]
    async fn test_reapplying_same_update_is_idempotent() {
        let once = MemorySink::new();
        let twice = MemorySink::new();
        let u = BufferedUpdate::new(
            CellRange::new(3, 11, 13),
            vec!["1".into(), "2".into(), "3".into()],
        );

        once.apply_batch(&[u.clone()]).await.unwrap();
        twice.apply_batch(&[u.clone()]).await.unwrap();
        twice.apply_batch(&[u.clone(), u]).await.unwrap();

        assert_eq!(once.cells(), twice.cells());
    }

    #[test]
    fn test_rate_limit_delay_is_staggered_by_shard() {
        let writer = BatchWriter::new(MemorySink::new(), 1, FlushPolicy::default(), 3);
        assert_eq!(
            writer.delay_after(&SinkError::RateLimited(String::new()), 1),
            Duration::from_secs(75)
        );
        assert_eq!(
            writer.delay_after(&SinkError::Request(String::new()), 2),
            Duration::from_secs(6)
        );
    }
}
