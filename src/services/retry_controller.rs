//! 重试控制器 - 业务能力层
//!
//! 只负责"把一个 URL 抓到手"的能力，驱动渲染会话完成有限次尝试：
//!
//! 1. `Success`：立即返回
//! 2. `Empty`：退避等待（指数增长 + 少量抖动，有上限）→ 刷新 → 重试，预算耗尽后返回 `Empty`
//! 3. `Fatal`：不在原会话里重试，先让会话重启，再以较小的预算重试一次；
//!    仍然 `Fatal` 时降级为 `Empty`，并在报告里标记 `fatal`，交给编排层统计

use crate::models::{ExtractionOutcome, FailureReason};
use crate::services::renderer::{RendererFactory, RendererSession};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 重试参数
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 第一次退避的等待时间
    pub base_delay: Duration,
    /// 每次退避的增长倍数
    pub growth_factor: f64,
    /// 退避等待上限（含抖动）
    pub max_delay: Duration,
    /// 抖动上限
    pub max_jitter: Duration,
    /// `Empty` 路径的总尝试次数
    pub empty_attempts: u32,
    /// 重启之后的总尝试次数
    pub after_restart_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            growth_factor: 1.6,
            max_delay: Duration::from_secs(10),
            max_jitter: Duration::from_millis(300),
            empty_attempts: 6,
            after_restart_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// 退避序列（不含抖动），单调不减且不超过 `max_delay`
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.base_delay.min(self.max_delay),
            factor: if self.growth_factor.is_finite() {
                self.growth_factor.max(1.0)
            } else {
                f64::MAX
            },
            cap: self.max_delay,
        }
    }

    /// 在基础等待上叠加随机抖动，结果仍不超过 `max_delay`
    pub fn jittered(&self, delay: Duration) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (delay + jitter).min(self.max_delay)
    }
}

/// 退避序列
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    factor: f64,
    cap: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        // 先在秒上封顶再转换，倍数过大时不会超出 Duration 的范围
        let grown = (current.as_secs_f64() * self.factor).min(self.cap.as_secs_f64());
        self.next = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.cap)
            .min(self.cap);
        Some(current)
    }
}

/// 单个 URL 的抓取报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// 最终结果，只会是 `Success` 或 `Empty`
    pub outcome: ExtractionOutcome,
    /// 总尝试次数
    pub attempts: u32,
    /// 本次是否触发了会话重启
    pub restarted: bool,
    /// 重启后仍然致命失败（已降级为 `Empty`）
    pub fatal: bool,
}

impl FetchReport {
    /// 没有拿到数据时的失败原因
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.outcome {
            ExtractionOutcome::Success(_) => None,
            _ if self.fatal => Some(FailureReason::FatalAfterRestart),
            _ => Some(FailureReason::EmptyAfterRetries),
        }
    }
}

/// 连续致命记录计数
///
/// 按记录计数：致命记录加一，任何非致命记录清零；达到阈值时要求完整重建会话并清零
#[derive(Debug, Clone)]
pub struct FatalGuard {
    threshold: u32,
    consecutive: u32,
}

impl FatalGuard {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// 记录一条记录是否致命，返回是否需要重建
    pub fn observe(&mut self, item_fatal: bool) -> bool {
        if !item_fatal {
            self.consecutive = 0;
            return false;
        }
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            self.consecutive = 0;
            return true;
        }
        false
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// 重试控制器
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 抓取一个 URL，永远不会返回 `Fatal`
    pub async fn fetch<F: RendererFactory>(
        &self,
        session: &mut RendererSession<F>,
        url: &str,
    ) -> FetchReport {
        let (outcome, attempts) = self
            .attempt(session, url, self.policy.empty_attempts)
            .await;

        if !outcome.is_fatal() {
            return FetchReport {
                outcome,
                attempts,
                restarted: false,
                fatal: false,
            };
        }

        warn!("🛑 渲染器致命失败，更换会话后重试: {}", url);
        session.restart().await;

        let (retry_outcome, retry_attempts) = self
            .attempt(session, url, self.policy.after_restart_attempts)
            .await;
        let attempts = attempts + retry_attempts;

        if retry_outcome.is_fatal() {
            warn!("🛑 重启后仍然失败，按空结果处理: {}", url);
            return FetchReport {
                outcome: ExtractionOutcome::Empty,
                attempts,
                restarted: true,
                fatal: true,
            };
        }

        info!("✓ 重启后抓取结果: {}", retry_outcome);
        FetchReport {
            outcome: retry_outcome,
            attempts,
            restarted: true,
            fatal: false,
        }
    }

    /// 在当前会话中最多尝试 `budget` 次，遇到 `Success` 或 `Fatal` 立即返回
    async fn attempt<F: RendererFactory>(
        &self,
        session: &mut RendererSession<F>,
        url: &str,
        budget: u32,
    ) -> (ExtractionOutcome, u32) {
        let budget = budget.max(1);
        let mut delays = self.policy.backoff();

        for attempt in 1..=budget {
            let outcome = session.fetch(url).await;
            match outcome {
                ExtractionOutcome::Success(_) | ExtractionOutcome::Fatal => {
                    return (outcome, attempt)
                }
                ExtractionOutcome::Empty if attempt < budget => {
                    let base = delays.next().unwrap_or(self.policy.max_delay);
                    let delay = self.policy.jittered(base);
                    warn!(
                        "   ⚠️ 结果为空 (尝试 {}/{})，{:?} 后刷新重试...",
                        attempt, budget, delay
                    );
                    sleep(delay).await;
                    session.refresh().await;
                }
                ExtractionOutcome::Empty => {
                    debug!("结果为空，已用尽 {} 次尝试", budget);
                }
            }
        }

        (ExtractionOutcome::Empty, budget)
    }
}
