//! 渲染会话 - 业务能力层
//!
//! 渲染器是外部协作者：给定 URL，返回抽取到的原始值或失败信号。
//! 本模块只定义它的契约，并管理它的生命周期（创建、重启、重建、关闭）。
//!
//! ## 重启 vs 重建
//!
//! - `restart()`：重试控制器遇到 `Fatal` 时调用，关闭旧渲染器并启动新的
//! - `rebuild()`：连续多次 `Fatal` 后由编排层调用，额外重新执行一次环境准备
//!   （重新读取 Cookie、重新定位浏览器可执行文件等）

use crate::error::SetupError;
use crate::models::ExtractionOutcome;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// 渲染器契约
#[async_trait]
pub trait Renderer: Send {
    /// 加载 URL 并抽取数值
    ///
    /// 所有错误都必须映射为 `ExtractionOutcome`，不向外抛出
    async fn fetch(&mut self, url: &str) -> ExtractionOutcome;

    /// 重新加载当前页面（用于 `Empty` 之后的重试）
    async fn refresh(&mut self);

    /// 释放渲染器持有的资源
    async fn close(&mut self);
}

/// 渲染器工厂
#[async_trait]
pub trait RendererFactory: Send + Sync {
    type Renderer: Renderer;

    /// 一次性环境准备，在会话打开和强制重建时执行
    async fn prepare(&mut self) -> anyhow::Result<()>;

    /// 启动一个新的渲染器实例
    async fn launch(&self) -> anyhow::Result<Self::Renderer>;
}

/// 渲染会话
///
/// 由编排层独占持有，以 `&mut` 借给重试控制器使用，绝不并发访问
pub struct RendererSession<F: RendererFactory> {
    factory: F,
    renderer: Option<F::Renderer>,
    restarts: u32,
    rebuilds: u32,
}

impl<F: RendererFactory> RendererSession<F> {
    /// 打开会话：环境准备 + 启动渲染器
    ///
    /// 失败属于启动错误，整个运行直接终止
    pub async fn open(mut factory: F) -> Result<Self, SetupError> {
        factory
            .prepare()
            .await
            .map_err(|e| SetupError::Renderer(format!("环境准备失败: {:#}", e)))?;
        let renderer = factory
            .launch()
            .await
            .map_err(|e| SetupError::Renderer(format!("{:#}", e)))?;

        info!("✓ 渲染会话已就绪");
        Ok(Self {
            factory,
            renderer: Some(renderer),
            restarts: 0,
            rebuilds: 0,
        })
    }

    /// 抓取一个 URL
    ///
    /// 上一次重启失败导致没有可用渲染器时，先尝试启动；仍然失败则返回 `Fatal`
    pub async fn fetch(&mut self, url: &str) -> ExtractionOutcome {
        if self.renderer.is_none() {
            match self.factory.launch().await {
                Ok(renderer) => self.renderer = Some(renderer),
                Err(e) => {
                    error!("❌ 渲染器启动失败: {:#}", e);
                    return ExtractionOutcome::Fatal;
                }
            }
        }

        match self.renderer.as_mut() {
            Some(renderer) => renderer.fetch(url).await,
            None => ExtractionOutcome::Fatal,
        }
    }

    /// 刷新当前页面
    pub async fn refresh(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.refresh().await;
        }
    }

    /// 替换渲染器
    ///
    /// # 返回
    /// 新渲染器是否启动成功
    pub async fn restart(&mut self) -> bool {
        self.restarts += 1;
        warn!("🧯 正在重启渲染器 (第 {} 次)...", self.restarts);
        self.close_current().await;
        self.launch_replacement().await
    }

    /// 强制完整重建：关闭、重新准备环境、启动
    pub async fn rebuild(&mut self) -> bool {
        self.rebuilds += 1;
        warn!("🔁 正在完整重建渲染会话 (第 {} 次)...", self.rebuilds);
        self.close_current().await;
        if let Err(e) = self.factory.prepare().await {
            warn!("⚠️ 环境准备失败，继续使用旧环境: {:#}", e);
        }
        self.launch_replacement().await
    }

    /// 关闭会话
    pub async fn close(&mut self) {
        self.close_current().await;
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    async fn close_current(&mut self) {
        if let Some(mut old) = self.renderer.take() {
            old.close().await;
        }
    }

    async fn launch_replacement(&mut self) -> bool {
        match self.factory.launch().await {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                true
            }
            Err(e) => {
                error!("❌ 渲染器启动失败，将在下次抓取时重试: {:#}", e);
                false
            }
        }
    }
}
