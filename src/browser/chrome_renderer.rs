//! Chromium 渲染器
//!
//! `ChromeRendererFactory` 负责环境准备（读取 Cookie、确认浏览器路径）和启动；
//! `ChromeRenderer` 持有一个浏览器实例和唯一的页面，把页面状态映射为 `ExtractionOutcome`

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::Browser;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::browser::cookies::{load_cookies, StoredCookie};
use crate::browser::headless::launch_headless_browser;
use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::models::ExtractionOutcome;
use crate::services::renderer::{Renderer, RendererFactory};

/// 页面标题包含这些词时视为被拦截
const BLOCK_MARKERS: &[&str] = &[
    "just a moment",
    "access denied",
    "attention required",
    "forbidden",
    "too many requests",
];

/// 数值轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 浏览器相关配置
#[derive(Debug, Clone)]
pub struct ChromeSettings {
    pub executable: Option<PathBuf>,
    pub cookie_file: PathBuf,
    pub cookie_origin_url: String,
    pub value_selector: String,
    pub page_load_timeout: Duration,
    pub value_wait_timeout: Duration,
}

impl ChromeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executable: config.chrome_executable.as_ref().map(PathBuf::from),
            cookie_file: PathBuf::from(&config.cookie_file),
            cookie_origin_url: config.cookie_origin_url.clone(),
            value_selector: config.value_selector.clone(),
            page_load_timeout: config.page_load_timeout,
            value_wait_timeout: config.value_wait_timeout,
        }
    }
}

/// 页面快照：标题 + 当前匹配到的数值文本
#[derive(Debug, Clone, Default, Deserialize)]
struct PageSnapshot {
    #[serde(default)]
    title: String,
    #[serde(default)]
    values: Vec<String>,
}

/// 单次轮询的判断
#[derive(Debug, Clone, PartialEq, Eq)]
enum Poll {
    Blocked,
    Ready(Vec<String>),
    Pending,
}

impl PageSnapshot {
    fn poll(self) -> Poll {
        let title = self.title.to_lowercase();
        if BLOCK_MARKERS.iter().any(|m| title.contains(m)) {
            return Poll::Blocked;
        }
        if self.values.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(self.values)
        }
    }
}

/// 构造读取快照的脚本
fn snapshot_script(selector: &str) -> String {
    // serde_json 负责转义选择器
    let selector = serde_json::Value::String(selector.to_string());
    format!(
        r#"
        (() => {{
            const nodes = Array.from(document.querySelectorAll({selector}));
            return {{
                title: document.title || "",
                values: nodes.map(el => el.textContent || "")
            }};
        }})()
        "#
    )
}

/// 超时类错误只说明"这次没等到"，其他 CDP 错误说明会话已经不可用
fn classify_cdp_error(err: &CdpError) -> ExtractionOutcome {
    match err {
        CdpError::Timeout => ExtractionOutcome::Empty,
        _ => ExtractionOutcome::Fatal,
    }
}

/// 渲染器工厂
pub struct ChromeRendererFactory {
    settings: ChromeSettings,
    cookies: Vec<StoredCookie>,
    executable: Option<PathBuf>,
}

impl ChromeRendererFactory {
    pub fn new(settings: ChromeSettings) -> Self {
        Self {
            settings,
            cookies: Vec::new(),
            executable: None,
        }
    }

    pub fn settings(&self) -> &ChromeSettings {
        &self.settings
    }

    /// 已读取的 Cookie 数量
    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    /// 打开站点首页，注入 Cookie 后刷新
    ///
    /// Cookie 失败只记录日志，不影响后续抓取
    async fn prime_cookies(&self, executor: &JsExecutor) {
        if self.cookies.is_empty() {
            return;
        }

        let origin = &self.settings.cookie_origin_url;
        let params: Vec<_> = self
            .cookies
            .iter()
            .filter_map(|c| match c.to_param(origin) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!("跳过 Cookie: {:#}", e);
                    None
                }
            })
            .collect();

        let result = async {
            timeout(self.settings.page_load_timeout, executor.goto(origin))
                .await
                .map_err(|_| anyhow::anyhow!("打开站点首页超时"))??;
            executor.set_cookies(params).await?;
            timeout(self.settings.page_load_timeout, executor.reload())
                .await
                .map_err(|_| anyhow::anyhow!("刷新超时"))??;
            anyhow::Ok(())
        }
        .await;

        match result {
            Ok(()) => info!("✅ Cookie 注入成功 ({} 条)", self.cookies.len()),
            Err(e) => warn!("⚠️ Cookie 注入失败: {:#}", e),
        }
    }
}

#[async_trait]
impl RendererFactory for ChromeRendererFactory {
    type Renderer = ChromeRenderer;

    async fn prepare(&mut self) -> anyhow::Result<()> {
        self.cookies = match load_cookies(&self.settings.cookie_file).await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("⚠️ Cookie 文件读取失败，不使用 Cookie: {:#}", e);
                Vec::new()
            }
        };
        debug!("读取到 {} 条 Cookie", self.cookies.len());

        self.executable = None;
        if let Some(path) = &self.settings.executable {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                anyhow::bail!("浏览器可执行文件不存在: {}", path.display());
            }
            self.executable = Some(path.clone());
        }
        Ok(())
    }

    async fn launch(&self) -> anyhow::Result<ChromeRenderer> {
        let (browser, events) = launch_headless_browser(
            self.executable.as_deref().map(Path::new),
            self.settings.page_load_timeout,
        )
        .await?;

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                events.abort();
                anyhow::bail!("创建页面失败: {}", e);
            }
        };
        let executor = JsExecutor::new(page);
        self.prime_cookies(&executor).await;

        Ok(ChromeRenderer {
            browser,
            events,
            executor,
            script: snapshot_script(&self.settings.value_selector),
            page_load_timeout: self.settings.page_load_timeout,
            value_wait_timeout: self.settings.value_wait_timeout,
        })
    }
}

/// 单个浏览器实例
pub struct ChromeRenderer {
    browser: Browser,
    events: JoinHandle<()>,
    executor: JsExecutor,
    script: String,
    page_load_timeout: Duration,
    value_wait_timeout: Duration,
}

impl ChromeRenderer {
    /// 轮询页面直到数值出现、被拦截或超时
    async fn wait_for_values(&self) -> ExtractionOutcome {
        let deadline = Instant::now() + self.value_wait_timeout;
        loop {
            let snapshot = match self.executor.eval_as::<PageSnapshot>(&self.script).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!("读取页面失败: {}", e);
                    return classify_cdp_error(&e);
                }
            };

            match snapshot.poll() {
                Poll::Blocked => {
                    warn!("🚫 页面被拦截");
                    return ExtractionOutcome::Fatal;
                }
                Poll::Ready(values) => return ExtractionOutcome::Success(values),
                Poll::Pending if Instant::now() >= deadline => return ExtractionOutcome::Empty,
                Poll::Pending => sleep(POLL_INTERVAL).await,
            }
        }
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn fetch(&mut self, url: &str) -> ExtractionOutcome {
        match timeout(self.page_load_timeout, self.executor.goto(url)).await {
            Err(_) => {
                debug!("页面加载超时: {}", url);
                return ExtractionOutcome::Empty;
            }
            Ok(Err(e)) => {
                warn!("🛑 页面加载失败: {}", e);
                return classify_cdp_error(&e);
            }
            Ok(Ok(())) => {}
        }

        self.wait_for_values().await
    }

    async fn refresh(&mut self) {
        match timeout(self.page_load_timeout, self.executor.reload()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("刷新失败: {}", e),
            Err(_) => debug!("刷新超时"),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("关闭浏览器失败: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("等待浏览器退出失败: {}", e);
        }
        self.events.abort();
    }
}
