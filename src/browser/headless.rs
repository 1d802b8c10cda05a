use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 加固过的启动参数
const HARDENED_ARGS: &[&str] = &[
    "--no-sandbox",            // 容器内没有沙盒权限
    "--disable-dev-shm-usage", // 防止共享内存不足
    "--disable-gpu",
    "--blink-settings=imagesEnabled=false", // 不加载图片
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--mute-audio",
    "--remote-debugging-port=0",
    "--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// 启动无头浏览器
///
/// # 返回
/// 浏览器句柄，以及在后台处理浏览器事件的任务（关闭浏览器时需要一并结束）
pub async fn launch_headless_browser(
    executable: Option<&Path>,
    request_timeout: Duration,
) -> Result<(Browser, JoinHandle<()>)> {
    info!("🌐 启动无头浏览器...");

    let mut builder = BrowserConfig::builder()
        .new_headless_mode()
        .window_size(1920, 1080)
        .request_timeout(request_timeout)
        .args(HARDENED_ARGS.iter().copied());
    if let Some(path) = executable {
        debug!("浏览器路径: {}", path.display());
        builder = builder.chrome_executable(path);
    }

    let config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        anyhow::anyhow!("配置无头浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        anyhow::anyhow!("启动无头浏览器失败: {}", e)
    })?;
    debug!("无头浏览器启动成功");

    // 在后台处理浏览器事件
    let events = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    Ok((browser, events))
}
