//! 页面执行器 - 基础设施层
//!
//! 独占渲染器的唯一页面，只提供导航、Cookie 注入和脚本求值

use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;

/// 页面执行器
///
/// 不关心页面内容，也不对结果做分类；分类由渲染器完成
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 导航并等待加载完成
    pub async fn goto(&self, url: &str) -> Result<(), CdpError> {
        self.page.goto(url).await.map(|_| ())
    }

    /// 重新加载当前页面
    pub async fn reload(&self) -> Result<(), CdpError> {
        self.page.reload().await.map(|_| ())
    }

    /// 写入 Cookie（作用于整个浏览器上下文）
    pub async fn set_cookies(&self, cookies: Vec<CookieParam>) -> Result<(), CdpError> {
        if cookies.is_empty() {
            return Ok(());
        }
        self.page.set_cookies(cookies).await.map(|_| ())
    }

    /// 求值并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, script: &str) -> Result<T, CdpError> {
        let value = self.page.evaluate(script).await?.into_value()?;
        Ok(value)
    }
}
