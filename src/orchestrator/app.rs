//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **启动检查**：校验分片参数、加载工作列表、确认表格可达、打开渲染会话
//! 2. **运行**：把工作列表交给 `ShardRunner`，同时监听 Ctrl-C
//! 3. **统计输出**：打印并追加到日志文件
//!
//! 启动阶段的任何失败都在写入断点之前发生，直接以非零状态退出

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::browser::{ChromeRendererFactory, ChromeSettings};
use crate::clients::SheetsClient;
use crate::config::Config;
use crate::error::SetupError;
use crate::models::{load_work_list, WorkItem};
use crate::orchestrator::shard_runner::{RunStats, ShardRunner};
use crate::services::batch_writer::Sink;
use crate::services::renderer::RendererSession;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    items: Vec<WorkItem>,
    runner: ShardRunner<ChromeRendererFactory, SheetsClient>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        logging::init_log_file(&config.output_log_file, config.shard_index)?;
        logging::log_startup(&config);

        let items = load_items(&config).await?;
        info!("✓ 工作列表共 {} 条记录", items.len());

        let sink = SheetsClient::new(&config).map_err(SetupError::SinkUnreachable)?;
        sink.probe().await.map_err(SetupError::SinkUnreachable)?;
        info!("✓ 表格可达: {}", config.sink_spreadsheet_id);

        let factory = ChromeRendererFactory::new(ChromeSettings::from_config(&config));
        let session = RendererSession::open(factory).await?;

        let run_date = chrono::Local::now().format("%m/%d/%Y").to_string();
        let runner = ShardRunner::new(&config, session, sink, run_date);

        Ok(Self {
            config,
            items,
            runner,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<RunStats> {
        if self.items.is_empty() {
            warn!("⚠️ 工作列表为空，程序结束");
        }

        let stats = self.runner.run_until(&self.items, shutdown_signal()).await?;

        let lines = stats.summary_lines();
        logging::print_final_stats(&lines, &self.config.output_log_file);
        logging::append_to_log_file(&self.config.output_log_file, &lines);

        Ok(stats)
    }
}

async fn load_items(config: &Config) -> Result<Vec<WorkItem>, SetupError> {
    load_work_list(Path::new(&config.work_list_path), config.max_sources)
        .await
        .map_err(|e| SetupError::WorkSource {
            path: config.work_list_path.clone(),
            reason: format!("{:#}", e),
        })
}

/// Ctrl-C；监听失败时永不完成
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ 无法监听中断信号: {}", e);
        std::future::pending::<()>().await;
    }
}
