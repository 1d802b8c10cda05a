use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::workflow::ItemCtx;

/// 初始化 tracing
///
/// 优先使用 `RUST_LOG`，否则 `verbose` 时为 debug，默认 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `shard_index`: 分片编号
pub fn init_log_file(log_file_path: &str, shard_index: usize) -> Result<()> {
    let log_header = format!(
        "{}\n抓取日志 - 分片 {} - {}\n{}\n\n",
        "=".repeat(60),
        shard_index,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 追加若干行到日志文件，失败只打日志
pub fn append_to_log_file(log_file_path: &str, lines: &[String]) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .and_then(|mut file| {
            for line in lines {
                writeln!(file, "{}", line)?;
            }
            Ok(())
        });
    if let Err(e) = result {
        warn!("⚠️ 写入日志文件失败 ({}): {}", log_file_path, e);
    }
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 分片抓取模式");
    info!("🧩 分片: {}/{}", config.shard_index, config.shard_step);
    info!("📦 批量写入阈值: {}", config.batch_size);
    info!("💾 断点文件: {}", config.checkpoint_file);
    info!("{}", "=".repeat(60));
}

/// 记录单条开始
pub fn log_item_start(ctx: &ItemCtx) {
    info!("\n{}", "─".repeat(60));
    info!("{} 🔍 开始处理", ctx);
}

/// 记录缓冲区状态
pub fn log_buffer_state(buffered: usize, threshold: usize) {
    debug!("📥 缓冲区: {}/{}", buffered, threshold);
}

/// 打印最终统计信息
///
/// # 参数
/// - `lines`: 统计摘要
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(lines: &[String], log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    for line in lines {
        info!("{}", line);
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}
