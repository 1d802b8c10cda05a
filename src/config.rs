use std::time::Duration;

use crate::error::SetupError;
use crate::services::batch_writer::FlushPolicy;
use crate::services::retry_controller::RetryPolicy;

/// 程序配置
///
/// 所有字段均可通过环境变量覆盖，缺省值即为单分片（0/1）运行
#[derive(Clone, Debug)]
pub struct Config {
    // --- 分片 ---
    /// 当前分片编号（从 0 开始）
    pub shard_index: usize,
    /// 分片总数
    pub shard_step: usize,

    // --- 持久化文件 ---
    /// 断点文件，默认 `checkpoint_{shard}.txt`
    pub checkpoint_file: String,
    /// 失败清单文件，默认 `failures_{shard}.txt`
    pub failure_ledger_file: String,
    /// 运行日志文件
    pub output_log_file: String,

    // --- 工作列表 ---
    /// 工作列表 TOML 文件
    pub work_list_path: String,
    /// 索引上限（不含），None 表示不限制
    pub max_index: Option<usize>,
    /// 每条记录最多读取的链接数
    pub max_sources: usize,
    /// 每个链接写入的固定字段数
    pub fields_per_source: usize,
    /// 两条记录之间的停顿
    pub row_sleep: Duration,

    // --- 重试 ---
    pub retry: RetryPolicy,
    /// 连续致命失败多少次后强制重建会话
    pub fatal_rebuild_threshold: u32,

    // --- 写入 ---
    /// 缓冲区达到多少条更新时触发写入
    pub batch_size: usize,
    pub flush: FlushPolicy,

    // --- 表格 API ---
    pub sink_api_base_url: String,
    pub sink_spreadsheet_id: String,
    pub sink_sheet_name: String,
    pub sink_access_token: String,

    // --- 浏览器 ---
    /// 浏览器可执行文件路径，None 时由 chromiumoxide 自动探测
    pub chrome_executable: Option<String>,
    /// Cookie 文件
    pub cookie_file: String,
    /// 注入 Cookie 前先打开的站点首页
    pub cookie_origin_url: String,
    /// 数值节点的 CSS 选择器
    pub value_selector: String,
    /// 页面加载超时
    pub page_load_timeout: Duration,
    /// 等待数值出现的超时
    pub value_wait_timeout: Duration,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_index: 0,
            shard_step: 1,
            checkpoint_file: "checkpoint_0.txt".to_string(),
            failure_ledger_file: "failures_0.txt".to_string(),
            output_log_file: "output.txt".to_string(),
            work_list_path: "work_list.toml".to_string(),
            max_index: None,
            max_sources: 2,
            fields_per_source: 12,
            row_sleep: Duration::from_millis(50),
            retry: RetryPolicy::default(),
            fatal_rebuild_threshold: 3,
            batch_size: 300,
            flush: FlushPolicy::default(),
            sink_api_base_url: "https://sheets.googleapis.com/v4".to_string(),
            sink_spreadsheet_id: String::new(),
            sink_sheet_name: "Sheet1".to_string(),
            sink_access_token: String::new(),
            chrome_executable: None,
            cookie_file: "cookies.json".to_string(),
            cookie_origin_url: "https://in.tradingview.com/".to_string(),
            value_selector: "div.valueValue-l31H9iuA.apply-common-tooltip".to_string(),
            page_load_timeout: Duration::from_secs(40),
            value_wait_timeout: Duration::from_secs(45),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        let shard_index = env_parse("SHARD_INDEX").unwrap_or(default.shard_index);
        let shard_step = env_parse("SHARD_STEP").unwrap_or(default.shard_step);

        let mut retry = default.retry.clone();
        if let Some(ms) = env_parse::<u64>("RETRY_BASE_DELAY_MS") {
            retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("RETRY_MAX_DELAY_MS") {
            retry.max_delay = Duration::from_millis(ms);
        }
        retry.growth_factor = env_parse("RETRY_GROWTH_FACTOR").unwrap_or(retry.growth_factor);
        retry.empty_attempts = env_parse("RETRY_EMPTY_ATTEMPTS").unwrap_or(retry.empty_attempts);
        retry.after_restart_attempts =
            env_parse("RETRY_AFTER_RESTART_ATTEMPTS").unwrap_or(retry.after_restart_attempts);

        let mut flush = default.flush.clone();
        flush.max_attempts = env_parse("FLUSH_MAX_ATTEMPTS").unwrap_or(flush.max_attempts);
        if let Some(secs) = env_parse::<u64>("FLUSH_COOLDOWN_SECS") {
            flush.rate_limit_cooldown = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("FLUSH_SHARD_STAGGER_SECS") {
            flush.stagger_per_shard = Duration::from_secs(secs);
        }

        Self {
            shard_index,
            shard_step,
            checkpoint_file: std::env::var("CHECKPOINT_FILE")
                .unwrap_or_else(|_| format!("checkpoint_{}.txt", shard_index)),
            failure_ledger_file: std::env::var("FAILURE_LEDGER_FILE")
                .unwrap_or_else(|_| format!("failures_{}.txt", shard_index)),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            work_list_path: std::env::var("WORK_LIST_PATH").unwrap_or(default.work_list_path),
            max_index: env_parse("MAX_INDEX").or(default.max_index),
            max_sources: env_parse("MAX_SOURCES").unwrap_or(default.max_sources),
            fields_per_source: env_parse("FIELDS_PER_SOURCE").unwrap_or(default.fields_per_source),
            row_sleep: env_parse::<u64>("ROW_SLEEP_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.row_sleep),
            retry,
            fatal_rebuild_threshold: env_parse("FATAL_REBUILD_THRESHOLD")
                .unwrap_or(default.fatal_rebuild_threshold),
            batch_size: env_parse("BATCH_SIZE").unwrap_or(default.batch_size),
            flush,
            sink_api_base_url: std::env::var("SINK_API_BASE_URL").unwrap_or(default.sink_api_base_url),
            sink_spreadsheet_id: std::env::var("SINK_SPREADSHEET_ID").unwrap_or(default.sink_spreadsheet_id),
            sink_sheet_name: std::env::var("SINK_SHEET_NAME").unwrap_or(default.sink_sheet_name),
            sink_access_token: std::env::var("SINK_ACCESS_TOKEN").unwrap_or(default.sink_access_token),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            cookie_file: std::env::var("COOKIE_FILE").unwrap_or(default.cookie_file),
            cookie_origin_url: std::env::var("COOKIE_ORIGIN_URL").unwrap_or(default.cookie_origin_url),
            value_selector: std::env::var("VALUE_SELECTOR").unwrap_or(default.value_selector),
            page_load_timeout: env_parse::<u64>("PAGE_LOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.page_load_timeout),
            value_wait_timeout: env_parse::<u64>("VALUE_WAIT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.value_wait_timeout),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    /// 校验配置，分片参数不合法时直接拒绝启动
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.shard_step == 0 || self.shard_index >= self.shard_step {
            return Err(SetupError::InvalidShard {
                index: self.shard_index,
                step: self.shard_step,
            });
        }
        if self.batch_size == 0 || self.fields_per_source == 0 {
            return Err(SetupError::InvalidConfig(
                "BATCH_SIZE 与 FIELDS_PER_SOURCE 必须大于 0".to_string(),
            ));
        }
        let growth = self.retry.growth_factor;
        if !growth.is_finite() || growth < 1.0 {
            return Err(SetupError::InvalidConfig(format!(
                "RETRY_GROWTH_FACTOR 必须是不小于 1 的有限数，当前为 {}",
                growth
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
