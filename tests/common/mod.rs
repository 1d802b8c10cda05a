//! 测试替身：脚本化渲染器和内存表格
//!
//! 单元测试（`services::test_support`）和集成测试共用这一份

#![allow(dead_code)]

use async_trait::async_trait;
use shard_scraper::{BufferedUpdate, ExtractionOutcome, Renderer, RendererFactory, Sink, SinkError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ScriptState {
    queued: HashMap<String, VecDeque<ExtractionOutcome>>,
    defaults: HashMap<String, ExtractionOutcome>,
    events: Vec<String>,
    delay: Duration,
}

/// 按 URL 预设的抓取结果，队列耗尽后使用该 URL 的默认值（缺省为 `Empty`），记录所有调用
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, outcomes: Vec<ExtractionOutcome>) {
        let mut state = self.state.lock().unwrap();
        state
            .queued
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn set_default(&self, url: &str, outcome: ExtractionOutcome) {
        let mut state = self.state.lock().unwrap();
        state.defaults.insert(url.to_string(), outcome);
    }

    /// 每次抓取前的等待
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn fetches(&self, url: &str) -> usize {
        let needle = format!("fetch {}", url);
        self.events().iter().filter(|e| **e == needle).count()
    }

    pub fn refreshes(&self) -> usize {
        self.events().iter().filter(|e| *e == "refresh").count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    fn log(&self, event: String) {
        self.state.lock().unwrap().events.push(event);
    }

    fn delay(&self) -> Duration {
        self.state.lock().unwrap().delay
    }

    fn next(&self, url: &str) -> ExtractionOutcome {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("fetch {}", url));
        if let Some(outcome) = state.queued.get_mut(url).and_then(|q| q.pop_front()) {
            return outcome;
        }
        state
            .defaults
            .get(url)
            .cloned()
            .unwrap_or(ExtractionOutcome::Empty)
    }
}

pub struct ScriptedRenderer {
    script: Script,
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn fetch(&mut self, url: &str) -> ExtractionOutcome {
        let delay = self.script.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script.next(url)
    }

    async fn refresh(&mut self) {
        self.script.log("refresh".to_string());
    }

    async fn close(&mut self) {
        self.script.log("close".to_string());
    }
}

pub struct ScriptedFactory {
    script: Script,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

#[async_trait]
impl RendererFactory for ScriptedFactory {
    type Renderer = ScriptedRenderer;

    async fn prepare(&mut self) -> anyhow::Result<()> {
        self.script.log("prepare".to_string());
        Ok(())
    }

    async fn launch(&self) -> anyhow::Result<ScriptedRenderer> {
        self.script.log("launch".to_string());
        Ok(ScriptedRenderer {
            script: self.script.clone(),
        })
    }
}

#[derive(Default)]
struct SinkState {
    failures: VecDeque<SinkError>,
    batches: Vec<Vec<BufferedUpdate>>,
    cells: BTreeMap<(u32, u32), String>,
    calls: usize,
}

/// 内存表格：按 `(行, 列)` 保存单元格，可预设若干次失败
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的若干次写入依次返回这些错误
    pub fn fail_next(&self, errors: Vec<SinkError>) {
        self.state.lock().unwrap().failures.extend(errors);
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// 成功写入的批次
    pub fn batches(&self) -> Vec<Vec<BufferedUpdate>> {
        self.state.lock().unwrap().batches.clone()
    }

    /// 成功写入的更新总数
    pub fn applied(&self) -> usize {
        self.state.lock().unwrap().batches.iter().map(Vec::len).sum()
    }

    pub fn cells(&self) -> BTreeMap<(u32, u32), String> {
        self.state.lock().unwrap().cells.clone()
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<String> {
        self.state.lock().unwrap().cells.get(&(row, col)).cloned()
    }

    /// 某一行所有非空单元格
    pub fn row(&self, row: u32) -> Vec<(u32, String)> {
        self.state
            .lock()
            .unwrap()
            .cells
            .iter()
            .filter(|((r, _), _)| *r == row)
            .map(|((_, c), v)| (*c, v.clone()))
            .collect()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn apply_batch(&self, updates: &[BufferedUpdate]) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        for update in updates {
            for (offset, value) in update.values.iter().enumerate() {
                let col = update.location.start_col + offset as u32;
                state.cells.insert((update.location.row, col), value.clone());
            }
        }
        state.batches.push(updates.to_vec());
        Ok(())
    }

    async fn probe(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
