//! 断点存储 - 基础设施层
//!
//! 每个分片一个文件，内容为单条记录 `STATE:INDEX`（`STATE` 为 `DONE` 或 `INPROG`）。
//! 每次状态变化都整体覆盖写入：先写临时文件并 fsync，再 rename 到目标路径，
//! 因此任何时刻读到的都是一条完整的记录。
//!
//! 恢复规则：
//! - 文件不存在：从 0 开始
//! - `DONE:i`：从 `i + 1` 开始
//! - `INPROG:i`：从 `i` 开始（该条可能被重复处理，至少一次语义）
//! - 旧版本脚本写入的纯数字 `N`：从 `N` 开始

use crate::error::CheckpointError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 断点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Done,
    InProgress,
}

impl CheckpointState {
    fn tag(&self) -> &'static str {
        match self {
            CheckpointState::Done => "DONE",
            CheckpointState::InProgress => "INPROG",
        }
    }
}

/// 一条断点记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub state: CheckpointState,
    pub index: usize,
}

impl Checkpoint {
    /// 按恢复规则计算下一次开始的位置
    pub fn resume_index(&self) -> usize {
        match self.state {
            CheckpointState::Done => self.index + 1,
            CheckpointState::InProgress => self.index,
        }
    }

    /// 解析文件内容，无法识别时返回 None
    pub fn parse(content: &str) -> Option<ParsedCheckpoint> {
        let content = content.trim();
        if let Some((tag, index)) = content.split_once(':') {
            let index = index.trim().parse().ok()?;
            let state = match tag.trim() {
                "DONE" => CheckpointState::Done,
                "INPROG" => CheckpointState::InProgress,
                _ => return None,
            };
            return Some(ParsedCheckpoint::Record(Checkpoint { state, index }));
        }
        content.parse().ok().map(ParsedCheckpoint::Legacy)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.state.tag(), self.index)
    }
}

/// 断点文件的两种格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedCheckpoint {
    Record(Checkpoint),
    /// 旧格式：文件中直接保存下一次开始的位置
    Legacy(usize),
}

impl ParsedCheckpoint {
    pub fn resume_index(&self) -> usize {
        match self {
            ParsedCheckpoint::Record(cp) => cp.resume_index(),
            ParsedCheckpoint::Legacy(next) => *next,
        }
    }
}

/// 断点存储
///
/// 由编排层独占持有
pub struct CheckpointStore {
    shard_id: usize,
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(shard_id: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            shard_id,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取恢复位置
    ///
    /// 文件损坏时从 0 开始：宁可重复处理，也不留空洞
    pub fn read(&self) -> Result<usize, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[分片 {}] 断点文件不存在，从 0 开始", self.shard_id);
                return Ok(0);
            }
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };

        match Checkpoint::parse(&content) {
            Some(parsed) => Ok(parsed.resume_index()),
            None => {
                warn!(
                    "[分片 {}] ⚠️ 断点文件内容无法识别: {:?}，从 0 开始",
                    self.shard_id,
                    content.trim()
                );
                Ok(0)
            }
        }
    }

    /// 开始处理某条记录之前调用
    pub fn mark_in_progress(&self, index: usize) -> Result<(), CheckpointError> {
        self.write(Checkpoint {
            state: CheckpointState::InProgress,
            index,
        })
    }

    /// 该条记录的所有更新都已进入写入缓冲后调用
    pub fn mark_done(&self, index: usize) -> Result<(), CheckpointError> {
        self.write(Checkpoint {
            state: CheckpointState::Done,
            index,
        })
    }

    fn write(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
            file.write_all(checkpoint.to_string().as_bytes())
                .map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;

        debug!("[分片 {}] 💾 断点已保存: {}", self.shard_id, checkpoint);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::new(0, dir.path().join("checkpoint_0.txt"))
    }

    #[test]
    fn test_missing_file_resumes_at_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).read().unwrap(), 0);
    }

    #[test]
    fn test_resume_rule() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.mark_in_progress(7).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "INPROG:7");
        assert_eq!(store.read().unwrap(), 7);

        store.mark_done(7).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "DONE:7");
        assert_eq!(store.read().unwrap(), 8);
    }

    #[test]
    fn test_overwrite_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for i in 0..5 {
            store.mark_in_progress(i).unwrap();
            store.mark_done(i).unwrap();
        }
        assert!(!store.tmp_path().exists());
        assert_eq!(store.read().unwrap(), 5);
    }

    #[test]
    fn test_legacy_and_corrupt_content() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), "42\n").unwrap();
        assert_eq!(store.read().unwrap(), 42);

        fs::write(store.path(), "garbage").unwrap();
        assert_eq!(store.read().unwrap(), 0);

        fs::write(store.path(), "DONE:abc").unwrap();
        assert_eq!(store.read().unwrap(), 0);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Checkpoint::parse("DONE:3"),
            Some(ParsedCheckpoint::Record(Checkpoint {
                state: CheckpointState::Done,
                index: 3
            }))
        );
        assert_eq!(
            Checkpoint::parse(" INPROG:0 \n").map(|p| p.resume_index()),
            Some(0)
        );
        assert_eq!(Checkpoint::parse("PAUSED:1"), None);
    }
}
