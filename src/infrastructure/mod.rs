//! 基础设施层
//!
//! 持有稀缺资源（断点文件、失败清单文件、浏览器 Page），只暴露能力

pub mod checkpoint;
pub mod failure_ledger;
pub mod js_executor;

pub use checkpoint::{Checkpoint, CheckpointState, CheckpointStore};
pub use failure_ledger::FailureLedger;
pub use js_executor::JsExecutor;
