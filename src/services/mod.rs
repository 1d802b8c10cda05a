pub mod batch_writer;
pub mod renderer;
pub mod retry_controller;
pub mod shard;

#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
pub(crate) mod test_support;

pub use batch_writer::{BatchWriter, FlushPolicy, FlushResult, Sink};
pub use renderer::{Renderer, RendererFactory, RendererSession};
pub use retry_controller::{Backoff, FatalGuard, FetchReport, RetryController, RetryPolicy};
pub use shard::ShardPartitioner;
