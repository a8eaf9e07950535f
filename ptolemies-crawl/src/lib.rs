//! Per-source crawl supervision: checkpointed frontier management and the
//! bounded concurrent pipeline that drives fetch through both stores.

pub mod cancel;
pub mod checkpoint;
mod error;
pub mod pipeline;
pub mod supervisor;

pub use cancel::CancellationToken;
pub use checkpoint::Checkpoint;
pub use error::SupervisorError;
pub use pipeline::{Pipeline, PipelineResources};
pub use supervisor::Supervisor;
