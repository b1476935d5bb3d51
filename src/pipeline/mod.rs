//! Pipeline orchestration
//!
//! The orchestrator walks a task through the stage state machine; the
//! dispatcher hands tasks to a bounded worker pool with at-most-one worker
//! per task and owns cancellation.

mod cancel;
mod dispatcher;
mod orchestrator;
mod stage;

pub use cancel::CancelHandle;
pub use dispatcher::Dispatcher;
pub use orchestrator::{PipelineOrchestrator, RetryPolicy, StageRunners};
pub use stage::{StageError, StageInput, StageRunner};
