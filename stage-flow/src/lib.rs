pub mod error;
pub mod pipeline;
pub mod runner;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use error::{FlowError, Result};
pub use pipeline::{ExecutionResult, ExecutionStatus, Pipeline, PipelineBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, Session, SessionStatus, SessionStorage};
pub use task::{NextAction, Task, TaskResult};
