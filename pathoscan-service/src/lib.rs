pub mod config;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod prompts;
pub mod qa;
pub mod service;
pub mod tasks;
pub mod workflow;

pub use config::{ServiceConfig, Stage3Policy};
pub use llm::{BackendError, CompletionBackend, OpenRouterBackend};
pub use models::*;
pub use normalizer::{Normalized, Normalizer};
pub use qa::{QaError, answer_question};
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_analysis_pipeline, create_analysis_session, create_flow_runner};
