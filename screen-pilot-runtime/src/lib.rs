//! Screen-Pilot Runtime
//!
//! Control loop for a vision-language GUI agent: capture the screen, ask the
//! model for the next actions, dispatch them to a surface, repeat until the
//! model finishes or a cap is reached.

pub mod types;
pub mod interfaces;
pub mod run_context;
pub mod session;
pub mod context_builder;
pub mod retry;
pub mod metrics;
pub mod prompts;
pub mod model;
pub mod plugins;
pub mod extraction;
pub mod agent_config;
pub mod desktop_surface;
pub mod agent_loop;

pub use types::{
    AgentStatus, ChatTurn, Conversation, ErrorReport, ExecuteParams, ModelInput, ModelOutput,
    Role, Screenshot, ScreenshotContext, SessionSnapshot, Speaker, Timing, IMAGE_PLACEHOLDER,
};
pub use interfaces::{ModelClient, RuntimeError, Surface};
pub use run_context::RunContext;
pub use session::{DataSink, Session};
pub use context_builder::{ContextBuilder, DEFAULT_MAX_IMAGES};
pub use retry::{with_retry, RetryObserver, RetryPolicy, StageRetries};
pub use prompts::system_prompt;
pub use model::VlmModel;
pub use plugins::{DumpTracePlugin, LocalScreenshotPlugin, Plugin, PluginManager};
pub use extraction::{summarize_steps, Extractor, OperationStep, StepRecorder, VlmExtractor};
pub use agent_config::{load_agent_config, AgentConfig, ModelConfig, PluginConfig};
pub use desktop_surface::DesktopSurface;
pub use agent_loop::{ErrorSink, GuiAgent, LoopLimits, MAX_LOOP_MESSAGE, SCREENSHOT_FAILURE_MESSAGE};
