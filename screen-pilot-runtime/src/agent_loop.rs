//! Agent loop - screenshot, predict, act until the task ends.

use crate::agent_config::AgentConfig;
use crate::context_builder::ContextBuilder;
use crate::interfaces::{ModelClient, RuntimeError, Surface};
use crate::metrics::{increment_loop_iterations, increment_screenshot_failures};
use crate::plugins::PluginManager;
use crate::retry::{with_retry, RetryObserver, StageRetries};
use crate::run_context::RunContext;
use crate::session::{DataSink, Session};
use crate::types::{
    now_millis, AgentStatus, Conversation, ErrorReport, ExecuteParams, ModelInput, ModelOutput,
    Screenshot, SessionSnapshot, Timing,
};
use screen_pilot_parser::{get_summary, ActionKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Error message recorded when the iteration cap is hit.
pub const MAX_LOOP_MESSAGE: &str = "Exceeds the maximum number of loops";
/// Error message recorded when too many screenshots were unusable.
pub const SCREENSHOT_FAILURE_MESSAGE: &str = "Too many screenshot failures";

/// Receives the final snapshot and a report when a run fails.
pub type ErrorSink = Arc<dyn Fn(&SessionSnapshot, &ErrorReport) + Send + Sync>;

/// Iteration caps for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_loop_count: usize,
    pub max_snapshot_err_cnt: usize,
    /// Pause after an unusable screenshot.
    pub snapshot_retry_delay: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_loop_count: 25,
            max_snapshot_err_cnt: 10,
            snapshot_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Drives one surface with one model.
///
/// Loop state is per run: every call to [`GuiAgent::run`] builds its own
/// [`Session`] and reads identity, factor and cancellation from the
/// [`RunContext`] it is given. Registered plugins are shared by every run and
/// get `init`/`cleanup` around each one, so concurrent runs that need their
/// own traces or step records should use separate agents.
pub struct GuiAgent<S, M>
where
    S: Surface,
    M: ModelClient,
{
    surface: Arc<S>,
    model: Arc<M>,
    context_builder: ContextBuilder,
    limits: LoopLimits,
    retries: StageRetries,
    on_retry: Option<RetryObserver>,
    on_data: Option<DataSink>,
    on_error: Option<ErrorSink>,
    plugins: PluginManager,
}

impl<S, M> GuiAgent<S, M>
where
    S: Surface,
    M: ModelClient,
{
    pub fn new(surface: Arc<S>, model: Arc<M>) -> Self {
        Self {
            surface,
            model,
            context_builder: ContextBuilder::default(),
            limits: LoopLimits::default(),
            retries: StageRetries::default(),
            on_retry: None,
            on_data: None,
            on_error: None,
            plugins: PluginManager::default(),
        }
    }

    /// Agent with limits, retries and image window taken from `config`.
    pub fn from_config(surface: Arc<S>, model: Arc<M>, config: &AgentConfig) -> Self {
        Self::new(surface, model)
            .with_limits(LoopLimits {
                max_loop_count: config.max_loop_count,
                max_snapshot_err_cnt: config.max_snapshot_err_cnt,
                snapshot_retry_delay: Duration::from_millis(config.snapshot_retry_delay_ms),
            })
            .with_retries(config.retry.clone())
            .with_context_builder(ContextBuilder::new(config.max_images))
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retries(mut self, retries: StageRetries) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginManager) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn on_data(mut self, sink: DataSink) -> Self {
        self.on_data = Some(sink);
        self
    }

    pub fn on_error(mut self, sink: ErrorSink) -> Self {
        self.on_error = Some(sink);
        self
    }

    pub fn on_retry(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    /// Run `instruction` to completion.
    ///
    /// Returns the full session once the run has ended, including runs that
    /// hit a cap or were cancelled. A fatal error is reported to the error
    /// sink once and returned after the session is finalized.
    pub async fn run(
        &self,
        instruction: &str,
        ctx: &RunContext,
    ) -> Result<SessionSnapshot, RuntimeError> {
        info!(
            "Starting run {} with model {}",
            ctx.session_id, ctx.model_name
        );
        let mut session = Session::new(
            instruction,
            &ctx.system_prompt,
            &ctx.model_name,
            Some(self.data_sink()),
        );

        self.plugins.init().await;
        session.set_status(AgentStatus::Running);

        let result = match self.execute_loop(&mut session, ctx).await {
            Err(e) if e.is_cancelled() => {
                info!("Run {} cancelled", ctx.session_id);
                Ok(())
            }
            Err(e) => {
                error!("Run {} failed: {}", ctx.session_id, e);
                session.update(AgentStatus::End, e.to_string());
                if let Some(sink) = &self.on_error {
                    sink(
                        &session.full_snapshot(),
                        &ErrorReport {
                            code: -1,
                            error: e.to_string(),
                            stack: format!("{:?}", e),
                        },
                    );
                }
                Err(e)
            }
            Ok(()) => Ok(()),
        };

        if !session.status().is_terminal() {
            session.set_status(AgentStatus::End);
        }
        session.emit_final();
        self.plugins.cleanup().await;

        info!(
            "Run {} finished with status {:?}",
            ctx.session_id,
            session.status()
        );
        result.map(|()| session.full_snapshot())
    }

    /// User sink first, then plugins.
    fn data_sink(&self) -> DataSink {
        let user_sink = self.on_data.clone();
        let plugins = self.plugins.clone();
        Arc::new(move |snapshot: &SessionSnapshot| {
            if let Some(sink) = &user_sink {
                sink(snapshot);
            }
            plugins.on_agent_data(snapshot);
        })
    }

    async fn execute_loop(
        &self,
        session: &mut Session,
        ctx: &RunContext,
    ) -> Result<(), RuntimeError> {
        let limits = self.limits;
        let mut loop_cnt: usize = 0;
        let mut snapshot_err_cnt: usize = 0;

        loop {
            if ctx.is_cancelled() {
                session.set_status(AgentStatus::End);
                return Err(RuntimeError::Cancelled);
            }
            if session.status() != AgentStatus::Running {
                debug!("Loop stopped with status {:?}", session.status());
                return Ok(());
            }
            if loop_cnt >= limits.max_loop_count || snapshot_err_cnt >= limits.max_snapshot_err_cnt {
                let message = if loop_cnt >= limits.max_loop_count {
                    MAX_LOOP_MESSAGE
                } else {
                    SCREENSHOT_FAILURE_MESSAGE
                };
                warn!(
                    "{} (loops: {}, screenshot failures: {})",
                    message, loop_cnt, snapshot_err_cnt
                );
                session.update(AgentStatus::MaxLoop, message);
                return Ok(());
            }

            loop_cnt += 1;
            increment_loop_iterations();
            debug!("Loop iteration {}/{}", loop_cnt, limits.max_loop_count);
            let start = now_millis();

            let Some(screenshot) = self.capture(ctx).await? else {
                loop_cnt -= 1;
                snapshot_err_cnt += 1;
                increment_screenshot_failures();
                warn!(
                    "Unusable screenshot ({}/{})",
                    snapshot_err_cnt, limits.max_snapshot_err_cnt
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {}
                    _ = tokio::time::sleep(limits.snapshot_retry_delay) => {}
                }
                continue;
            };

            self.plugins.on_screenshot(&screenshot).await;
            session.append_entry(Conversation::screenshot(&screenshot, Timing::since(start)));

            let input = self
                .context_builder
                .build(session.system_prompt(), session.conversations());
            let output = self.predict(&input, ctx).await?;
            if output.prediction.trim().is_empty() {
                error!("Model returned an empty prediction");
                continue;
            }
            info!("Model response: {}", output.prediction);
            debug!("Parsed {} actions", output.parsed_predictions.len());

            session.append_entry(Conversation::prediction(
                get_summary(&output.prediction),
                output.parsed_predictions.clone(),
                screenshot.context(),
                Timing::since(start),
            ));

            for action in output.parsed_predictions {
                let kind = action.kind();
                session.set_status(match kind {
                    ActionKind::Finished | ActionKind::CallUser | ActionKind::ErrorEnv => {
                        AgentStatus::End
                    }
                    ActionKind::MaxLoop => AgentStatus::MaxLoop,
                    _ => AgentStatus::Running,
                });

                if kind == ActionKind::Wait {
                    debug!("Skipping wait action");
                    continue;
                }
                if ctx.is_cancelled() {
                    break;
                }

                let params = ExecuteParams {
                    prediction: action,
                    screen_width: screenshot.width,
                    screen_height: screenshot.height,
                    scale_factor: screenshot.scale_factor,
                };
                self.plugins.on_operator_action(&params).await;
                self.dispatch(&params, ctx).await?;

                if kind.is_terminal() {
                    break;
                }
            }
        }
    }

    /// A usable frame, or `None` when this iteration's frame is lost.
    async fn capture(&self, ctx: &RunContext) -> Result<Option<Screenshot>, RuntimeError> {
        let policy = &self.retries.screenshot;
        let result = with_retry(policy, &ctx.cancel, "screenshot", self.on_retry.as_ref(), || {
            self.surface.screenshot(ctx)
        })
        .await;
        match result {
            Ok(screenshot) if screenshot.is_valid() => Ok(Some(screenshot)),
            Ok(_) => Ok(None),
            Err(e) if e.is_cancelled() || policy.fatal => Err(e),
            Err(e) => {
                warn!("Screenshot failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn predict(
        &self,
        input: &ModelInput,
        ctx: &RunContext,
    ) -> Result<ModelOutput, RuntimeError> {
        let policy = &self.retries.model;
        let result = with_retry(policy, &ctx.cancel, "model", self.on_retry.as_ref(), || {
            self.model.invoke(input, ctx)
        })
        .await;
        match result {
            Ok(output) => Ok(output),
            Err(e) if e.is_cancelled() || policy.fatal => Err(e),
            Err(e) => {
                warn!("Model call failed: {}", e);
                Ok(ModelOutput::default())
            }
        }
    }

    async fn dispatch(&self, params: &ExecuteParams, ctx: &RunContext) -> Result<(), RuntimeError> {
        let policy = &self.retries.execute;
        let result = with_retry(policy, &ctx.cancel, "execute", self.on_retry.as_ref(), || {
            self.surface.execute(params, ctx)
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(RuntimeError::MissingCoordinates(action_type)) => {
                warn!("Skipping {}: no coordinates", action_type);
                Ok(())
            }
            Err(e) if e.is_cancelled() || policy.fatal => Err(e),
            Err(e) => {
                warn!(
                    "Action {} failed, skipping: {}",
                    params.prediction.action_type, e
                );
                Ok(())
            }
        }
    }
}
