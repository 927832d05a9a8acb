use crate::cli::RunArgs;
use anyhow::{Context, Result};
use screen_pilot_providers::{OpenAICompatibleProvider, VlmProvider};
use screen_pilot_runtime::types::now_millis;
use screen_pilot_runtime::{
    load_agent_config, summarize_steps, AgentConfig, AgentStatus, DataSink, DesktopSurface,
    DumpTracePlugin, GuiAgent, LocalScreenshotPlugin, PluginManager, RunContext, SessionSnapshot,
    Speaker, StepRecorder, VlmExtractor, VlmModel,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Load the agent config: the file when given, defaults otherwise, then
/// `SCREEN_PILOT_*` overrides read through `lookup`.
pub fn resolve_config<F>(args: &RunArgs, lookup: F) -> Result<AgentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => load_agent_config(&path.to_string_lossy())
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AgentConfig::default(),
    };
    config.apply_env_overrides(lookup);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print each prediction as it arrives.
fn console_sink() -> DataSink {
    Arc::new(|snapshot: &SessionSnapshot| {
        for entry in &snapshot.conversations {
            if entry.from == Speaker::Gpt {
                println!("🤖 {}", entry.value);
            }
        }
    })
}

pub async fn run(args: RunArgs) -> Result<AgentStatus> {
    let config = resolve_config(&args, |key| std::env::var(key).ok())?;
    println!("💬 Instruction: {}", args.instruction);
    println!("🧠 Model: {} @ {}", config.model.model, config.model.base_url);

    let params = config.model.generation_params();
    let provider: Arc<dyn VlmProvider> = Arc::new(OpenAICompatibleProvider::new(
        config.model.base_url.clone(),
        config.model.api_key.clone(),
        config.model.model.clone(),
    ));
    let model = Arc::new(VlmModel::new(provider.clone(), params.clone()));
    let surface = Arc::new(DesktopSurface::new().with_physical_pointer(args.physical_pointer));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            ctrl_c.cancel();
        }
    });

    let mut plugins = PluginManager::new();
    if let Some(dir) = &config.plugins.trace_dir {
        plugins.register(Arc::new(DumpTracePlugin::new(dir)));
    }
    if let Some(dir) = &config.plugins.screenshot_dir {
        plugins.register(Arc::new(LocalScreenshotPlugin::new(dir)));
    }
    let recorder = if args.summarize {
        let extractor = VlmExtractor::new(provider.clone(), params.clone()).with_cancel(cancel.clone());
        let recorder = Arc::new(StepRecorder::with_concurrency(
            Some(Arc::new(extractor)),
            config.extraction_concurrency,
        ));
        plugins.register(recorder.clone());
        Some(recorder)
    } else {
        None
    };

    let ctx = RunContext::new(format!("run-{}", now_millis()), config.model.model.clone())
        .with_factor(config.model.factor())
        .with_system_prompt(config.system_prompt.clone())
        .with_search_engine(config.search_engine.clone())
        .with_cancel(cancel.clone());

    let agent = GuiAgent::from_config(surface, model, &config)
        .with_plugins(plugins)
        .on_data(console_sink());

    let snapshot = agent
        .run(&args.instruction, &ctx)
        .await
        .context("Agent run failed")?;

    println!("\n✅ Status: {:?}", snapshot.status);
    if let Some(err_msg) = &snapshot.err_msg {
        println!("⚠️  {}", err_msg);
    }

    if let Some(recorder) = recorder {
        let steps = recorder.finish().await;
        info!("Summarizing {} steps", steps.len());
        if cancel.is_cancelled() {
            warn!("Run was interrupted, skipping summary");
        } else {
            let summary = summarize_steps(provider.as_ref(), &params, &args.instruction, &steps, &cancel)
                .await
                .context("Failed to summarize run")?;
            println!("\n📝 Summary:\n{}", summary);
        }
    }

    Ok(snapshot.status)
}
