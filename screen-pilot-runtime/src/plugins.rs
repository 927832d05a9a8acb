//! Side-channel observers of a run.
//!
//! Plugins see every screenshot, every dispatched action and every session
//! notification. A failing plugin is logged and skipped; it never stops the loop.

use crate::interfaces::RuntimeError;
use crate::types::{now_millis, ExecuteParams, Screenshot, SessionSnapshot};
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn on_screenshot(&self, _screenshot: &Screenshot) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn on_operator_action(&self, _params: &ExecuteParams) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Called synchronously with every session notification.
    fn on_agent_data(&self, _snapshot: &SessionSnapshot) {}
}

/// Calls plugin hooks in registration order.
#[derive(Default, Clone)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        info!("Registered plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub async fn init(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.init().await {
                warn!("Plugin {} failed to init: {}", plugin.name(), e);
            }
        }
    }

    pub async fn cleanup(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.cleanup().await {
                warn!("Plugin {} failed to clean up: {}", plugin.name(), e);
            }
        }
    }

    pub async fn on_screenshot(&self, screenshot: &Screenshot) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.on_screenshot(screenshot).await {
                warn!("Plugin {} on_screenshot failed: {}", plugin.name(), e);
            }
        }
    }

    pub async fn on_operator_action(&self, params: &ExecuteParams) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.on_operator_action(params).await {
                warn!("Plugin {} on_operator_action failed: {}", plugin.name(), e);
            }
        }
    }

    pub fn on_agent_data(&self, snapshot: &SessionSnapshot) {
        for plugin in &self.plugins {
            plugin.on_agent_data(snapshot);
        }
    }
}

/// Filesystem-safe UTC timestamp for output names.
fn file_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Agent,
    Operator,
    System,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: TraceKind,
    pub title: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Collects a trace of the run and writes `trace-<timestamp>.json` on cleanup.
pub struct DumpTracePlugin {
    output_dir: PathBuf,
    start_time: i64,
    steps: Mutex<Vec<TraceStep>>,
}

impl DumpTracePlugin {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            start_time: now_millis(),
            steps: Mutex::new(Vec::new()),
        }
    }

    fn add_step(&self, kind: TraceKind, title: impl Into<String>, details: Value) {
        self.steps.lock().push(TraceStep {
            timestamp: now_millis(),
            kind,
            title: title.into(),
            details,
            screenshot: None,
        });
    }

    pub fn steps(&self) -> Vec<TraceStep> {
        self.steps.lock().clone()
    }

    /// Write the collected trace and return its path.
    pub async fn write(&self) -> Result<PathBuf, RuntimeError> {
        let path = self
            .output_dir
            .join(format!("trace-{}.json", file_timestamp()));
        let body = serde_json::to_vec_pretty(&json!({
            "startTime": self.start_time,
            "steps": self.steps(),
        }))?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

#[async_trait]
impl Plugin for DumpTracePlugin {
    fn name(&self) -> &str {
        "dump-trace"
    }

    async fn init(&self) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        self.add_step(
            TraceKind::System,
            "Plugin Initialized",
            json!({ "timestamp": self.start_time }),
        );
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), RuntimeError> {
        self.add_step(
            TraceKind::System,
            "Session Ended",
            json!({ "duration": now_millis() - self.start_time }),
        );
        let path = self.write().await?;
        info!("Trace saved to: {}", path.display());
        Ok(())
    }

    async fn on_screenshot(&self, screenshot: &Screenshot) -> Result<(), RuntimeError> {
        if let Some(last) = self.steps.lock().last_mut() {
            last.screenshot = Some(screenshot.base64.clone());
        }
        Ok(())
    }

    async fn on_operator_action(&self, params: &ExecuteParams) -> Result<(), RuntimeError> {
        let action = &params.prediction;
        self.add_step(
            TraceKind::Operator,
            format!("Executing {}", action.action_type),
            json!({
                "action_type": action.action_type,
                "action_inputs": action.action_inputs,
                "thought": action.thought,
            }),
        );
        Ok(())
    }

    fn on_agent_data(&self, snapshot: &SessionSnapshot) {
        self.add_step(
            TraceKind::Agent,
            "Agent Data",
            json!({
                "status": snapshot.status,
                "conversations": snapshot.conversations,
            }),
        );
    }
}

/// Saves every screenshot as `screenshot-<timestamp>.png`.
pub struct LocalScreenshotPlugin {
    output_dir: PathBuf,
}

impl LocalScreenshotPlugin {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl Plugin for LocalScreenshotPlugin {
    fn name(&self) -> &str {
        "local-screenshot"
    }

    async fn init(&self) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    async fn on_screenshot(&self, screenshot: &Screenshot) -> Result<(), RuntimeError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(screenshot.base64.as_bytes())
            .map_err(|e| RuntimeError::Plugin(format!("screenshot is not base64: {}", e)))?;
        let path = self
            .output_dir
            .join(format!("screenshot-{}.png", file_timestamp()));
        tokio::fs::write(&path, bytes).await?;
        info!("Screenshot saved to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use screen_pilot_parser::ParsedAction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn frame(base64: &str) -> Screenshot {
        Screenshot {
            base64: base64.to_string(),
            width: 10,
            height: 10,
            scale_factor: 1.0,
        }
    }

    struct FailingPlugin {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_screenshot(&self, _screenshot: &Screenshot) -> Result<(), RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RuntimeError::Plugin("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failing_plugin_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let failing = Arc::new(FailingPlugin {
            calls: AtomicUsize::new(0),
        });
        let saver = Arc::new(LocalScreenshotPlugin::new(dir.path()));

        let mut manager = PluginManager::new();
        manager.register(failing.clone());
        manager.register(saver);
        manager.init().await;
        manager.on_screenshot(&frame("iVBORw0KGgo=")).await;

        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        let saved = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(saved, 1);
    }

    #[tokio::test]
    async fn test_local_screenshot_rejects_bad_base64() {
        let dir = TempDir::new().unwrap();
        let plugin = LocalScreenshotPlugin::new(dir.path());
        plugin.init().await.unwrap();
        let result = plugin.on_screenshot(&frame("not base64!!")).await;
        assert!(matches!(result, Err(RuntimeError::Plugin(_))));
    }

    #[tokio::test]
    async fn test_dump_trace_writes_json() {
        let dir = TempDir::new().unwrap();
        let plugin = DumpTracePlugin::new(dir.path().join("traces"));
        plugin.init().await.unwrap();

        let action = ParsedAction::new("click").with_input("start_box", "[0.1,0.1,0.1,0.1]");
        plugin
            .on_operator_action(&ExecuteParams {
                prediction: action,
                screen_width: 100,
                screen_height: 100,
                scale_factor: 1.0,
            })
            .await
            .unwrap();
        plugin.on_screenshot(&frame("AAAA")).await.unwrap();
        plugin.cleanup().await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("traces"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("trace-") && name.ends_with(".json"));

        let trace: Value = serde_json::from_slice(&std::fs::read(&entries[0]).unwrap()).unwrap();
        let steps = trace["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1]["type"], "operator");
        assert_eq!(steps[1]["title"], "Executing click");
        assert_eq!(steps[1]["screenshot"], "AAAA");
        assert_eq!(steps[2]["title"], "Session Ended");
    }
}
