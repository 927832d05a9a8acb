//! Observable run state.
//!
//! The session exposes only controlled mutations. Each one computes its own
//! delta and hands it to the data sink synchronously, so observers see entries
//! in append order and never before the append has happened.

use crate::types::{now_millis, AgentStatus, Conversation, SessionSnapshot};
use std::sync::Arc;

/// Receives every session change.
pub type DataSink = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

pub struct Session {
    status: AgentStatus,
    instruction: String,
    system_prompt: String,
    model_name: String,
    log_time: i64,
    conversations: Vec<Conversation>,
    err_msg: Option<String>,
    sink: Option<DataSink>,
}

impl Session {
    /// Start a session whose history opens with the instruction turn. The
    /// opening turn is part of every snapshot but is not announced by itself.
    pub fn new(
        instruction: &str,
        system_prompt: &str,
        model_name: &str,
        sink: Option<DataSink>,
    ) -> Self {
        Self {
            status: AgentStatus::Init,
            instruction: instruction.to_string(),
            system_prompt: system_prompt.to_string(),
            model_name: model_name.to_string(),
            log_time: now_millis(),
            conversations: vec![Conversation::instruction(instruction)],
            err_msg: None,
            sink,
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn err_msg(&self) -> Option<&str> {
        self.err_msg.as_deref()
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Full history, read-only.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Append a turn and announce exactly that turn.
    pub fn append_entry(&mut self, entry: Conversation) {
        self.conversations.push(entry.clone());
        self.notify(vec![entry]);
    }

    /// Returns whether the status changed (and was announced).
    pub fn set_status(&mut self, status: AgentStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.notify(Vec::new());
        true
    }

    pub fn set_err_msg(&mut self, err_msg: impl Into<String>) -> bool {
        let err_msg = Some(err_msg.into());
        if self.err_msg == err_msg {
            return false;
        }
        self.err_msg = err_msg;
        self.notify(Vec::new());
        true
    }

    /// Set status and error together; one notification per field that changed.
    pub fn update(&mut self, status: AgentStatus, err_msg: impl Into<String>) -> usize {
        usize::from(self.set_status(status)) + usize::from(self.set_err_msg(err_msg))
    }

    /// Unconditional notification sent when a run ends.
    pub fn emit_final(&self) {
        self.notify(Vec::new());
    }

    /// Snapshot carrying the whole history.
    pub fn full_snapshot(&self) -> SessionSnapshot {
        self.snapshot(self.conversations.clone())
    }

    fn snapshot(&self, conversations: Vec<Conversation>) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            instruction: self.instruction.clone(),
            system_prompt: self.system_prompt.clone(),
            model_name: self.model_name.clone(),
            log_time: self.log_time,
            conversations,
            err_msg: self.err_msg.clone(),
        }
    }

    fn notify(&self, conversations: Vec<Conversation>) {
        if let Some(sink) = &self.sink {
            sink(&self.snapshot(conversations));
        }
    }
}
