//! AI consultant chat: locally cached conversations plus forwarding to the
//! backend analysis endpoints.
//!
//! Sessions are a convenience cache. A stored list that no longer decodes
//! is dropped rather than migrated.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::db::LocalStore;
use crate::error::{ApiError, ApiResult, StoreError};
use crate::models::ReportData;

const CATEGORY: &str = "assistant";
const KEY_SESSIONS: &str = "aiChatSessions";

pub const NEW_SESSION_TITLE: &str = "New Conversation";
pub const TITLE_MAX_CHARS: usize = 30;
pub const REPLY_REJECTED: &str = "I encountered an error analyzing the data.";
pub const REPLY_UNREACHABLE: &str = "Sorry, I can't reach the server right now.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ai,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    /// Creation time, unix milliseconds as a string.
    pub date: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
}

pub fn greeting(context_name: &str) -> String {
    format!(
        "Hello! I'm your AI Restaurant Consultant. I have access to your **{context_name}** data. Ask me anything!"
    )
}

/// First 30 characters of the message, with `...` when it was cut.
pub fn derive_title(first_user_message: &str) -> String {
    let mut title: String = first_user_message.chars().take(TITLE_MAX_CHARS).collect();
    if first_user_message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

impl ChatSession {
    pub fn new(context_name: &str) -> Self {
        let date = Utc::now().timestamp_millis().to_string();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            title: NEW_SESSION_TITLE.to_string(),
            messages: vec![ChatMessage::ai(greeting(context_name))],
        }
    }

    /// Append a message. The title is taken from the first user message
    /// and never changes after that.
    pub fn push(&mut self, message: ChatMessage) {
        let had_user_message = self.messages.iter().any(|m| m.role == Role::User);
        if !had_user_message && message.role == Role::User {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
    }
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn chat(&self, message: &str, context: &Value) -> ApiResult<String>;
    async fn analyze_report(&self, report: &ReportData) -> ApiResult<String>;
}

#[async_trait]
impl AnalysisApi for ApiClient {
    async fn chat(&self, message: &str, context: &Value) -> ApiResult<String> {
        ApiClient::chat(self, message, context).await
    }

    async fn analyze_report(&self, report: &ReportData) -> ApiResult<String> {
        ApiClient::analyze_report(self, report).await
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// All conversations, newest first, plus which one is open.
#[derive(Debug, Default)]
pub struct ChatHistory {
    sessions: Vec<ChatSession>,
    current: Option<String>,
}

impl ChatHistory {
    pub fn load(store: &LocalStore) -> Self {
        let sessions = match store.get_json::<Vec<ChatSession>>(CATEGORY, KEY_SESSIONS) {
            Ok(Some(sessions)) => sessions,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "chat history unreadable");
                Vec::new()
            }
        };
        debug!(sessions = sessions.len(), "chat history loaded");
        Self {
            sessions,
            current: None,
        }
    }

    pub fn save(&self, store: &LocalStore) -> Result<(), StoreError> {
        store.set_json(CATEGORY, KEY_SESSIONS, &self.sessions)
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn current(&self) -> Option<&ChatSession> {
        let id = self.current.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    fn current_mut(&mut self) -> Option<&mut ChatSession> {
        let id = self.current.clone()?;
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn start_new(&mut self, context_name: &str) -> &ChatSession {
        let session = ChatSession::new(context_name);
        self.current = Some(session.id.clone());
        self.sessions.insert(0, session);
        &self.sessions[0]
    }

    /// Open the most recent conversation, or start one if there are none.
    pub fn open(&mut self, context_name: &str) -> &ChatSession {
        match self.sessions.first().map(|s| s.id.clone()) {
            Some(id) if self.current.is_none() => {
                self.current = Some(id);
            }
            Some(_) => {}
            None => {
                self.start_new(context_name);
            }
        }
        match self.current.as_deref() {
            Some(id) => {
                let idx = self.sessions.iter().position(|s| s.id == id).unwrap_or(0);
                &self.sessions[idx]
            }
            None => &self.sessions[0],
        }
    }

    pub fn select(&mut self, id: &str) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            self.current = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Remove a conversation. Deleting the open one moves to the newest
    /// remaining conversation, or a fresh one.
    pub fn delete(&mut self, id: &str, context_name: &str) {
        self.sessions.retain(|s| s.id != id);
        if self.current.as_deref() == Some(id) {
            self.current = None;
            self.open(context_name);
        }
    }

    /// Send a question from the open conversation and record the reply.
    /// Backend failures become an apologetic reply rather than an error.
    pub async fn send(
        &mut self,
        api: &dyn AnalysisApi,
        context_name: &str,
        input: &str,
        context: &Value,
    ) -> Option<&ChatMessage> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }
        if self.current().is_none() {
            self.open(context_name);
        }
        self.current_mut()?.push(ChatMessage::user(text));

        let reply = match api.chat(text, context).await {
            Ok(answer) => answer,
            Err(ApiError::Rejected { message }) => {
                warn!(%message, "assistant declined the question");
                REPLY_REJECTED.to_string()
            }
            Err(e) => {
                warn!(error = %e, "assistant unreachable");
                REPLY_UNREACHABLE.to_string()
            }
        };

        let session = self.current_mut()?;
        session.push(ChatMessage::ai(reply));
        session.messages.last()
    }
}

/// One-shot narrative analysis of a monthly report.
pub async fn analyze(api: &dyn AnalysisApi, report: &ReportData) -> ApiResult<String> {
    let text = api.analyze_report(report).await?;
    debug!(chars = text.len(), "report analysis received");
    Ok(text)
}
