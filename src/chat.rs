//! Running conversation with the tutor persona.
//!
//! The transcript is append-only and replayed in full on every turn. The
//! persona-setting instruction pair rides along only with the very first
//! request and never shows up in the transcript itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::gemini::{ApiError, ApiPayload, Content, Role};

pub const SYSTEM_INSTRUCTION: &str = "You are an expert academic mentor. Your goal is to help the user understand concepts deeply. Be accurate, patient, and clear. Use step-by-step explanations for complex problems.";
pub const SYSTEM_ACKNOWLEDGMENT: &str = "Understood. I am ready to help you master this subject with accurate and clear guidance.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Ai,
}

impl ChatRole {
    fn wire_role(&self) -> Role {
        match self {
            ChatRole::User => Role::User,
            ChatRole::Ai => Role::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    #[default]
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChatRejection {
    #[error("message is empty")]
    EmptyMessage,
    #[error("still waiting for the previous reply")]
    AwaitingResponse,
}

#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    state: ChatState,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        self.state == ChatState::AwaitingResponse
    }

    /// Idle → AwaitingResponse. Records the user turn and returns the request to send.
    pub fn submit(&mut self, input: &str) -> Result<ApiPayload, ChatRejection> {
        let message = input.trim();
        if message.is_empty() {
            return Err(ChatRejection::EmptyMessage);
        }
        if self.is_awaiting() {
            return Err(ChatRejection::AwaitingResponse);
        }

        let mut contents = Vec::with_capacity(self.transcript.len() + 3);
        if self.transcript.is_empty() {
            contents.push(Content::new(Role::User, SYSTEM_INSTRUCTION));
            contents.push(Content::new(Role::Model, SYSTEM_ACKNOWLEDGMENT));
        }
        contents.extend(
            self.transcript
                .iter()
                .map(|msg| Content::new(msg.role.wire_role(), msg.text.clone())),
        );
        contents.push(Content::new(Role::User, message));

        self.transcript.push(ChatMessage {
            role: ChatRole::User,
            text: message.to_string(),
        });
        self.state = ChatState::AwaitingResponse;
        debug!(turns = contents.len(), "Chat turn submitted");

        Ok(ApiPayload { contents })
    }

    /// AwaitingResponse → Idle. Failures become an ai message describing the error.
    pub fn complete(&mut self, result: Result<String, ApiError>) {
        if !self.is_awaiting() {
            warn!("Chat reply arrived while idle, dropping it");
            return;
        }

        let text = match result {
            Ok(text) => text,
            // Status failures show the server message alone
            Err(ApiError::Status { message, .. }) => format!("Error: {}", message),
            Err(e) => format!("Error: {}", e),
        };
        self.transcript.push(ChatMessage { role: ChatRole::Ai, text });
        self.state = ChatState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::Part;
    use reqwest::StatusCode;

    fn texts(payload: &ApiPayload) -> Vec<(Option<Role>, String)> {
        payload
            .contents
            .iter()
            .map(|c| {
                let text = match &c.parts[0] {
                    Part::Text { text } => text.clone(),
                    Part::InlineData { .. } => String::new(),
                };
                (c.role, text)
            })
            .collect()
    }

    #[test]
    fn test_first_turn_carries_system_pair() {
        let mut chat = ChatSession::new();
        let payload = chat.submit("  What is entropy?  ").unwrap();

        assert_eq!(
            texts(&payload),
            vec![
                (Some(Role::User), SYSTEM_INSTRUCTION.to_string()),
                (Some(Role::Model), SYSTEM_ACKNOWLEDGMENT.to_string()),
                (Some(Role::User), "What is entropy?".to_string()),
            ]
        );
        assert_eq!(chat.transcript().len(), 1);
        assert_eq!(chat.state(), ChatState::AwaitingResponse);
    }

    #[test]
    fn test_second_turn_replays_without_duplicating_system_pair() {
        let mut chat = ChatSession::new();
        chat.submit("What is entropy?").unwrap();
        chat.complete(Ok("A measure of disorder.".to_string()));

        let payload = chat.submit("Give an example").unwrap();
        let sent = texts(&payload);

        assert_eq!(
            sent,
            vec![
                (Some(Role::User), "What is entropy?".to_string()),
                (Some(Role::Model), "A measure of disorder.".to_string()),
                (Some(Role::User), "Give an example".to_string()),
            ]
        );
        assert!(!sent.iter().any(|(_, t)| t == SYSTEM_INSTRUCTION));
    }

    #[test]
    fn test_failure_appends_error_message() {
        let mut chat = ChatSession::new();
        chat.submit("hi").unwrap();
        chat.complete(Err(ApiError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "quota exceeded".to_string(),
        }));

        let last = chat.transcript().last().unwrap();
        assert_eq!(last.role, ChatRole::Ai);
        assert_eq!(last.text, "Error: quota exceeded");
        assert_eq!(chat.state(), ChatState::Idle);
    }

    #[test]
    fn test_rejections() {
        let mut chat = ChatSession::new();
        assert_eq!(chat.submit("   "), Err(ChatRejection::EmptyMessage));
        assert!(chat.transcript().is_empty());

        chat.submit("first").unwrap();
        assert_eq!(chat.submit("second"), Err(ChatRejection::AwaitingResponse));
        assert_eq!(chat.transcript().len(), 1);
    }

    #[test]
    fn test_stray_completion_is_ignored() {
        let mut chat = ChatSession::new();
        chat.complete(Ok("unsolicited".to_string()));
        assert!(chat.transcript().is_empty());
    }
}
