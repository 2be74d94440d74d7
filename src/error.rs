use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::registry::SessionId;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Chat error: {0}")]
    ChatError(#[from] ChatError),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ChatError(e) => match e {
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::NameTaken(_) => StatusCode::CONFLICT,
                ChatError::UnknownSession(_) => StatusCode::NOT_FOUND,
                ChatError::ConnectionClosed => StatusCode::GONE,
                ChatError::NotJoined | ChatError::AlreadyJoined => StatusCode::CONFLICT,
            },
            AppError::WebSocketError(WebSocketError::InvalidFormat(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The input field a rejected request failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationField {
    BlankName,
    NoAvatarSelected,
    UnknownAvatar,
    MessageTooLong,
}

impl std::fmt::Display for ValidationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ValidationField::BlankName => "Name cannot be blank",
            ValidationField::NoAvatarSelected => "Please select an avatar",
            ValidationField::UnknownAvatar => "Selected avatar does not exist",
            ValidationField::MessageTooLong => "Message is too long",
        };
        f.write_str(text)
    }
}

/// Errors returned to the caller of a chat operation. None of them are fatal to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Validation failed: {0}")]
    Validation(ValidationField),

    #[error("Name '{0}' is already taken")]
    NameTaken(String),

    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Join the chat first")]
    NotJoined,

    #[error("Already joined")]
    AlreadyJoined,
}

impl ChatError {
    /// Stable identifier sent to clients in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::NameTaken(_) => "name_taken",
            ChatError::UnknownSession(_) => "unknown_session",
            ChatError::ConnectionClosed => "connection_closed",
            ChatError::NotJoined => "not_joined",
            ChatError::AlreadyJoined => "already_joined",
        }
    }

    pub fn field(&self) -> Option<ValidationField> {
        match self {
            ChatError::Validation(field) => Some(*field),
            _ => None,
        }
    }
}

impl From<ValidationField> for ChatError {
    fn from(field: ValidationField) -> Self {
        ChatError::Validation(field)
    }
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for WebSocketError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        WebSocketError::ConnectionError(err.to_string())
    }
}
