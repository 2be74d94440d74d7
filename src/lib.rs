pub mod bus;
pub mod config;
pub mod error;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::{AppError, ChatError, ValidationField};
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use bus::{BroadcastBus, Inbox, Message, MessageKind};
pub use hub::ChatHub;
pub use presence::PresenceTracker;
pub use registry::{OnlineUser, SessionId, SessionRegistry};

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and online count
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "online": state.hub.online_count().await,
    }))
}

/// Current online list, in join order
pub async fn online_users(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.hub.registry.snapshot().await;
    HttpResponse::Ok().json(serde_json::json!({
        "revision": snapshot.revision,
        "users": snapshot.online,
    }))
}

pub async fn avatars(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "avatars": state.hub.chat.avatars,
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub hub: Arc<ChatHub>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let hub = Arc::new(ChatHub::new(config.chat.clone()));
        Self {
            config: Arc::new(config),
            hub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config);

        let cloned = state.clone();

        // Verify Arc references are shared
        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.hub, &cloned.hub));
    }

    #[tokio::test]
    async fn test_hub_uses_configured_capacity() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config);
        assert_eq!(state.hub.bus.queue_capacity(), 16);
        assert_eq!(state.hub.online_count().await, 0);
    }
}
