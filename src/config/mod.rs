use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_AVATARS: [&str; 4] = [
    "https://via.placeholder.com/40/FF5733/FFFFFF?text=A",
    "https://via.placeholder.com/40/33FF57/FFFFFF?text=B",
    "https://via.placeholder.com/40/3357FF/FFFFFF?text=C",
    "https://via.placeholder.com/40/FF33A6/FFFFFF?text=D",
];

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ws_port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Per-session inbound queue capacity before the oldest message is dropped.
    pub queue_capacity: usize,
    pub max_message_chars: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub avatars: Vec<String>,
}

impl ChatConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn avatar(&self, index: usize) -> Option<&str> {
        self.avatars.get(index).map(String::as_str)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_message_chars: 2000,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 40,
            avatars: DEFAULT_AVATARS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub cors: CorsConfig,
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
    environment: &str,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let chat = ChatConfig::default();
    builder
        .set_default("environment", environment)?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.ws_port", 8081)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("chat.queue_capacity", chat.queue_capacity as i64)?
        .set_default("chat.max_message_chars", chat.max_message_chars as i64)?
        .set_default("chat.heartbeat_interval_secs", chat.heartbeat_interval_secs as i64)?
        .set_default("chat.client_timeout_secs", chat.client_timeout_secs as i64)?
        .set_default("chat.avatars", chat.avatars)?
        .set_default("cors.enabled", true)?
        .set_default("cors.allow_any_origin", true)?
        .set_default("cors.max_age", 3600)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults(Config::builder(), "development")?
            // Optional config files, then `APP_` environment variables,
            // e.g. `APP_CHAT__QUEUE_CAPACITY=64` sets `Settings.chat.queue_capacity`
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }

    /// Defaults only, no files and no environment, so tests are deterministic.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        with_defaults(Config::builder(), "test")?
            .set_override("server.port", 0)?
            .set_override("server.ws_port", 0)?
            .set_override("chat.queue_capacity", 16)?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleanup_env() {
        env::remove_var("APP_SERVER__PORT");
        env::remove_var("APP_SERVER__WS_PORT");
        env::remove_var("APP_CHAT__QUEUE_CAPACITY");
        env::remove_var("APP_CHAT__CLIENT_TIMEOUT_SECS");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new_for_test().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.server.workers as usize, num_cpus::get());
        assert_eq!(settings.chat.queue_capacity, 16);
        assert_eq!(settings.chat.avatars.len(), 4);
        assert_eq!(settings.chat.heartbeat_interval(), Duration::from_secs(30));
        assert!(settings.cors.enabled);
    }

    #[test]
    fn test_environment_override() {
        cleanup_env();

        env::set_var("APP_SERVER__WS_PORT", "9001");
        env::set_var("APP_CHAT__QUEUE_CAPACITY", "8");
        env::set_var("APP_CHAT__CLIENT_TIMEOUT_SECS", "90");

        let config = with_defaults(Config::builder(), "test")
            .expect("Failed to set defaults")
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()
            .expect("Failed to build config")
            .try_deserialize::<Settings>()
            .expect("Failed to deserialize settings");

        assert_eq!(config.server.ws_port, 9001);
        assert_eq!(config.chat.queue_capacity, 8);
        assert_eq!(config.chat.client_timeout(), Duration::from_secs(90));
        assert_eq!(config.chat.max_message_chars, 2000);

        cleanup_env();
    }

    #[test]
    fn test_avatar_lookup() {
        let chat = ChatConfig::default();
        assert_eq!(chat.avatar(1), Some(DEFAULT_AVATARS[1]));
        assert_eq!(chat.avatar(4), None);
    }
}
