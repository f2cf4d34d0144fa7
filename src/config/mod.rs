//! Layered configuration (defaults → TOML file → environment).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::broker::QueueBinding;
use crate::error::{CourierError, Result};

/// Broker naming and consumer tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MessagingConfig {
    /// Exchange chat jobs are published to.
    pub chat_exchange: String,
    /// Queue chat jobs are consumed from.
    pub chat_queue: String,
    /// Routing key binding the two.
    pub chat_routing_key: String,
    /// Exchange completed transcripts are published to.
    pub history_exchange: String,
    /// Queue history persistence consumes from.
    pub history_queue: String,
    /// Routing key binding the two.
    pub history_routing_key: String,
    /// Concurrent consumers pulling chat jobs.
    pub concurrency: usize,
    /// End-to-end deadline for a blocking request.
    pub request_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            chat_exchange: "chat.exchange".to_string(),
            chat_queue: "chat.queue".to_string(),
            chat_routing_key: "chat.routing".to_string(),
            history_exchange: "chat.history.exchange".to_string(),
            history_queue: "chat.history.queue".to_string(),
            history_routing_key: "chat.history.routing".to_string(),
            concurrency: 3,
            request_timeout_ms: 45_000,
        }
    }
}

impl MessagingConfig {
    /// End-to-end deadline for a blocking request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Binding for the chat job queue.
    pub fn chat_binding(&self) -> QueueBinding {
        QueueBinding {
            exchange: self.chat_exchange.clone(),
            queue: self.chat_queue.clone(),
            routing_key: self.chat_routing_key.clone(),
        }
    }

    /// Binding for the history persistence queue.
    pub fn history_binding(&self) -> QueueBinding {
        QueueBinding {
            exchange: self.history_exchange.clone(),
            queue: self.history_queue.clone(),
            routing_key: self.history_routing_key.clone(),
        }
    }
}

/// Streaming connection tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Keep-alive interval while a connection is open.
    pub heartbeat_interval_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 15_000,
        }
    }
}

impl StreamingConfig {
    /// Keep-alive interval while a connection is open.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Model pipeline endpoint settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL of the chat-completions API, without a trailing slash.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Model invoked for every job; wins over the model a client asked
    /// for when recording history.
    pub model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            model: "default".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CourierConfig {
    pub messaging: MessagingConfig,
    pub streaming: StreamingConfig,
    pub pipeline: PipelineConfig,
}

impl CourierConfig {
    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| CourierError::Configuration(e.to_string()))
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Defaults with environment overrides applied.
    ///
    /// A `.env` file is honored if present. Recognized variables:
    /// `COURIER_BASE_URL`, `COURIER_API_KEY`, `COURIER_MODEL`,
    /// `COURIER_CONCURRENCY`, `COURIER_REQUEST_TIMEOUT_MS`,
    /// `COURIER_HEARTBEAT_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("COURIER_BASE_URL") {
            self.pipeline.base_url = url;
        }
        if let Ok(key) = std::env::var("COURIER_API_KEY") {
            self.pipeline.api_key = key;
        }
        if let Ok(model) = std::env::var("COURIER_MODEL") {
            self.pipeline.model = model;
        }
        if let Some(concurrency) = env_parse("COURIER_CONCURRENCY") {
            self.messaging.concurrency = concurrency;
        }
        if let Some(timeout) = env_parse("COURIER_REQUEST_TIMEOUT_MS") {
            self.messaging.request_timeout_ms = timeout;
        }
        if let Some(interval) = env_parse("COURIER_HEARTBEAT_INTERVAL_MS") {
            self.streaming.heartbeat_interval_ms = interval;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
