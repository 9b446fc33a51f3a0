//! Client for the upstream chat API: sessions, messages and per-character
//! configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::ttl_cache::TtlCache;
use crate::config::settings::CacheSettings;
use crate::error::ExecutorError;
use crate::executor::request::{BoundedExecutor, UpstreamCall};
use crate::helpers::schedule::PeriodicTask;
use crate::helpers::time::SharedClock;

pub const SESSIONS_PATH: &str = "/v2/chat/sessions";
pub const CHAT_PATH: &str = "/v2/chat";
pub const CONFIG_PATH_PREFIX: &str = "/genie/config";

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    config_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    config_id: &'a str,
    input: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionRef {
    pub id: String,
}

/// Reply to a session creation. The id shows up under one of several keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionCreated {
    pub session_id: Option<String>,
    pub id: Option<String>,
    pub session: Option<SessionRef>,
}

impl SessionCreated {
    pub fn id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .or(self.id.as_deref())
            .or(self.session.as_ref().map(|s| s.id.as_str()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatReply {
    pub ai: Option<String>,
    pub session: SessionRef,
    pub request_id: Option<String>,
    pub text_response_cleaned: Option<String>,
    pub warning_message: Option<String>,
}

#[derive(Clone)]
pub struct ChatClient {
    executor: BoundedExecutor,
    configs: TtlCache<String, Value>,
}

impl ChatClient {
    pub fn new(executor: BoundedExecutor, settings: &CacheSettings, clock: SharedClock) -> Self {
        Self {
            executor,
            configs: TtlCache::new("config", settings.ttl(), clock),
        }
    }

    pub fn config_cache(&self) -> &TtlCache<String, Value> {
        &self.configs
    }

    pub fn start_config_sweeper(&self, period: std::time::Duration) -> PeriodicTask {
        self.configs.start_sweeper(period)
    }

    pub async fn create_session(&self, config_id: &str) -> Result<SessionCreated, ExecutorError> {
        let body = serde_json::to_value(CreateSessionBody { config_id })
            .map_err(|e| ExecutorError::Decode(e.to_string()))?;
        let created: SessionCreated = self
            .executor
            .execute(UpstreamCall::post("chat_sessions", SESSIONS_PATH, body))
            .await?
            .json()?;
        info!(config_id, session_id = created.id(), "chat session created");
        Ok(created)
    }

    pub async fn send_message(
        &self,
        config_id: &str,
        input: &str,
        session_id: &str,
    ) -> Result<ChatReply, ExecutorError> {
        let body = serde_json::to_value(SendMessageBody { config_id, input, session_id })
            .map_err(|e| ExecutorError::Decode(e.to_string()))?;
        let reply: ChatReply = self
            .executor
            .execute(UpstreamCall::post("chat", CHAT_PATH, body))
            .await?
            .json()?;
        if let Some(warning) = reply.warning_message.as_deref() {
            info!(config_id, session_id, warning, "upstream chat returned a warning");
        }
        Ok(reply)
    }

    /// Configuration for `config_id`, read through the TTL cache.
    ///
    /// `Ok(None)` when the upstream has no such configuration; that outcome is not cached.
    pub async fn fetch_config(&self, config_id: &str) -> Result<Option<Value>, ExecutorError> {
        let path = format!("{}/{}", CONFIG_PATH_PREFIX, config_id);
        let executor = &self.executor;
        let fetched = self
            .configs
            .get_or_fetch(config_id.to_owned(), || async move {
                executor
                    .execute(UpstreamCall::get("config", path).lookup())
                    .await?
                    .json::<Value>()
            })
            .await;

        match fetched {
            Ok(config) => Ok(Some(config)),
            Err(e) if e.is_not_found() => {
                debug!(config_id, "upstream has no configuration");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
