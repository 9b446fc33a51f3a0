use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::helpers::time::{capped_minutes, MAX_LIFETIME_SECONDS};

pub const API_TIMEOUT_MS_DEFAULT: u64 = 120_000;
pub const PREPROMPT_TIMEOUT_MS_DEFAULT: u64 = 30_000;
pub const MAX_RESPONSE_BYTES_DEFAULT: usize = 50 * 1024 * 1024;
pub const EXPIRY_BUFFER_SECONDS_DEFAULT: u64 = 5 * 60;
pub const CONFIG_CACHE_TTL_MINUTES_DEFAULT: u64 = 30;
pub const CACHE_SWEEP_SECONDS_DEFAULT: u64 = 10 * 60;
pub const ACCESS_SWEEP_SECONDS_DEFAULT: u64 = 5 * 60;
pub const ACCESS_TOKEN_TTL_SECONDS_DEFAULT: u64 = 3600;
pub const PREPROMPT_ENDPOINT_DEFAULT: &str = "/v1/llm/infer";

/// ================================
/// Full gateway configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub upstream: UpstreamConfig,
    pub token: TokenSettings,
    pub executor: ExecutorSettings,
    pub cache: CacheSettings,
    pub generation: GenerationSettings,
    pub access: AccessSettings,
    pub logging: Option<LoggingConfig>,
    pub metrics: MetricsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
}

/// ================================
/// Bearer token lifecycle
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokenSettings {
    pub refresh_url: Option<String>,
    /// minutes between proactive refresh checks, none or 0 disables the loop
    pub refresh_interval_minutes: Option<u64>,
    pub expiry_buffer_seconds: u64,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub retry: Option<RetryConfig>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            refresh_url: None,
            refresh_interval_minutes: None,
            expiry_buffer_seconds: EXPIRY_BUFFER_SECONDS_DEFAULT,
            access_token: None,
            refresh_token: None,
            retry: None,
        }
    }
}

impl TokenSettings {
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_minutes
            .filter(|m| *m > 0)
            .map(|m| Duration::from_secs(m.saturating_mul(60).min(MAX_LIFETIME_SECONDS)))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    /// doubled after every failed attempt, up to max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// invariant: >= base_delay_ms
    pub max_delay_ms: Option<u64>,
}

/// ================================
/// Outbound requests
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorSettings {
    pub api_timeout_ms: u64,
    pub max_response_bytes: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            api_timeout_ms: API_TIMEOUT_MS_DEFAULT,
            max_response_bytes: MAX_RESPONSE_BYTES_DEFAULT,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheSettings {
    /// 0 disables caching entirely
    pub config_ttl_minutes: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            config_ttl_minutes: CONFIG_CACHE_TTL_MINUTES_DEFAULT,
            sweep_interval_seconds: CACHE_SWEEP_SECONDS_DEFAULT,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> chrono::Duration {
        capped_minutes(self.config_ttl_minutes)
    }
}

/// ================================
/// Structured generation
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    pub prompt_name: String,
    /// pins a server side template revision
    pub label: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// variant key -> template, e.g. a persona with its own template
    pub variants: HashMap<String, TemplateVariant>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: PREPROMPT_ENDPOINT_DEFAULT.to_owned(),
            model: "gpt-4o-mini".to_owned(),
            prompt_name: "follow-up-preprompts".to_owned(),
            label: "production".to_owned(),
            temperature: 0.7,
            max_tokens: 400,
            timeout_ms: PREPROMPT_TIMEOUT_MS_DEFAULT,
            variants: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TemplateVariant {
    pub prompt_name: String,
    pub label: Option<String>,
}

/// ================================
/// Resource access tokens
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AccessSettings {
    pub token_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// enables the file backed password store
    pub password_store_path: Option<PathBuf>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            token_ttl_seconds: ACCESS_TOKEN_TTL_SECONDS_DEFAULT,
            sweep_interval_seconds: ACCESS_SWEEP_SECONDS_DEFAULT,
            password_store_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { path: default_metrics_path(), is_enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_owned(), port: "9100".to_owned() }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
