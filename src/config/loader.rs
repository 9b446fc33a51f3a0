use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error, info};

use crate::config::settings::GatewayConfig;
use crate::config::validator::validate_gateway_config;

/// Load config from an optional YAML file, then apply environment overrides and validate.
pub async fn load(path: Option<&Path>) -> Result<GatewayConfig> {
    let mut config = match path {
        Some(path) => file_to_config(path).await?,
        None => {
            info!("no config file given, starting from defaults");
            GatewayConfig::default()
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())
        .map_err(|errors| anyhow!("invalid environment: {}", errors.join("; ")))?;

    debug!("validating config ...");
    validate_gateway_config(&config).map_err(|errors| {
        for e in &errors {
            error!("config error: {}", e);
        }
        anyhow!("invalid config: {}", errors.join("; "))
    })?;
    Ok(config)
}

pub async fn file_to_config(path: &Path) -> Result<GatewayConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("cannot read config '{}': {}", path.display(), e))?;
    parse_config(&expand_env_vars(&content))
}

pub fn parse_config(content: &str) -> Result<GatewayConfig> {
    if content.trim().is_empty() {
        return Ok(GatewayConfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| {
        error!("parse config error: {}", e);
        anyhow!("Invalid config format: {}", e)
    })
}

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("static regex"));

/// Replace `${VAR}` and `${VAR:default}` with environment values.
pub fn expand_env_vars(input: &str) -> String {
    ENV_PLACEHOLDER.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Apply the recognised environment options on top of `config`.
///
/// Unparseable numeric values are collected and reported together.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    fn parsed<T: std::str::FromStr>(
        key: &str,
        raw: Option<String>,
        errors: &mut Vec<String>,
    ) -> Option<T> {
        let raw = raw?;
        match raw.trim().parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                errors.push(format!("{} has invalid value '{}'", key, raw));
                None
            }
        }
    }

    if let Some(v) = lookup("UPSTREAM_BASE_URL") {
        config.upstream.base_url = v;
    }
    if let Some(v) = lookup("TOKEN_REFRESH_URL") {
        config.token.refresh_url = Some(v);
    }
    if let Some(v) = parsed::<u64>("TOKEN_REFRESH_INTERVAL", lookup("TOKEN_REFRESH_INTERVAL"), &mut errors) {
        config.token.refresh_interval_minutes = Some(v);
    }
    if let Some(v) = lookup("ACCESS_TOKEN") {
        config.token.access_token = Some(v);
    }
    if let Some(v) = lookup("REFRESH_TOKEN") {
        config.token.refresh_token = Some(v);
    }
    if let Some(v) = parsed::<u64>("API_TIMEOUT", lookup("API_TIMEOUT"), &mut errors) {
        config.executor.api_timeout_ms = v;
    }
    if let Some(v) = parsed::<usize>("MAX_RESPONSE_BYTES", lookup("MAX_RESPONSE_BYTES"), &mut errors) {
        config.executor.max_response_bytes = v;
    }
    if let Some(v) = parsed::<u64>("CONFIG_CACHE_TTL_MINUTES", lookup("CONFIG_CACHE_TTL_MINUTES"), &mut errors) {
        config.cache.config_ttl_minutes = v;
    }
    if let Some(v) = parsed::<u64>("PREPROMPT_TIMEOUT", lookup("PREPROMPT_TIMEOUT"), &mut errors) {
        config.generation.timeout_ms = v;
    }
    if let Some(v) = lookup("PREPROMPT_MODEL") {
        config.generation.model = v;
    }
    if let Some(v) = lookup("PREPROMPT_ENDPOINT") {
        config.generation.endpoint = v;
    }
    if let Some(v) = lookup("PREPROMPT_NAME") {
        config.generation.prompt_name = v;
    }
    if let Some(v) = lookup("PREPROMPT_LABEL") {
        config.generation.label = v;
    }
    if let Some(v) = parsed::<f32>("PREPROMPT_TEMPERATURE", lookup("PREPROMPT_TEMPERATURE"), &mut errors) {
        config.generation.temperature = v;
    }
    if let Some(v) = parsed::<u32>("PREPROMPT_MAX_TOKENS", lookup("PREPROMPT_MAX_TOKENS"), &mut errors) {
        config.generation.max_tokens = v;
    }
    if let Some(v) = lookup("PASSWORD_STORE_PATH") {
        config.access.password_store_path = Some(PathBuf::from(v));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
