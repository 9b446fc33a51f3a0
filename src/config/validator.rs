//! Configuration validation with aggregated errors.

use crate::config::settings::GatewayConfig;
use crate::helpers::time::MAX_LIFETIME_SECONDS;

/// Returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_gateway_config(cfg: &GatewayConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    if !is_http_url(&cfg.upstream.base_url) {
        errors.push(format!(
            "upstream.base_url '{}' must be an absolute http(s) url",
            cfg.upstream.base_url
        ));
    }
    if let Some(url) = &cfg.token.refresh_url {
        if !is_http_url(url) {
            errors.push(format!("token.refresh_url '{}' must be an absolute http(s) url", url));
        }
    }
    if cfg.token.refresh_interval().is_some() && cfg.token.refresh_url.is_none() {
        errors.push("token.refresh_interval_minutes requires token.refresh_url".to_string());
    }
    if let Some(retry) = &cfg.token.retry {
        if retry.attempts == Some(0) {
            errors.push("token.retry.attempts must be >= 1".to_string());
        }
        if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
            if max < base {
                errors.push("token.retry.max_delay_ms must be >= base_delay_ms".to_string());
            }
        }
    }

    if cfg.executor.api_timeout_ms == 0 {
        errors.push("executor.api_timeout_ms must be > 0".to_string());
    }
    if cfg.executor.max_response_bytes == 0 {
        errors.push("executor.max_response_bytes must be > 0".to_string());
    }
    if cfg.cache.sweep_interval_seconds == 0 {
        errors.push("cache.sweep_interval_seconds must be > 0".to_string());
    }

    let generation = &cfg.generation;
    if generation.timeout_ms == 0 {
        errors.push("generation.timeout_ms must be > 0".to_string());
    }
    if !(0.0..=2.0).contains(&generation.temperature) {
        errors.push(format!(
            "generation.temperature {} must be within [0, 2]",
            generation.temperature
        ));
    }
    if generation.max_tokens == 0 {
        errors.push("generation.max_tokens must be > 0".to_string());
    }
    if generation.model.trim().is_empty() {
        errors.push("generation.model must not be empty".to_string());
    }
    if generation.prompt_name.trim().is_empty() {
        errors.push("generation.prompt_name must not be empty".to_string());
    }
    for (key, variant) in &generation.variants {
        if variant.prompt_name.trim().is_empty() {
            errors.push(format!("generation.variants['{}'].prompt_name must not be empty", key));
        }
    }

    if cfg.access.token_ttl_seconds == 0 {
        errors.push("access.token_ttl_seconds must be > 0".to_string());
    }
    if cfg.access.sweep_interval_seconds == 0 {
        errors.push("access.sweep_interval_seconds must be > 0".to_string());
    }

    let lifetimes = [
        ("token.expiry_buffer_seconds", Some(cfg.token.expiry_buffer_seconds)),
        ("token.refresh_interval_minutes", cfg.token.refresh_interval_minutes.map(|m| m.saturating_mul(60))),
        ("cache.config_ttl_minutes", Some(cfg.cache.config_ttl_minutes.saturating_mul(60))),
        ("cache.sweep_interval_seconds", Some(cfg.cache.sweep_interval_seconds)),
        ("access.token_ttl_seconds", Some(cfg.access.token_ttl_seconds)),
        ("access.sweep_interval_seconds", Some(cfg.access.sweep_interval_seconds)),
    ];
    for (key, seconds) in lifetimes {
        if seconds.is_some_and(|s| s > MAX_LIFETIME_SECONDS) {
            errors.push(format!("{} exceeds the {}s maximum", key, MAX_LIFETIME_SECONDS));
        }
    }

    if let Some(logging) = &cfg.logging {
        let level = logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            errors.push(format!("logging.level '{}' is not supported", logging.level));
        }
    }
    if cfg.metrics.is_enabled && !cfg.metrics.path.starts_with('/') {
        errors.push(format!("metrics.path '{}' must start with '/'", cfg.metrics.path));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{LogFormat, LoggingConfig};

    fn valid() -> GatewayConfig {
        let mut cfg = GatewayConfig::default();
        cfg.upstream.base_url = "https://api.example.com".to_string();
        cfg
    }

    #[test]
    fn default_config_with_base_url_is_valid() {
        assert!(validate_gateway_config(&valid()).is_ok());
    }

    #[test]
    fn reports_every_issue() {
        let mut cfg = valid();
        cfg.upstream.base_url = "ftp://nope".to_string();
        cfg.token.refresh_interval_minutes = Some(10);
        cfg.executor.api_timeout_ms = 0;
        cfg.generation.temperature = 3.5;
        cfg.logging = Some(LoggingConfig::new("loud".into(), LogFormat::Json));

        let errors = validate_gateway_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 5, "{:?}", errors);
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        let mut cfg = valid();
        cfg.token.refresh_url = Some("https://api.example.com/auth/refresh".to_string());
        cfg.token.refresh_interval_minutes = Some(u64::MAX);
        cfg.token.expiry_buffer_seconds = u64::MAX;
        cfg.cache.config_ttl_minutes = 10_000_000_000_000_000;
        cfg.access.token_ttl_seconds = MAX_LIFETIME_SECONDS + 1;

        let errors = validate_gateway_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors.iter().any(|e| e.starts_with("cache.config_ttl_minutes")));

        cfg.access.token_ttl_seconds = MAX_LIFETIME_SECONDS;
        cfg.token.expiry_buffer_seconds = 300;
        cfg.token.refresh_interval_minutes = Some(10);
        cfg.cache.config_ttl_minutes = 30;
        assert!(validate_gateway_config(&cfg).is_ok());
    }

    #[test]
    fn refresh_url_must_be_absolute() {
        let mut cfg = valid();
        cfg.token.refresh_url = Some("/auth/refresh".to_string());
        let errors = validate_gateway_config(&cfg).unwrap_err();
        assert!(errors[0].contains("token.refresh_url"));
    }
}
