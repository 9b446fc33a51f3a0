use clap::ValueEnum;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::settings::{GatewayConfig, LogFormat, LoggingConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::TRACE => "TRACE",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::INFO => "INFO",
            LogLevel::WARN => "WARN",
            LogLevel::ERROR => "ERROR",
        }
    }
}

/// CLI level wins over the config file, the config file over `info`.
pub fn resolve(config: &GatewayConfig, arg_log_level: Option<LogLevel>) -> LoggingConfig {
    let format = config
        .logging
        .as_ref()
        .map(|c| c.format.clone())
        .unwrap_or(LogFormat::Compact);
    let level = arg_log_level
        .map(|l| l.as_str().to_lowercase())
        .or_else(|| config.logging.as_ref().map(|c| c.level.clone()))
        .unwrap_or_else(|| "info".to_owned());
    LoggingConfig::new(level, format)
}

pub fn run(config: &GatewayConfig, arg_log_level: Option<LogLevel>) {
    init_logging(&resolve(config, arg_log_level));
}

/// Initialize tracing with the desired config.
pub fn init_logging(cfg: &LoggingConfig) {
    let env_filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .flatten_event(true)
                .with_ansi(false);

            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true);

            let _ = registry.with(layer).try_init();
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_file() {
        let mut config = GatewayConfig::default();
        config.logging = Some(LoggingConfig::new("warn".into(), LogFormat::Json));

        let resolved = resolve(&config, Some(LogLevel::DEBUG));
        assert_eq!(resolved.level, "debug");
        assert_eq!(resolved.format, LogFormat::Json);

        let resolved = resolve(&config, None);
        assert_eq!(resolved.level, "warn");
    }

    #[test]
    fn falls_back_to_info_compact() {
        let resolved = resolve(&GatewayConfig::default(), None);
        assert_eq!(resolved.level, "info");
        assert_eq!(resolved.format, LogFormat::Compact);
    }
}
