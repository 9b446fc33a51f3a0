//! Wires the gateway components together from a loaded [`GatewayConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::access::service::AccessTokenService;
use crate::access::store::FilePasswordStore;
use crate::config::settings::GatewayConfig;
use crate::executor::request::{BoundedExecutor, ExecutorOptions};
use crate::generation::pipeline::GenerationPipeline;
use crate::helpers::schedule::PeriodicTask;
use crate::helpers::time::SharedClock;
use crate::resilience::retry::RetrySettings;
use crate::token::manager::TokenManager;
use crate::token::pair::TokenPair;
use crate::upstream::chat::ChatClient;

#[derive(Clone)]
pub struct Gateway {
    pub tokens: TokenManager,
    pub executor: BoundedExecutor,
    pub chat: ChatClient,
    pub generation: GenerationPipeline,
    pub access: AccessTokenService<FilePasswordStore>,
}

impl Gateway {
    pub fn build(config: &GatewayConfig, clock: SharedClock) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build http client")?;

        let tokens = TokenManager::from_settings(client.clone(), &config.token, clock.clone());
        tokens.on_refresh(Arc::new(|pair: &TokenPair| {
            info!(
                has_refresh_token = !pair.refresh_token.is_empty(),
                "bearer token pair rotated"
            );
        }));

        let executor = BoundedExecutor::new(
            client,
            tokens.clone(),
            ExecutorOptions::from_settings(&config.upstream.base_url, &config.executor),
        );
        let chat = ChatClient::new(executor.clone(), &config.cache, clock.clone());
        let generation = GenerationPipeline::new(executor.clone(), config.generation.clone());

        let store = config.access.password_store_path.as_ref().map(FilePasswordStore::new);
        if store.is_none() {
            info!("no password store configured, resource passwords are unavailable");
        }
        let access = AccessTokenService::from_settings(store, &config.access, clock);

        Ok(Self { tokens, executor, chat, generation, access })
    }

    /// Start every periodic task the configuration asks for.
    pub fn start_background(&self, config: &GatewayConfig) -> Vec<PeriodicTask> {
        let mut tasks = Vec::new();
        if let Some(interval) = config.token.refresh_interval() {
            let retry = RetrySettings::from(config.token.retry.as_ref());
            tasks.push(self.tokens.start_background_refresh(interval, retry));
        }
        if self.chat.config_cache().is_enabled() && config.cache.sweep_interval_seconds > 0 {
            tasks.push(
                self.chat
                    .start_config_sweeper(Duration::from_secs(config.cache.sweep_interval_seconds)),
            );
        }
        if config.access.sweep_interval_seconds > 0 {
            tasks.push(
                self.access
                    .start_sweeper(Duration::from_secs(config.access.sweep_interval_seconds)),
            );
        }
        tasks
    }
}
