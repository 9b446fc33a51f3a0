//! Bearer token lifecycle: staleness checks, single-flight refresh and the
//! optional proactive refresh loop.

use std::sync::{Arc, Mutex, RwLock as StdRwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::settings::TokenSettings;
use crate::error::{truncate_body, TokenRefreshError};
use crate::helpers::schedule::PeriodicTask;
use crate::helpers::time::{capped_seconds, SharedClock};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;
use crate::token::jwt::{is_usable, token_expiry};
use crate::token::pair::{RefreshRequest, RefreshResponse, TokenPair};

const REFRESH_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30);

/// Called with the new pair after every successful refresh.
pub type RefreshObserver = Arc<dyn Fn(&TokenPair) + Send + Sync>;

type InFlightRefresh = Shared<BoxFuture<'static, Result<String, TokenRefreshError>>>;

#[derive(Debug, Clone)]
pub struct TokenManagerOptions {
    pub refresh_url: Option<String>,
    pub expiry_buffer: chrono::Duration,
    pub request_timeout: Duration,
}

impl From<&TokenSettings> for TokenManagerOptions {
    fn from(settings: &TokenSettings) -> Self {
        Self {
            refresh_url: settings.refresh_url.clone(),
            expiry_buffer: capped_seconds(settings.expiry_buffer_seconds),
            request_timeout: REFRESH_TIMEOUT_DEFAULT,
        }
    }
}

/// Owns the current [`TokenPair`]. Cheap to clone, clones share state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    pair: RwLock<TokenPair>,
    client: Client,
    options: TokenManagerOptions,
    clock: SharedClock,
    observer: StdRwLock<Option<RefreshObserver>>,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

impl TokenManager {
    pub fn new(client: Client, pair: TokenPair, options: TokenManagerOptions, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                pair: RwLock::new(pair),
                client,
                options,
                clock,
                observer: StdRwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn from_settings(client: Client, settings: &TokenSettings, clock: SharedClock) -> Self {
        let pair = TokenPair::new(
            settings.access_token.clone().unwrap_or_default(),
            settings.refresh_token.clone().unwrap_or_default(),
        );
        Self::new(client, pair, TokenManagerOptions::from(settings), clock)
    }

    /// Register the refresh observer, replacing any previous one.
    pub fn on_refresh(&self, observer: RefreshObserver) {
        *self.inner.observer.write().unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    pub async fn current_pair(&self) -> TokenPair {
        self.inner.pair.read().await.clone()
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        token_expiry(&self.inner.pair.read().await.access_token)
    }

    /// True when the current access token is past `exp - buffer`.
    pub async fn needs_refresh(&self) -> bool {
        !self.inner.is_current_usable().await
    }

    /// Current access token if usable, otherwise the token from a (shared) refresh.
    pub async fn get_valid_access_token(&self) -> Result<String, TokenRefreshError> {
        {
            let pair = self.inner.pair.read().await;
            if is_usable(&pair.access_token, self.inner.clock.now(), self.inner.options.expiry_buffer) {
                return Ok(pair.access_token.clone());
            }
        }
        debug!("access token stale, joining refresh");
        self.shared_refresh(false).await
    }

    /// Refresh unconditionally. Joins a refresh that is already in flight.
    pub async fn refresh(&self) -> Result<(), TokenRefreshError> {
        self.shared_refresh(true).await.map(|_| ())
    }

    fn shared_refresh(&self, force: bool) -> InFlightRefresh {
        let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pending) = slot.as_ref() {
            return pending.clone();
        }

        let inner = self.inner.clone();
        let pending = async move {
            let result = inner.refresh_once(force).await;
            inner.in_flight.lock().unwrap_or_else(|e| e.into_inner()).take();
            result
        }
        .boxed()
        .shared();
        *slot = Some(pending.clone());
        pending
    }

    /// Start the proactive refresh loop. Each tick refreshes when inside the expiry buffer.
    pub fn start_background_refresh(&self, interval: Duration, retry: RetrySettings) -> PeriodicTask {
        let manager = self.clone();
        PeriodicTask::start("token-refresh", interval, move || {
            let manager = manager.clone();
            let retry = retry.clone();
            async move {
                if !manager.needs_refresh().await {
                    debug!("access token still fresh, skipping proactive refresh");
                    return;
                }
                info!("access token inside expiry buffer, refreshing proactively");
                if let Err(e) = retry.run_with_retry(|| manager.refresh()).await {
                    error!(error = %e, "proactive token refresh failed");
                }
            }
        })
    }
}

impl Inner {
    async fn is_current_usable(&self) -> bool {
        let pair = self.pair.read().await;
        is_usable(&pair.access_token, self.clock.now(), self.options.expiry_buffer)
    }

    async fn refresh_once(&self, force: bool) -> Result<String, TokenRefreshError> {
        if !force {
            let pair = self.pair.read().await;
            if is_usable(&pair.access_token, self.clock.now(), self.options.expiry_buffer) {
                return Ok(pair.access_token.clone());
            }
        }

        let metrics = get_metrics().await;
        match self.call_refresh_endpoint().await {
            Ok(refreshed) => {
                let pair = {
                    let mut pair = self.pair.write().await;
                    *pair = pair.rotated(refreshed);
                    pair.clone()
                };
                metrics.token_refreshes.with_label_values(&["success"]).inc();
                if let Some(exp) = token_expiry(&pair.access_token) {
                    metrics.token_expiry_unix.set(exp.timestamp());
                    info!(expires_at = %exp, "access token refreshed");
                } else {
                    warn!("refreshed access token has no readable exp claim");
                }

                let observer = self.observer.read().unwrap_or_else(|e| e.into_inner()).clone();
                if let Some(observer) = observer {
                    observer(&pair);
                }
                Ok(pair.access_token)
            }
            Err(e) => {
                metrics.token_refreshes.with_label_values(&["failure"]).inc();
                error!(error = %e, "token refresh failed, keeping stale pair");
                Err(e)
            }
        }
    }

    async fn call_refresh_endpoint(&self) -> Result<RefreshResponse, TokenRefreshError> {
        let url = self
            .options
            .refresh_url
            .as_deref()
            .ok_or(TokenRefreshError::NotConfigured)?;
        let refresh_token = self.pair.read().await.refresh_token.clone();

        let response = self
            .client
            .post(url)
            .timeout(self.options.request_timeout)
            .json(&RefreshRequest { refresh_token: &refresh_token })
            .send()
            .await
            .map_err(|e| TokenRefreshError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenRefreshError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(TokenRefreshError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let refreshed: RefreshResponse =
            serde_json::from_str(&body).map_err(|e| TokenRefreshError::Malformed(e.to_string()))?;
        if refreshed.access_token.is_empty() {
            return Err(TokenRefreshError::Malformed("empty accessToken".to_string()));
        }
        Ok(refreshed)
    }
}
