//! Password gating for individual resources and the short-lived access
//! tokens handed out after a successful unlock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::access::hash::{digests_match, generate_access_token, hash_password};
use crate::access::store::{PasswordRecord, PasswordStore};
use crate::config::settings::AccessSettings;
use crate::error::AccessError;
use crate::helpers::schedule::PeriodicTask;
use crate::helpers::time::{capped_seconds, saturating_add, SharedClock};
use crate::observability::metrics::get_metrics;

/// Lifetime of an access token when the caller does not pick one.
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub resource_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What the caller gets back from [`AccessTokenService::issue_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Without a store every password operation fails with
/// [`AccessError::StorageUnavailable`]; issued tokens still work.
pub struct AccessTokenService<S> {
    store: Option<Arc<S>>,
    clock: SharedClock,
    default_ttl: chrono::Duration,
    tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
}

impl<S> Clone for AccessTokenService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            default_ttl: self.default_ttl,
            tokens: self.tokens.clone(),
        }
    }
}

impl<S: PasswordStore + 'static> AccessTokenService<S> {
    pub fn new(store: Option<S>, clock: SharedClock) -> Self {
        Self {
            store: store.map(Arc::new),
            clock,
            default_ttl: capped_seconds(DEFAULT_ACCESS_TTL_SECONDS),
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_settings(store: Option<S>, settings: &AccessSettings, clock: SharedClock) -> Self {
        let mut service = Self::new(store, clock);
        service.default_ttl = capped_seconds(settings.token_ttl_seconds);
        service
    }

    pub fn is_storage_available(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&S, AccessError> {
        self.store.as_deref().ok_or(AccessError::StorageUnavailable)
    }

    pub async fn set_password(
        &self,
        resource_id: &str,
        password: &str,
        hint: Option<String>,
    ) -> Result<(), AccessError> {
        let store = self.store()?;
        if password.is_empty() {
            return Err(AccessError::EmptyPassword);
        }
        let record = PasswordRecord {
            resource_id: resource_id.to_owned(),
            password_hash: hash_password(resource_id, password),
            hint: hint.filter(|h| !h.trim().is_empty()),
            updated_at: self.clock.now(),
        };
        store.upsert(record).await?;
        info!(resource_id, "resource password set");
        Ok(())
    }

    /// Removes the password and every access token issued for the resource.
    pub async fn remove_password(&self, resource_id: &str) -> Result<bool, AccessError> {
        let existed = self.store()?.delete(resource_id).await?;
        let revoked = self.revoke_resource(resource_id).await;
        info!(resource_id, existed, revoked, "resource password removed");
        Ok(existed)
    }

    pub async fn has_password(&self, resource_id: &str) -> Result<bool, AccessError> {
        Ok(self.store()?.get(resource_id).await?.is_some())
    }

    /// Like [`Self::has_password`] but an unavailable or failing store reads as "no password".
    pub async fn requires_password(&self, resource_id: &str) -> bool {
        match self.has_password(resource_id).await {
            Ok(required) => required,
            Err(e) => {
                warn!(resource_id, error = %e, "password lookup failed, treating resource as open");
                false
            }
        }
    }

    pub async fn get_hint(&self, resource_id: &str) -> Result<Option<String>, AccessError> {
        Ok(self
            .store()?
            .get(resource_id)
            .await?
            .and_then(|record| record.hint))
    }

    /// False when the resource has no password.
    pub async fn verify_password(&self, resource_id: &str, password: &str) -> Result<bool, AccessError> {
        let Some(record) = self.store()?.get(resource_id).await? else {
            return Ok(false);
        };
        let matched = digests_match(&record.password_hash, &hash_password(resource_id, password));
        debug!(resource_id, matched, "password verified");
        Ok(matched)
    }

    /// Verify the password and, on a match, issue a token with the default lifetime.
    pub async fn unlock(&self, resource_id: &str, password: &str) -> Result<Option<IssuedToken>, AccessError> {
        if !self.verify_password(resource_id, password).await? {
            return Ok(None);
        }
        Ok(Some(self.issue_token(resource_id, None).await))
    }

    /// Requested lifetimes longer than ten years are clamped.
    pub async fn issue_token(&self, resource_id: &str, ttl_seconds: Option<u64>) -> IssuedToken {
        let ttl = ttl_seconds.map(capped_seconds).unwrap_or(self.default_ttl);
        let issued = AccessToken {
            resource_id: resource_id.to_owned(),
            token: generate_access_token(),
            expires_at: saturating_add(self.clock.now(), ttl),
        };
        let result = IssuedToken {
            token: issued.token.clone(),
            expires_at: issued.expires_at,
        };

        let active = {
            let mut tokens = self.tokens.write().await;
            tokens.insert(issued.token.clone(), issued);
            tokens.len()
        };
        let metrics = get_metrics().await;
        metrics.access_tokens_issued.inc();
        metrics.access_tokens_active.set(active as i64);
        debug!(resource_id, expires_at = %result.expires_at, "access token issued");
        result
    }

    /// True only for a known, unexpired token issued for this exact resource.
    pub async fn validate_token(&self, token: &str, resource_id: &str) -> bool {
        let now = self.clock.now();
        let result = match self.tokens.read().await.get(token) {
            None => "unknown",
            Some(entry) if now >= entry.expires_at => "expired",
            Some(entry) if entry.resource_id != resource_id => "wrong_resource",
            Some(_) => "valid",
        };
        let metrics = get_metrics().await;
        metrics.access_token_validations.with_label_values(&[result]).inc();

        if result == "expired" {
            let mut tokens = self.tokens.write().await;
            // re-check, the sweeper may already have dropped it
            if tokens.get(token).is_some_and(|entry| now >= entry.expires_at) {
                tokens.remove(token);
                debug!(resource_id, "expired access token evicted on lookup");
            }
            metrics.access_tokens_active.set(tokens.len() as i64);
        }
        result == "valid"
    }

    pub async fn active_tokens(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Drop expired tokens. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let (removed, remaining) = {
            let mut tokens = self.tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, entry| now < entry.expires_at);
            (before - tokens.len(), tokens.len())
        };
        get_metrics().await.access_tokens_active.set(remaining as i64);
        if removed > 0 {
            info!(removed, remaining, "expired access tokens swept");
        }
        removed
    }

    pub fn start_sweeper(&self, period: Duration) -> PeriodicTask {
        let service = self.clone();
        PeriodicTask::start("access-token-sweeper", period, move || {
            let service = service.clone();
            async move {
                service.sweep_expired().await;
            }
        })
    }

    async fn revoke_resource(&self, resource_id: &str) -> usize {
        let (removed, remaining) = {
            let mut tokens = self.tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, entry| entry.resource_id != resource_id);
            (before - tokens.len(), tokens.len())
        };
        get_metrics().await.access_tokens_active.set(remaining as i64);
        removed
    }
}
