//! Authenticated outbound calls with a deadline, a body size cap and
//! classified failures.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::settings::ExecutorSettings;
use crate::error::{truncate_body, ExecutorError, ERROR_BODY_LIMIT};
use crate::executor::telemetry::{record_attempt, record_outcome, CallTimings};
use crate::helpers::time::get_instant;
use crate::token::manager::TokenManager;

/// One outbound call.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub label: &'static str,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// overrides the executor default
    pub timeout: Option<Duration>,
    /// 404 is an expected outcome for this call and maps to `NotFound`
    pub lookup: bool,
}

impl UpstreamCall {
    pub fn new(label: &'static str, method: Method, path: impl Into<String>) -> Self {
        Self {
            label,
            method,
            path: path.into(),
            body: None,
            timeout: None,
            lookup: false,
        }
    }

    pub fn get(label: &'static str, path: impl Into<String>) -> Self {
        Self::new(label, Method::GET, path)
    }

    pub fn post(label: &'static str, path: impl Into<String>, body: Value) -> Self {
        Self::new(label, Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn lookup(mut self) -> Self {
        self.lookup = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub timings: CallTimings,
}

impl UpstreamResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ExecutorError> {
        serde_json::from_slice(&self.body).map_err(|e| ExecutorError::Decode(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub max_response_bytes: usize,
}

impl ExecutorOptions {
    pub fn from_settings(base_url: &str, settings: &ExecutorSettings) -> Self {
        Self {
            base_url: base_url.to_owned(),
            timeout: Duration::from_millis(settings.api_timeout_ms),
            max_response_bytes: settings.max_response_bytes,
        }
    }
}

/// Executes [`UpstreamCall`]s with a bearer token from the [`TokenManager`].
#[derive(Clone)]
pub struct BoundedExecutor {
    client: Client,
    tokens: TokenManager,
    options: Arc<ExecutorOptions>,
}

impl BoundedExecutor {
    pub fn new(client: Client, tokens: TokenManager, options: ExecutorOptions) -> Self {
        Self { client, tokens, options: Arc::new(options) }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        format!(
            "{}/{}",
            self.options.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn execute(&self, call: UpstreamCall) -> Result<UpstreamResponse, ExecutorError> {
        self.run(call, None).await
    }

    /// Same as [`execute`](Self::execute), aborting the call when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        call: UpstreamCall,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse, ExecutorError> {
        self.run(call, Some(cancel)).await
    }

    async fn run(
        &self,
        call: UpstreamCall,
        cancel: Option<&CancellationToken>,
    ) -> Result<UpstreamResponse, ExecutorError> {
        let start = get_instant();
        let mut timings = CallTimings::default();
        record_attempt(call.label, call.method.as_str()).await;

        let result = self.run_timed(&call, cancel, start, &mut timings).await;

        timings.total = start.elapsed();
        match &result {
            Ok(response) => record_outcome(call.label, &timings, Ok(response.status)).await,
            Err(e) => {
                if e.is_not_found() {
                    debug!(endpoint = call.label, path = %call.path, "upstream lookup found nothing");
                } else {
                    warn!(endpoint = call.label, path = %call.path, error = %e, "upstream call failed");
                }
                record_outcome(call.label, &timings, Err(e)).await
            }
        }
        result.map(|mut response| {
            response.timings = timings;
            response
        })
    }

    async fn run_timed(
        &self,
        call: &UpstreamCall,
        cancel: Option<&CancellationToken>,
        start: tokio::time::Instant,
        timings: &mut CallTimings,
    ) -> Result<UpstreamResponse, ExecutorError> {
        let token = self.tokens.get_valid_access_token().await?;
        timings.time_to_token = start.elapsed();

        let timeout = call.timeout.unwrap_or(self.options.timeout);
        let url = self.url_for(&call.path);
        let mut request = self.client.request(call.method.clone(), &url).bearer_auth(token);
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        let max_bytes = self.options.max_response_bytes;

        // dropping this future on timeout or cancel aborts the connection
        let exchange = async move {
            let response = request.send().await.map_err(map_transport)?;
            let ttfb = start.elapsed();
            let status = response.status().as_u16();
            let body = if response.status().is_success() {
                read_capped(response, max_bytes).await?
            } else {
                read_prefix(response, ERROR_BODY_LIMIT).await
            };
            Ok::<_, ExecutorError>((status, body, ttfb))
        };
        let deadline = tokio::time::timeout(timeout, exchange);

        let outcome = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
                outcome = deadline => outcome,
            },
            None => deadline.await,
        };
        let (status, body, ttfb) =
            outcome.map_err(|_| ExecutorError::Timeout(timeout.as_millis() as u64))??;
        timings.time_to_first_byte = Some(ttfb);

        classify(call, status, body)
    }
}

fn classify(call: &UpstreamCall, status: u16, body: Vec<u8>) -> Result<UpstreamResponse, ExecutorError> {
    if (200..300).contains(&status) {
        return Ok(UpstreamResponse { status, body, timings: CallTimings::default() });
    }
    if status == 404 && call.lookup {
        return Err(ExecutorError::NotFound(call.path.clone()));
    }
    Err(ExecutorError::Upstream {
        status,
        body: truncate_body(&String::from_utf8_lossy(&body)),
    })
}

fn map_transport(e: reqwest::Error) -> ExecutorError {
    ExecutorError::Transport(e.to_string())
}

async fn read_capped(mut response: Response, limit: usize) -> Result<Vec<u8>, ExecutorError> {
    if response.content_length().is_some_and(|len| len as usize > limit) {
        return Err(ExecutorError::ResponseTooLarge { limit });
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_transport)? {
        if body.len() + chunk.len() > limit {
            return Err(ExecutorError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Reads at most `limit` bytes of an error body and drops the rest.
async fn read_prefix(mut response: Response, limit: usize) -> Vec<u8> {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            _ => break,
        }
    }
    body
}
