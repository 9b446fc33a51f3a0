//! Follow-up suggestion generation. Advisory output: every failure becomes
//! an empty result.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::settings::GenerationSettings;
use crate::error::GenerationError;
use crate::executor::request::{BoundedExecutor, UpstreamCall};
use crate::generation::envelope::Envelope;
use crate::generation::preprompt::{validate_preprompts, ConversationTurn, Preprompt};
use crate::observability::metrics::get_metrics;

#[derive(Debug, Serialize)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt_name: &'a str,
    pub label: &'a str,
    pub inputs: GenerationInputs<'a>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct GenerationInputs<'a> {
    pub conversation_history: &'a [ConversationTurn],
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Template chosen for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTemplate<'a> {
    pub prompt_name: &'a str,
    pub label: &'a str,
}

#[derive(Clone)]
pub struct GenerationPipeline {
    executor: BoundedExecutor,
    settings: Arc<GenerationSettings>,
}

impl GenerationPipeline {
    pub fn new(executor: BoundedExecutor, settings: GenerationSettings) -> Self {
        Self { executor, settings: Arc::new(settings) }
    }

    /// Template for `variant`, falling back to the default one for unknown or absent keys.
    pub fn select_template(&self, variant: Option<&str>) -> SelectedTemplate<'_> {
        let default_label = self.settings.label.as_str();
        match variant.and_then(|key| self.settings.variants.get(key)) {
            Some(variant) => SelectedTemplate {
                prompt_name: &variant.prompt_name,
                label: variant.label.as_deref().unwrap_or(default_label),
            },
            None => SelectedTemplate {
                prompt_name: &self.settings.prompt_name,
                label: default_label,
            },
        }
    }

    pub fn build_request<'a>(
        &'a self,
        history: &'a [ConversationTurn],
        variant: Option<&str>,
    ) -> GenerationRequest<'a> {
        let template = self.select_template(variant);
        GenerationRequest {
            model: &self.settings.model,
            prompt_name: template.prompt_name,
            label: template.label,
            inputs: GenerationInputs { conversation_history: history },
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        }
    }

    /// Exactly four suggestions, or none when anything goes wrong.
    pub async fn generate(&self, history: &[ConversationTurn], variant: Option<&str>) -> Vec<Preprompt> {
        let metrics = get_metrics().await;
        match self.try_generate(history, variant).await {
            Ok(preprompts) => {
                metrics.generation_results.with_label_values(&["success"]).inc();
                info!(count = preprompts.len(), variant, "preprompts generated");
                preprompts
            }
            Err(e) => {
                let outcome = match &e {
                    GenerationError::Executor(inner) if inner.is_timeout() => "timeout",
                    GenerationError::Executor(_) => "upstream",
                    GenerationError::Validation(_) => "invalid",
                    GenerationError::Json(_) | GenerationError::EmptyEnvelope => "malformed",
                };
                metrics.generation_results.with_label_values(&[outcome]).inc();
                warn!(error = %e, variant, "preprompt generation failed, returning none");
                Vec::new()
            }
        }
    }

    async fn try_generate(
        &self,
        history: &[ConversationTurn],
        variant: Option<&str>,
    ) -> Result<Vec<Preprompt>, GenerationError> {
        let request = self.build_request(history, variant);
        debug!(prompt_name = request.prompt_name, label = request.label, turns = history.len(), "requesting preprompts");
        let body = serde_json::to_value(&request)?;

        let call = UpstreamCall::post("generation", self.settings.endpoint.clone(), body)
            .with_timeout(Duration::from_millis(self.settings.timeout_ms));
        let response = self.executor.execute(call).await?;

        let payload = Envelope::from_slice(&response.body)?.into_payload()?;
        let (preprompts, dropped) = validate_preprompts(&payload)?;
        if dropped > 0 {
            get_metrics().await.generation_dropped_items.inc_by(dropped as u64);
        }
        Ok(preprompts)
    }
}
