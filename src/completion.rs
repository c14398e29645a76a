//! Chat completion client for OpenAI-compatible endpoints (DeepSeek by
//! default), and selection of the answer strategy.
//!
//! The API key is read from the environment variable named by
//! `llm.api_key_env`. When it is unset or empty, [`create_generator`]
//! returns the canned generator and no network call is ever made.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use audit_assistant_core::answer::{
    AnswerGenerator, CannedGenerator, CompletionClient, ModelBackedGenerator,
};
use audit_assistant_core::error::AuditError;

use crate::config::LlmConfig;
use crate::http::{build_client, post_json, retry_budget};

pub struct ChatCompletionClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl ChatCompletionClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> audit_assistant_core::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let json = post_json(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "Completion",
        )
        .await
        .map_err(|e| AuditError::ModelCompletion {
            message: format!("{:#}", e),
        })?;

        parse_chat_response(&json).map_err(|e| AuditError::ModelCompletion {
            message: e.to_string(),
        })
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))
}

/// Outer deadline for one answer. Covers every retry `post_json` may make,
/// so a slow first attempt still leaves room for the rest.
fn completion_budget(config: &LlmConfig) -> Duration {
    retry_budget(config.timeout_secs, config.max_retries)
}

fn api_key(config: &LlmConfig) -> Option<String> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
}

/// Pick the answer strategy for the lifetime of the process.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match api_key(config) {
        Some(key) => {
            let client = ChatCompletionClient::new(config, key)?;
            info!(model = %config.model, api_base = %config.api_base, "answers use model completions");
            Ok(Arc::new(
                ModelBackedGenerator::new(Arc::new(client))
                    .with_timeout(completion_budget(config)),
            ))
        }
        None => {
            info!(env = %config.api_key_env, "no API key set; answers use canned templates");
            Ok(Arc::new(CannedGenerator::new()))
        }
    }
}
