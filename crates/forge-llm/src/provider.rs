//! HTTP-backed [`ModelProvider`] implementation, mirroring the request shape
//! of an OpenAI-style chat-completions endpoint.

use std::time::Instant;

use async_trait::async_trait;
use forge_core::error::ForgeError;
use forge_core::ports::{ModelCallOpts, ModelCallResult, ModelProvider};
use serde_json::json;

use crate::http_client::HttpClient;

/// A single named model reachable over an HTTP chat-completions endpoint.
pub struct HttpModelProvider {
    name: String,
    model: String,
    endpoint: String,
    api_key: String,
    client: HttpClient,
}

impl HttpModelProvider {
    pub fn new(name: impl Into<String>, model: impl Into<String>, endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ForgeError> {
        Ok(Self {
            name: name.into(),
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: HttpClient::new()?,
        })
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn call(&self, prompt: &str, opts: &ModelCallOpts) -> Result<ModelCallResult, ForgeError> {
        let started = Instant::now();
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let request = self.client.post_json(&self.endpoint, &self.api_key, &body);

        let response = self
            .client
            .execute_with_retry(request, opts.timeout, &self.name)
            .await?;

        let status = response.status();
        let payload: serde_json::Value = response.json().await.map_err(|e| {
            forge_core::error::ForgeError::new(forge_core::error::ForgeErrorKind::ParseFailure {
                reason: format!("invalid JSON response ({status}): {e}"),
            })
        })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                forge_core::error::ForgeError::new(forge_core::error::ForgeErrorKind::ParseFailure {
                    reason: "response missing choices[0].message.content".to_string(),
                })
            })?
            .to_string();

        let input_tokens = payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = payload["usage"]["completion_tokens"].as_u64().unwrap_or(0);

        Ok(ModelCallResult {
            content,
            input_tokens,
            output_tokens,
            cost: 0.0,
            latency_ms: started.elapsed().as_millis() as u64,
            provider: self.name.clone(),
            model: self.model.clone(),
        })
    }
}
