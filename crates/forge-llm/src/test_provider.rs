//! Deterministic in-memory [`ModelProvider`] for tests, driven by a scripted
//! sequence of responses (including injected failures to exercise retry and
//! fallback paths) rather than a live HTTP endpoint.

use std::sync::Mutex;

use async_trait::async_trait;
use forge_core::error::ForgeError;
use forge_core::ports::{ModelCallOpts, ModelCallResult, ModelProvider};

/// One scripted outcome for a call to a [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Reply(String),
    Fail(ForgeError),
}

/// A provider that replays a fixed sequence of outcomes, one per call, then
/// repeats the final outcome for any calls beyond the script's length.
pub struct ScriptedProvider {
    name: String,
    model: String,
    script: Mutex<Vec<ScriptedOutcome>>,
    cursor: Mutex<usize>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, model: impl Into<String>, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            script: Mutex::new(script),
            cursor: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn always_replying(name: impl Into<String>, model: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(name, model, vec![ScriptedOutcome::Reply(reply.into())])
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn call(&self, _prompt: &str, _opts: &ModelCallOpts) -> Result<ModelCallResult, ForgeError> {
        let script = self.script.lock().expect("script mutex poisoned");
        let mut cursor = self.cursor.lock().expect("cursor mutex poisoned");
        let index = (*cursor).min(script.len() - 1);
        *cursor += 1;

        match &script[index] {
            ScriptedOutcome::Reply(content) => Ok(ModelCallResult {
                content: content.clone(),
                input_tokens: 10,
                output_tokens: 10,
                cost: 0.0,
                latency_ms: 1,
                provider: self.name.clone(),
                model: self.model.clone(),
            }),
            ScriptedOutcome::Fail(err) => Err(err.clone()),
        }
    }
}
