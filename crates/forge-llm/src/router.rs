//! `StageRouter` — walks a stage's ordered `(provider, model)` choices,
//! advancing on classified-retryable failures, and accumulates per-call
//! metrics atomically (`spec.md` §4.3, §5 shared-resource policy).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use forge_core::error::{AttemptError, ForgeError, ForgeErrorKind};
use forge_core::ids::StageId;
use forge_core::ports::{ModelCallOpts, ModelCallResult, ModelProvider, StageRouterPort};

/// A single `(provider, model)` choice in a stage's fallback order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderChoice {
    pub provider: String,
    pub model: String,
}

impl ProviderChoice {
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self { provider: provider.into(), model: model.into() }
    }

    fn key(&self) -> String {
        format!("{}::{}", self.provider, self.model)
    }
}

/// Cumulative, atomically-updated counters for one `(stage, provider, model)`
/// triple.
#[derive(Debug, Default)]
pub struct CallMetrics {
    pub calls: AtomicU64,
    pub failures: AtomicU64,
    pub input_tokens: AtomicU64,
    pub output_tokens: AtomicU64,
    /// Cost accumulated in micro-dollars (`cost * 1_000_000`) so it can be
    /// stored in an `AtomicU64` without losing precision across many calls.
    pub cost_micros: AtomicU64,
    pub latency_ms_total: AtomicU64,
}

impl CallMetrics {
    #[must_use]
    pub fn cost_dollars(&self) -> f64 {
        self.cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

/// Routes each stage's model call across its configured primary and
/// fallbacks, recording per-`(stage, provider, model)` metrics.
pub struct StageRouter {
    routes: HashMap<StageId, Vec<ProviderChoice>>,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    pricing_per_1k_tokens: HashMap<String, f64>,
    metrics: DashMap<(StageId, String), Arc<CallMetrics>>,
}

impl StageRouter {
    #[must_use]
    pub fn new(
        routes: HashMap<StageId, Vec<ProviderChoice>>,
        providers: HashMap<String, Arc<dyn ModelProvider>>,
        pricing_per_1k_tokens: HashMap<String, f64>,
    ) -> Self {
        Self {
            routes,
            providers,
            pricing_per_1k_tokens,
            metrics: DashMap::new(),
        }
    }

    #[must_use]
    pub fn metrics_for(&self, stage_id: StageId, choice: &ProviderChoice) -> Option<Arc<CallMetrics>> {
        self.metrics.get(&(stage_id, choice.key())).map(|entry| entry.clone())
    }

    fn price(&self, model: &str) -> f64 {
        self.pricing_per_1k_tokens.get(model).copied().unwrap_or(0.0)
    }

    fn record(&self, stage_id: StageId, choice: &ProviderChoice, result: Option<&ModelCallResult>) {
        let entry = self
            .metrics
            .entry((stage_id, choice.key()))
            .or_insert_with(|| Arc::new(CallMetrics::default()))
            .clone();
        entry.calls.fetch_add(1, Ordering::Relaxed);
        match result {
            Some(r) => {
                entry.input_tokens.fetch_add(r.input_tokens, Ordering::Relaxed);
                entry.output_tokens.fetch_add(r.output_tokens, Ordering::Relaxed);
                let cost_micros = (r.cost * 1_000_000.0).round() as u64;
                entry.cost_micros.fetch_add(cost_micros, Ordering::Relaxed);
                entry.latency_ms_total.fetch_add(r.latency_ms, Ordering::Relaxed);
            }
            None => {
                entry.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[async_trait]
impl StageRouterPort for StageRouter {
    async fn call_stage(
        &self,
        stage_id: StageId,
        prompt: &str,
        opts: &ModelCallOpts,
    ) -> Result<ModelCallResult, ForgeError> {
        let choices = self.routes.get(&stage_id).cloned().unwrap_or_default();
        if choices.is_empty() {
            return Err(ForgeError::new(ForgeErrorKind::FallbackExhausted { attempts: Vec::new() }));
        }

        let mut attempts = Vec::new();
        for choice in &choices {
            let Some(provider) = self.providers.get(&choice.key()) else {
                attempts.push(AttemptError {
                    provider: choice.provider.clone(),
                    model: choice.model.clone(),
                    message: "no provider registered for this choice".to_string(),
                });
                continue;
            };

            match provider.call(prompt, opts).await {
                Ok(mut result) => {
                    result.provider = choice.provider.clone();
                    result.model = choice.model.clone();
                    let price_per_1k = self.price(&choice.model);
                    result.cost = (result.input_tokens + result.output_tokens) as f64 / 1000.0 * price_per_1k;
                    self.record(stage_id, choice, Some(&result));
                    return Ok(result);
                }
                Err(err) => {
                    self.record(stage_id, choice, None);
                    attempts.push(AttemptError {
                        provider: choice.provider.clone(),
                        model: choice.model.clone(),
                        message: err.message.clone(),
                    });
                    if err.kind.advances_router_fallback() {
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(ForgeError::new(ForgeErrorKind::FallbackExhausted { attempts }))
    }
}
