//! The pipeline engine: runs a plan group by group, threading artifacts
//! through the run context and invoking the generation backend per stage.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{info, instrument, warn};

use sitescribe_capabilities::CapabilityRegistry;
use sitescribe_shared::{Result, SiteScribeError};

use crate::backend::{GenerationBackend, GenerationRequest, GenerationResponse};
use crate::context::RunContext;
use crate::stage::{PipelinePlan, Stage};

/// Retry policy for transiently failing backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per stage invocation (first try included).
    pub max_attempts: u32,
    /// Base delay; doubled after each failed attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Runs pipeline plans. Holds no state across runs.
#[derive(Debug, Default)]
pub struct PipelineEngine {
    retry: RetryPolicy,
}

impl PipelineEngine {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Execute the plan, returning the final stage's artifact value.
    ///
    /// Groups run strictly in order; stages within a group run concurrently
    /// and their artifacts are recorded only once the whole group has
    /// completed, so a fan-in stage always observes every branch.
    #[instrument(skip_all, fields(groups = plan.groups.len()))]
    pub async fn run(
        &self,
        plan: &PipelinePlan,
        backend: &dyn GenerationBackend,
        registry: &CapabilityRegistry,
        initial_name: &str,
        initial_value: Value,
    ) -> Result<Value> {
        plan.validate(initial_name)?;

        let mut ctx = RunContext::new(initial_name, initial_value);
        let mut last = None;

        for group in &plan.groups {
            let stage_runs = group
                .stages
                .iter()
                .map(|stage| self.run_stage(stage, &ctx, backend, registry));
            let results = join_all(stage_runs).await;

            // Fan-in barrier: nothing is recorded until every branch is in.
            for result in results {
                let (produces, value) = result?;
                ctx.record(&produces, value.clone());
                last = Some(value);
            }
        }

        // validate() rejects empty plans, so a last value always exists.
        last.ok_or_else(|| SiteScribeError::validation("pipeline produced no artifact"))
    }

    /// Run one stage: gather inputs, fetch capabilities, invoke the backend.
    async fn run_stage(
        &self,
        stage: &Stage,
        ctx: &RunContext,
        backend: &dyn GenerationBackend,
        registry: &CapabilityRegistry,
    ) -> Result<(String, Value)> {
        // All-or-nothing inputs: every required artifact must be present.
        let mut inputs = BTreeMap::new();
        for name in &stage.required {
            let value = ctx.get(name).ok_or_else(|| SiteScribeError::MissingArtifact {
                stage: stage.name.clone(),
                artifact: name.clone(),
            })?;
            inputs.insert(name.clone(), value.clone());
        }

        // The capability set is read fresh at each stage boundary.
        let capabilities = registry.capabilities_for(stage.capability_key()).await;

        let request = GenerationRequest {
            instructions: stage.instructions.clone(),
            inputs,
            capabilities,
        };

        let response = self.generate_with_retry(stage, backend, request).await?;

        info!(
            stage = %stage.name,
            produces = %stage.produces,
            tokens_out = response.tokens_out,
            "stage complete"
        );

        Ok((stage.produces.clone(), Value::String(response.text)))
    }

    /// Invoke the backend, retrying transient failures with exponential
    /// backoff up to the configured budget.
    async fn generate_with_retry(
        &self,
        stage: &Stage,
        backend: &dyn GenerationBackend,
        request: GenerationRequest,
    ) -> Result<GenerationResponse> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match backend.generate(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        stage = %stage.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient backend error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(SiteScribeError::Generation {
                        stage: stage.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
