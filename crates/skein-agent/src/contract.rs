use async_trait::async_trait;
use skein_core::{PipelineState, SkeinResult};
use skein_provider::{Provider, ProviderRegistry};
use skein_store::RunStore;
use std::sync::Arc;

/// Shared handles available to every agent during `process`.
///
/// Cloning is cheap; all fields are reference-counted.
#[derive(Clone)]
pub struct AgentContext {
    /// Registered external integrations.
    pub providers: Arc<ProviderRegistry>,
    /// Run-record persistence, for agents that inspect run history.
    pub runs: Arc<dyn RunStore>,
}

impl AgentContext {
    pub fn new(providers: Arc<ProviderRegistry>, runs: Arc<dyn RunStore>) -> Self {
        Self { providers, runs }
    }

    /// Look up a provider by name.
    pub fn provider(&self, name: &str) -> SkeinResult<Arc<dyn Provider>> {
        self.providers.get(name)
    }
}

/// Contract each pipeline step implements.
///
/// Agents are stateless between runs: everything a run accumulates lives in
/// the [`PipelineState`] passed through `process`, and everything persisted
/// about the execution lives in the run record written around it.
///
/// `process` takes the state by value and hands back the (possibly
/// transformed) state. Returning `Err` is pipeline-fatal: downstream agents
/// of the same run are not executed. Per-item failures that should not stop
/// the pipeline belong in the state's error list instead.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique agent name within the whole registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Pipeline this agent belongs to.
    fn pipeline(&self) -> &str;

    /// Names of agents in the same pipeline that must run before this one.
    /// Dependencies on agents of other pipelines are ignored during
    /// ordering but flagged by registry validation if unknown entirely.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of providers this agent invokes.
    fn required_providers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Gate executed right before `process`. Returning `false` skips the
    /// agent for this run without writing a run record.
    async fn should_run(&self, _state: &PipelineState) -> bool {
        true
    }

    /// Do the work. Mutate counters, values and errors on the state and
    /// return it for the next agent in the resolved order.
    async fn process(
        &self,
        state: PipelineState,
        ctx: &AgentContext,
    ) -> SkeinResult<PipelineState>;
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name())
            .field("pipeline", &self.pipeline())
            .finish()
    }
}
