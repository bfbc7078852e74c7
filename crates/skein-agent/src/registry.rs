use crate::contract::Agent;
use skein_core::{SkeinError, SkeinResult};
use skein_provider::ProviderRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Central registry of agents, grouped by pipeline.
///
/// Registration happens once at process start. Execution order within a
/// pipeline comes from [`resolve_dependencies`](Self::resolve_dependencies),
/// which topologically sorts the pipeline's agents by their declared
/// dependencies; ties are broken by registration order, so the result is
/// deterministic for a fixed set of `register` calls.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
    order: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register an agent under its own name.
    ///
    /// Fails if the name is empty or already taken.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> SkeinResult<()> {
        let name = agent.name().to_string();
        if name.is_empty() {
            return Err(SkeinError::Config(
                "agent must define a name to be registered".to_string(),
            ));
        }
        if self.agents.contains_key(&name) {
            return Err(SkeinError::Config(format!(
                "agent '{name}' is already registered"
            )));
        }
        info!(agent = %name, pipeline = %agent.pipeline(), "Registered agent");
        self.order.push(name.clone());
        self.agents.insert(name, agent);
        Ok(())
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> SkeinResult<Arc<dyn Agent>> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| SkeinError::Agent(format!("agent '{name}' not found in registry")))
    }

    /// All agents in registration order.
    pub fn list_all(&self) -> Vec<Arc<dyn Agent>> {
        self.order
            .iter()
            .filter_map(|name| self.agents.get(name).cloned())
            .collect()
    }

    /// Agents belonging to one pipeline, in registration order.
    pub fn list_by_pipeline(&self, pipeline: &str) -> Vec<Arc<dyn Agent>> {
        self.list_all()
            .into_iter()
            .filter(|agent| agent.pipeline() == pipeline)
            .collect()
    }

    /// Distinct pipeline names, in first-registration order.
    pub fn pipelines(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.list_all()
            .into_iter()
            .map(|agent| agent.pipeline().to_string())
            .filter(|pipeline| seen.insert(pipeline.clone()))
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Resolve the execution order for one pipeline.
    ///
    /// Topological sort over dependencies pointing at agents of the same
    /// pipeline; dependencies on agents outside the pipeline do not
    /// constrain the order here. Errors if the pipeline has no agents or
    /// the in-pipeline dependencies form a cycle.
    pub fn resolve_dependencies(&self, pipeline: &str) -> SkeinResult<Vec<Arc<dyn Agent>>> {
        let members = self.list_by_pipeline(pipeline);
        if members.is_empty() {
            return Err(SkeinError::Config(format!(
                "pipeline '{pipeline}' has no registered agents"
            )));
        }

        let member_names: HashSet<String> =
            members.iter().map(|a| a.name().to_string()).collect();
        let mut remaining: Vec<Arc<dyn Agent>> = members;
        let mut placed: HashSet<String> = HashSet::new();
        let mut ordered = Vec::new();

        while !remaining.is_empty() {
            // First ready agent in registration order keeps ties stable.
            let next = remaining.iter().position(|agent| {
                agent
                    .dependencies()
                    .iter()
                    .filter(|dep| member_names.contains(dep.as_str()))
                    .all(|dep| placed.contains(dep))
            });
            match next {
                Some(idx) => {
                    let agent = remaining.remove(idx);
                    placed.insert(agent.name().to_string());
                    ordered.push(agent);
                }
                None => {
                    let stuck: Vec<&str> = remaining.iter().map(|a| a.name()).collect();
                    return Err(SkeinError::Config(format!(
                        "dependency cycle in pipeline '{pipeline}' involving: {}",
                        stuck.join(", ")
                    )));
                }
            }
        }
        Ok(ordered)
    }

    /// Check every declared dependency against the registry.
    ///
    /// Returns one message per dependency that names no registered agent.
    /// An empty result means the dependency graph is closed.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for agent in self.list_all() {
            for dep in agent.dependencies() {
                if !self.agents.contains_key(&dep) {
                    issues.push(format!(
                        "agent '{}' depends on unknown agent '{dep}'",
                        agent.name()
                    ));
                }
            }
        }
        issues
    }

    /// Check every declared provider requirement against a provider
    /// registry. Returns one message per missing provider.
    pub fn validate_providers(&self, providers: &ProviderRegistry) -> Vec<String> {
        let mut issues = Vec::new();
        for agent in self.list_all() {
            for required in agent.required_providers() {
                if !providers.contains(&required) {
                    issues.push(format!(
                        "agent '{}' requires unregistered provider '{required}'",
                        agent.name()
                    ));
                }
            }
        }
        issues
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::contract::AgentContext;
    use async_trait::async_trait;
    use skein_core::PipelineState;

    struct StubAgent {
        name: &'static str,
        pipeline: &'static str,
        deps: Vec<&'static str>,
        providers: Vec<&'static str>,
    }

    impl StubAgent {
        fn new(name: &'static str, pipeline: &'static str, deps: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                pipeline,
                deps,
                providers: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn pipeline(&self) -> &str {
            self.pipeline
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.iter().map(|d| d.to_string()).collect()
        }

        fn required_providers(&self) -> Vec<String> {
            self.providers.iter().map(|p| p.to_string()).collect()
        }

        async fn process(
            &self,
            state: PipelineState,
            _ctx: &AgentContext,
        ) -> SkeinResult<PipelineState> {
            Ok(state)
        }
    }

    fn names(agents: &[Arc<dyn Agent>]) -> Vec<&str> {
        agents.iter().map(|a| a.name()).collect()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry
            .register(StubAgent::new("item_sync", "sync", vec![]))
            .unwrap();

        assert_eq!(registry.agent_count(), 1);
        assert_eq!(registry.get("item_sync").unwrap().pipeline(), "sync");
        assert!(registry.get("ghost").is_err());
    }

    #[test]
    fn test_register_rejects_empty_and_duplicate_names() {
        let mut registry = AgentRegistry::new();
        assert!(matches!(
            registry.register(StubAgent::new("", "sync", vec![])),
            Err(SkeinError::Config(_))
        ));

        registry
            .register(StubAgent::new("item_sync", "sync", vec![]))
            .unwrap();
        assert!(matches!(
            registry.register(StubAgent::new("item_sync", "sync", vec![])),
            Err(SkeinError::Config(_))
        ));
        assert_eq!(registry.agent_count(), 1);
    }

    #[test]
    fn test_pipeline_grouping() {
        let mut registry = AgentRegistry::new();
        registry.register(StubAgent::new("a", "sync", vec![])).unwrap();
        registry.register(StubAgent::new("b", "briefing", vec![])).unwrap();
        registry.register(StubAgent::new("c", "sync", vec![])).unwrap();

        assert_eq!(names(&registry.list_by_pipeline("sync")), vec!["a", "c"]);
        assert_eq!(registry.pipelines(), vec!["sync", "briefing"]);
    }

    #[test]
    fn test_resolve_orders_by_dependencies() {
        let mut registry = AgentRegistry::new();
        // Registered out of dependency order on purpose.
        registry.register(StubAgent::new("c", "sync", vec!["b"])).unwrap();
        registry.register(StubAgent::new("a", "sync", vec![])).unwrap();
        registry.register(StubAgent::new("b", "sync", vec!["a"])).unwrap();

        let ordered = registry.resolve_dependencies("sync").unwrap();
        assert_eq!(names(&ordered), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resolve_breaks_ties_by_registration_order() {
        let mut registry = AgentRegistry::new();
        registry.register(StubAgent::new("root", "sync", vec![])).unwrap();
        registry.register(StubAgent::new("left", "sync", vec!["root"])).unwrap();
        registry.register(StubAgent::new("right", "sync", vec!["root"])).unwrap();

        let ordered = registry.resolve_dependencies("sync").unwrap();
        assert_eq!(names(&ordered), vec!["root", "left", "right"]);
    }

    #[test]
    fn test_resolve_ignores_cross_pipeline_dependencies() {
        let mut registry = AgentRegistry::new();
        registry.register(StubAgent::new("upstream", "sync", vec![])).unwrap();
        registry
            .register(StubAgent::new("digest", "briefing", vec!["upstream"]))
            .unwrap();

        let ordered = registry.resolve_dependencies("briefing").unwrap();
        assert_eq!(names(&ordered), vec!["digest"]);
    }

    #[test]
    fn test_resolve_detects_cycle() {
        let mut registry = AgentRegistry::new();
        registry.register(StubAgent::new("a", "sync", vec!["b"])).unwrap();
        registry.register(StubAgent::new("b", "sync", vec!["a"])).unwrap();

        let err = registry.resolve_dependencies("sync").unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
        assert!(err.to_string().contains("a"));
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_resolve_empty_pipeline_errors() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.resolve_dependencies("sync"),
            Err(SkeinError::Config(_))
        ));
    }

    #[test]
    fn test_validate_reports_unknown_dependencies() {
        let mut registry = AgentRegistry::new();
        registry.register(StubAgent::new("a", "sync", vec![])).unwrap();
        registry
            .register(StubAgent::new("b", "sync", vec!["a", "missing"]))
            .unwrap();

        let issues = registry.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0], "agent 'b' depends on unknown agent 'missing'");
    }

    #[test]
    fn test_validate_providers_reports_missing() {
        let mut registry = AgentRegistry::new();
        registry
            .register(Arc::new(StubAgent {
                name: "digest",
                pipeline: "briefing",
                deps: vec![],
                providers: vec!["notes"],
            }))
            .unwrap();

        let providers = ProviderRegistry::new();
        let issues = registry.validate_providers(&providers);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("unregistered provider 'notes'"));
    }
}
