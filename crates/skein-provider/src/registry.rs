use crate::contract::Provider;
use skein_core::{ProviderHealth, SkeinError, SkeinResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Central registry of named provider instances.
///
/// Registration happens once at process start; lookups and health sweeps
/// run for the lifetime of the process.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    order: Vec<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a provider under its own name.
    ///
    /// Fails if the name is empty (unnamed providers are only reachable as
    /// a composite's sub-provider) or already taken.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> SkeinResult<()> {
        let name = provider.name().to_string();
        if name.is_empty() {
            return Err(SkeinError::Config(
                "provider must define a name to be registered".to_string(),
            ));
        }
        if self.providers.contains_key(&name) {
            return Err(SkeinError::Config(format!(
                "provider '{name}' is already registered"
            )));
        }
        info!(provider = %name, "Registered provider");
        self.order.push(name.clone());
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> SkeinResult<Arc<dyn Provider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            SkeinError::Provider(format!("provider '{name}' not found in registry"))
        })
    }

    /// Whether a provider with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// All providers in registration order.
    pub fn list_all(&self) -> Vec<Arc<dyn Provider>> {
        self.order
            .iter()
            .filter_map(|name| self.providers.get(name).cloned())
            .collect()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Run health checks on every registered provider.
    pub async fn health_check_all(&self) -> HashMap<String, ProviderHealth> {
        let mut results = HashMap::new();
        for name in &self.order {
            if let Some(provider) = self.providers.get(name) {
                results.insert(name.clone(), provider.health_check().await);
            }
        }
        results
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
