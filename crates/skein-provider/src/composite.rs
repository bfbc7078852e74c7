use crate::contract::Provider;
use async_trait::async_trait;
use skein_core::{AuthMode, CapabilityDescriptor, ProviderHealth, SkeinError, SkeinResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Which sub-provider answered the most recent `invoke` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLabel {
    Primary,
    Secondary,
    Unknown,
}

impl std::fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLabel::Primary => write!(f, "primary"),
            SourceLabel::Secondary => write!(f, "secondary"),
            SourceLabel::Unknown => write!(f, "unknown"),
        }
    }
}

/// A provider that routes calls to a primary (networked) sub-provider and
/// transparently falls back to a secondary (local) one on failure.
///
/// Agents above this layer never learn which concrete source answered;
/// a transient outage in the primary surfaces as `Degraded` at worst while
/// the secondary still works. The secondary is expected to be
/// credential-free (a local cache), so `connect` always brings it up and
/// only attempts the primary when credentials were supplied.
pub struct CompositeProvider {
    name: String,
    description: String,
    auth_mode: AuthMode,
    primary: Arc<dyn Provider>,
    secondary: Arc<dyn Provider>,
    last_source: RwLock<SourceLabel>,
}

impl CompositeProvider {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        primary: Arc<dyn Provider>,
        secondary: Arc<dyn Provider>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            auth_mode: AuthMode::OAuth2,
            primary,
            secondary,
            last_source: RwLock::new(SourceLabel::Unknown),
        }
    }

    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    /// Which sub-provider handled the most recent `invoke` call.
    pub async fn last_source(&self) -> SourceLabel {
        *self.last_source.read().await
    }

    /// Direct access to the primary sub-provider (OAuth flows, diagnostics).
    pub fn primary(&self) -> &Arc<dyn Provider> {
        &self.primary
    }

    /// Direct access to the secondary sub-provider.
    pub fn secondary(&self) -> &Arc<dyn Provider> {
        &self.secondary
    }
}

#[async_trait]
impl Provider for CompositeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Connect both sub-providers.
    ///
    /// The secondary always attempts to connect (no credentials needed).
    /// The primary only connects when credentials were supplied.
    async fn connect(&self, credentials: &HashMap<String, String>) -> SkeinResult<bool> {
        let secondary_ok = match self.secondary.connect(&HashMap::new()).await {
            Ok(ok) => {
                if ok {
                    info!(provider = %self.name, "secondary sub-provider connected");
                }
                ok
            }
            Err(e) => {
                warn!(provider = %self.name, error = %e, "secondary sub-provider failed to connect");
                false
            }
        };

        let mut primary_ok = false;
        if !credentials.is_empty() {
            primary_ok = match self.primary.connect(credentials).await {
                Ok(ok) => {
                    if ok {
                        info!(provider = %self.name, "primary sub-provider connected");
                    } else {
                        warn!(
                            provider = %self.name,
                            "primary sub-provider failed to connect; secondary is fallback"
                        );
                    }
                    ok
                }
                Err(e) => {
                    warn!(provider = %self.name, error = %e, "primary sub-provider connect error");
                    false
                }
            };
        }

        Ok(secondary_ok || primary_ok)
    }

    async fn disconnect(&self) -> SkeinResult<bool> {
        if let Err(e) = self.primary.disconnect().await {
            warn!(provider = %self.name, error = %e, "primary disconnect failed");
        }
        if let Err(e) = self.secondary.disconnect().await {
            warn!(provider = %self.name, error = %e, "secondary disconnect failed");
        }
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.primary.is_connected() || self.secondary.is_connected()
    }

    /// Prefer the primary's capability list when it is connected and answers
    /// with a non-empty list; otherwise report the secondary's.
    async fn capabilities(&self) -> SkeinResult<Vec<CapabilityDescriptor>> {
        if self.primary.is_connected() {
            match self.primary.capabilities().await {
                Ok(caps) if !caps.is_empty() => return Ok(caps),
                Ok(_) => {}
                Err(e) => {
                    debug!(provider = %self.name, error = %e, "primary capability listing failed");
                }
            }
        }
        self.secondary.capabilities().await
    }

    async fn invoke(
        &self,
        capability: &str,
        params: serde_json::Value,
    ) -> SkeinResult<serde_json::Value> {
        if self.primary.is_connected() {
            match self.primary.invoke(capability, params.clone()).await {
                Ok(result) => {
                    *self.last_source.write().await = SourceLabel::Primary;
                    debug!(provider = %self.name, capability, "primary invoke succeeded");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        provider = %self.name,
                        capability,
                        error = %e,
                        "primary invoke failed, falling back to secondary"
                    );
                }
            }
        }

        if self.secondary.is_connected() {
            *self.last_source.write().await = SourceLabel::Secondary;
            return self.secondary.invoke(capability, params).await;
        }

        Err(SkeinError::Provider(format!(
            "provider '{}': neither primary nor secondary sub-provider is connected",
            self.name
        )))
    }

    /// Healthy if either sub-provider is healthy; degraded while only an
    /// impaired-but-connected sub-provider remains; disconnected only when
    /// neither sub-provider is connected.
    async fn health_check(&self) -> ProviderHealth {
        let primary_up = self.primary.is_connected();
        if primary_up && self.primary.health_check().await == ProviderHealth::Healthy {
            return ProviderHealth::Healthy;
        }

        if self.secondary.is_connected() {
            return if self.secondary.health_check().await == ProviderHealth::Healthy {
                ProviderHealth::Healthy
            } else {
                ProviderHealth::Degraded
            };
        }

        if primary_up {
            ProviderHealth::Degraded
        } else {
            ProviderHealth::Disconnected
        }
    }

    // OAuth flows always belong to the networked primary.

    fn authorization_url(&self, redirect_uri: &str) -> Option<String> {
        self.primary.authorization_url(redirect_uri)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> SkeinResult<Option<serde_json::Value>> {
        self.primary.exchange_code(code, redirect_uri).await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> SkeinResult<Option<serde_json::Value>> {
        self.primary.refresh_token(refresh_token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Configurable sub-provider double: connection state, invoke behavior,
    /// and call counting.
    struct FakeProvider {
        name: &'static str,
        connected: AtomicBool,
        connect_succeeds: bool,
        fail_invoke: bool,
        health: ProviderHealth,
        invoke_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                connected: AtomicBool::new(false),
                connect_succeeds: true,
                fail_invoke: false,
                health: ProviderHealth::Healthy,
                invoke_calls: AtomicUsize::new(0),
            }
        }

        fn connected(self) -> Self {
            self.connected.store(true, Ordering::SeqCst);
            self
        }

        fn failing_invoke(mut self) -> Self {
            self.fail_invoke = true;
            self
        }

        fn with_health(mut self, health: ProviderHealth) -> Self {
            self.health = health;
            self
        }

        fn refusing_connect(mut self) -> Self {
            self.connect_succeeds = false;
            self
        }

        fn invoke_count(&self) -> usize {
            self.invoke_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn connect(&self, _credentials: &HashMap<String, String>) -> SkeinResult<bool> {
            if self.connect_succeeds {
                self.connected.store(true, Ordering::SeqCst);
            }
            Ok(self.connect_succeeds)
        }

        async fn disconnect(&self) -> SkeinResult<bool> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(true)
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn capabilities(&self) -> SkeinResult<Vec<CapabilityDescriptor>> {
            Ok(vec![CapabilityDescriptor::new(
                format!("{}_list", self.name),
                "list things",
            )])
        }

        async fn invoke(
            &self,
            capability: &str,
            _params: serde_json::Value,
        ) -> SkeinResult<serde_json::Value> {
            self.invoke_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_invoke {
                return Err(SkeinError::Provider(format!(
                    "{}: upstream call failed",
                    self.name
                )));
            }
            Ok(serde_json::json!({ "capability": capability, "source": self.name }))
        }

        async fn health_check(&self) -> ProviderHealth {
            if self.is_connected() {
                self.health
            } else {
                ProviderHealth::Disconnected
            }
        }
    }

    fn composite(primary: FakeProvider, secondary: FakeProvider) -> CompositeProvider {
        CompositeProvider::new(
            "notes",
            "meeting notes with cache fallback",
            Arc::new(primary),
            Arc::new(secondary),
        )
    }

    #[tokio::test]
    async fn test_invoke_prefers_primary() {
        let provider = composite(
            FakeProvider::new("api").connected(),
            FakeProvider::new("cache").connected(),
        );

        let result = provider
            .invoke("list_items", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["source"], "api");
        assert_eq!(provider.last_source().await, SourceLabel::Primary);
    }

    #[tokio::test]
    async fn test_invoke_falls_back_on_primary_failure() {
        let provider = composite(
            FakeProvider::new("api").connected().failing_invoke(),
            FakeProvider::new("cache").connected(),
        );

        let result = provider
            .invoke("list_items", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["source"], "cache");
        assert_eq!(provider.last_source().await, SourceLabel::Secondary);
    }

    #[tokio::test]
    async fn test_invoke_skips_disconnected_primary() {
        let primary = FakeProvider::new("api");
        let provider = composite(primary, FakeProvider::new("cache").connected());

        let result = provider
            .invoke("list_items", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["source"], "cache");
    }

    #[tokio::test]
    async fn test_invoke_errors_when_both_unavailable() {
        let provider = composite(
            FakeProvider::new("api").connected().failing_invoke(),
            FakeProvider::new("cache"),
        );

        let result = provider.invoke("list_items", serde_json::json!({})).await;
        assert!(matches!(result, Err(SkeinError::Provider(_))));
        // last_source untouched by the failed call
        assert_eq!(provider.last_source().await, SourceLabel::Unknown);
    }

    #[tokio::test]
    async fn test_connect_skips_primary_without_credentials() {
        let primary = Arc::new(FakeProvider::new("api"));
        let secondary = Arc::new(FakeProvider::new("cache"));
        let provider = CompositeProvider::new(
            "notes",
            "",
            primary.clone() as Arc<dyn Provider>,
            secondary.clone() as Arc<dyn Provider>,
        );

        let ok = provider.connect(&HashMap::new()).await.unwrap();
        assert!(ok);
        assert!(!primary.is_connected());
        assert!(secondary.is_connected());
    }

    #[tokio::test]
    async fn test_connect_attempts_primary_with_credentials() {
        let primary = Arc::new(FakeProvider::new("api"));
        let secondary = Arc::new(FakeProvider::new("cache"));
        let provider = CompositeProvider::new(
            "notes",
            "",
            primary.clone() as Arc<dyn Provider>,
            secondary.clone() as Arc<dyn Provider>,
        );

        let mut creds = HashMap::new();
        creds.insert("access_token".to_string(), "tok".to_string());
        assert!(provider.connect(&creds).await.unwrap());
        assert!(primary.is_connected());
    }

    #[tokio::test]
    async fn test_connect_succeeds_when_only_primary_comes_up() {
        let provider = composite(
            FakeProvider::new("api"),
            FakeProvider::new("cache").refusing_connect(),
        );

        let mut creds = HashMap::new();
        creds.insert("access_token".to_string(), "tok".to_string());
        assert!(provider.connect(&creds).await.unwrap());
    }

    #[tokio::test]
    async fn test_health_healthy_primary() {
        let provider = composite(
            FakeProvider::new("api").connected(),
            FakeProvider::new("cache"),
        );
        assert_eq!(provider.health_check().await, ProviderHealth::Healthy);
    }

    #[tokio::test]
    async fn test_health_degrades_to_secondary() {
        let provider = composite(
            FakeProvider::new("api"),
            FakeProvider::new("cache")
                .connected()
                .with_health(ProviderHealth::Degraded),
        );
        assert_eq!(provider.health_check().await, ProviderHealth::Degraded);
    }

    #[tokio::test]
    async fn test_health_healthy_via_secondary() {
        let provider = composite(
            FakeProvider::new("api"),
            FakeProvider::new("cache").connected(),
        );
        assert_eq!(provider.health_check().await, ProviderHealth::Healthy);
    }

    #[tokio::test]
    async fn test_health_disconnected_when_neither_connected() {
        let provider = composite(FakeProvider::new("api"), FakeProvider::new("cache"));
        assert_eq!(provider.health_check().await, ProviderHealth::Disconnected);
    }

    #[tokio::test]
    async fn test_health_degraded_when_only_unhealthy_primary() {
        let provider = composite(
            FakeProvider::new("api")
                .connected()
                .with_health(ProviderHealth::Degraded),
            FakeProvider::new("cache"),
        );
        assert_eq!(provider.health_check().await, ProviderHealth::Degraded);
    }

    #[tokio::test]
    async fn test_capabilities_prefer_connected_primary() {
        let provider = composite(
            FakeProvider::new("api").connected(),
            FakeProvider::new("cache").connected(),
        );
        let caps = provider.capabilities().await.unwrap();
        assert_eq!(caps[0].name, "api_list");

        let provider = composite(
            FakeProvider::new("api"),
            FakeProvider::new("cache").connected(),
        );
        let caps = provider.capabilities().await.unwrap();
        assert_eq!(caps[0].name, "cache_list");
    }

    #[tokio::test]
    async fn test_secondary_not_called_while_primary_healthy() {
        let primary = Arc::new(FakeProvider::new("api").connected());
        let secondary = Arc::new(FakeProvider::new("cache").connected());
        let provider = CompositeProvider::new(
            "notes",
            "",
            primary.clone() as Arc<dyn Provider>,
            secondary.clone() as Arc<dyn Provider>,
        );

        provider
            .invoke("list_items", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(primary.invoke_count(), 1);
        assert_eq!(secondary.invoke_count(), 0);
    }
}
