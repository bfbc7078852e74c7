use async_trait::async_trait;
use skein_core::{AuthMode, CapabilityDescriptor, ProviderHealth, SkeinResult};
use std::collections::HashMap;

/// Contract every external integration implements.
///
/// Implementations are registered once at startup; discovery happens through
/// explicit `register` call sites rather than runtime scanning. A provider
/// with an empty name is not registrable — it can only live as a
/// sub-provider directly owned by a [`CompositeProvider`](crate::CompositeProvider).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique provider name. Empty means "not discoverable".
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn auth_mode(&self) -> AuthMode {
        AuthMode::None
    }

    /// Establish a connection using the given credentials.
    /// Returns `Ok(true)` when the provider is usable afterwards.
    async fn connect(&self, credentials: &HashMap<String, String>) -> SkeinResult<bool>;

    /// Close the connection and release resources.
    async fn disconnect(&self) -> SkeinResult<bool>;

    /// Whether a previous `connect` succeeded and was not torn down.
    fn is_connected(&self) -> bool;

    /// Enumerate the capabilities this provider can be asked to invoke.
    async fn capabilities(&self) -> SkeinResult<Vec<CapabilityDescriptor>>;

    /// Invoke a named capability with JSON parameters.
    async fn invoke(&self, capability: &str, params: serde_json::Value)
        -> SkeinResult<serde_json::Value>;

    /// Current connection health. Must not error; report
    /// [`ProviderHealth::Disconnected`] instead.
    async fn health_check(&self) -> ProviderHealth;

    // --- OAuth2 extension points (no-ops for non-OAuth providers) ---

    /// OAuth authorization URL for the given redirect, if applicable.
    fn authorization_url(&self, _redirect_uri: &str) -> Option<String> {
        None
    }

    /// Exchange an OAuth authorization code for tokens, if applicable.
    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> SkeinResult<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Refresh an expired OAuth token, if applicable.
    async fn refresh_token(
        &self,
        _refresh_token: &str,
    ) -> SkeinResult<Option<serde_json::Value>> {
        Ok(None)
    }
}
