use serde::{Deserialize, Serialize};

/// Current health of a provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    /// Connected and answering.
    Healthy,
    /// Connected but impaired (e.g. only a fallback source is available).
    Degraded,
    /// No usable connection.
    Disconnected,
}

impl std::fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderHealth::Healthy => write!(f, "healthy"),
            ProviderHealth::Degraded => write!(f, "degraded"),
            ProviderHealth::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// How a provider authenticates against its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    None,
    ApiKey,
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl Default for AuthMode {
    fn default() -> Self {
        AuthMode::None
    }
}

/// Metadata describing one capability a provider can be asked to invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema: serde_json::json!({}),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.parameters_schema = schema;
        self
    }
}
