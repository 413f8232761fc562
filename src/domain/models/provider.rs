#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;
use strum::EnumString;
use strum::EnumVariantNames;

use super::Capability;
use super::Generation;
use super::GenerationRequest;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    EnumVariantNames,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderName {
    Gemini,
    OpenAI,
    Stability,
}

impl ProviderName {
    pub fn parse(text: &str) -> Option<ProviderName> {
        return text.to_lowercase().parse::<ProviderName>().ok();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub name: ProviderName,
    pub url: String,
    pub token: String,
    pub capabilities: Vec<Capability>,
    pub priority: u32,
}

impl ProviderDescriptor {
    /// A provider only takes part in dispatch once it has a credential.
    pub fn is_enabled(&self) -> bool {
        return !self.token.is_empty();
    }

    pub fn supports(&self, capability: Capability) -> bool {
        return self.capabilities.contains(&capability);
    }

    pub fn status(&self) -> ProviderStatus {
        return ProviderStatus {
            name: self.name,
            enabled: self.is_enabled(),
            priority: self.priority,
            capabilities: self.capabilities.clone(),
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: ProviderName,
    pub enabled: bool,
    pub priority: u32,
    pub capabilities: Vec<Capability>,
}

#[async_trait]
pub trait Provider {
    /// Static registry entry, built once from configuration.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Used by `status --check` to verify the provider is reachable with the
    /// configured credential.
    async fn health_check(&self) -> Result<()>;

    /// Performs exactly one request against the provider and normalizes the
    /// response. Non-2xx statuses, transport failures, and malformed bodies
    /// are all returned as errors so the dispatcher can move on.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

pub type ProviderBox = Box<dyn Provider + Send + Sync>;
