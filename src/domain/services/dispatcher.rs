#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;

use std::time::Instant;

use anyhow::Result;
use dashmap::DashMap;
use thiserror::Error;

use crate::domain::models::Capability;
use crate::domain::models::Generation;
use crate::domain::models::GenerationRequest;
use crate::domain::models::ProviderBox;
use crate::domain::models::ProviderName;
use crate::domain::models::ProviderStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: ProviderName,
    pub error: String,
}

/// Raised once every eligible provider has been tried, or when there was
/// none to try.
#[derive(Debug, Error)]
#[error("No available {capability} generation provider succeeded")]
pub struct DispatchError {
    pub capability: Capability,
    pub failures: Vec<ProviderFailure>,
}

type CacheKey = (ProviderName, Capability, Option<String>, String);

pub struct Dispatcher {
    providers: Vec<ProviderBox>,
    cache: Option<DashMap<CacheKey, Generation>>,
}

impl Dispatcher {
    pub fn new(providers: Vec<ProviderBox>) -> Dispatcher {
        return Dispatcher {
            providers,
            cache: None,
        };
    }

    /// Remembers successful generations per (provider, capability, pinned
    /// model, prompt) for the lifetime of the dispatcher. There is no
    /// eviction.
    pub fn with_cache(mut self, enabled: bool) -> Dispatcher {
        if enabled {
            self.cache = Some(DashMap::new());
        }
        return self;
    }

    /// Enabled providers offering `capability`, lowest priority value first.
    /// Providers sharing a priority keep their registry order.
    pub fn available(
        &self,
        capability: Capability,
        only: Option<ProviderName>,
    ) -> Vec<&ProviderBox> {
        let mut providers = self
            .providers
            .iter()
            .filter(|provider| {
                let descriptor = provider.descriptor();
                return descriptor.is_enabled()
                    && descriptor.supports(capability)
                    && only.map_or(true, |name| return name == descriptor.name);
            })
            .collect::<Vec<&ProviderBox>>();

        providers.sort_by_key(|provider| return provider.descriptor().priority);

        return providers;
    }

    fn cache_key(&self, provider: ProviderName, request: &GenerationRequest) -> Option<CacheKey> {
        // Conversation turns depend on more than the prompt.
        if self.cache.is_none() || !request.history.is_empty() {
            return None;
        }

        return Some((
            provider,
            request.capability,
            request.options.model.clone(),
            request.prompt.to_string(),
        ));
    }

    pub async fn dispatch(&self, request: &GenerationRequest) -> Result<Generation> {
        let mut failures: Vec<ProviderFailure> = vec![];

        for provider in self.available(request.capability, request.provider) {
            let name = provider.descriptor().name;
            let cache_key = self.cache_key(name, request);

            if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
                if let Some(hit) = cache.get(key) {
                    tracing::debug!(
                        provider = %name,
                        capability = %request.capability,
                        "Serving cached generation"
                    );
                    return Ok(hit.value().clone());
                }
            }

            let started = Instant::now();
            match provider.generate(request).await {
                Ok(generation) => {
                    tracing::debug!(
                        provider = %name,
                        capability = %request.capability,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Generation succeeded"
                    );
                    if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
                        cache.insert(key, generation.clone());
                    }
                    return Ok(generation);
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %name,
                        capability = %request.capability,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "Provider failed, trying next"
                    );
                    failures.push(ProviderFailure {
                        provider: name,
                        error: err.to_string(),
                    });
                }
            }
        }

        return Err(DispatchError {
            capability: request.capability,
            failures,
        }
        .into());
    }

    /// Registry order, disabled providers included.
    pub fn status(&self) -> Vec<ProviderStatus> {
        return self
            .providers
            .iter()
            .map(|provider| return provider.descriptor().status())
            .collect();
    }

    /// Health checks every enabled provider, one after another.
    pub async fn health(&self) -> Vec<(ProviderName, Result<()>)> {
        let mut results = vec![];
        for provider in self.providers.iter() {
            let descriptor = provider.descriptor();
            if !descriptor.is_enabled() {
                continue;
            }
            results.push((descriptor.name, provider.health_check().await));
        }

        return results;
    }
}
