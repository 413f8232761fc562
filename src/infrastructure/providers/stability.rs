#[cfg(test)]
#[path = "stability_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::ensure_success;
use super::png_data_url;
use super::priority;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Capability;
use crate::domain::models::Generation;
use crate::domain::models::GenerationRequest;
use crate::domain::models::Provider;
use crate::domain::models::ProviderDescriptor;
use crate::domain::models::ProviderName;

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TextPrompt {
    text: String,
    weight: f32,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TextToImageRequest {
    text_prompts: Vec<TextPrompt>,
    cfg_scale: f32,
    height: u32,
    width: u32,
    steps: u32,
    samples: u32,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Artifact {
    base64: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TextToImageResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

pub struct Stability {
    descriptor: ProviderDescriptor,
    engine: String,
    timeout: String,
}

impl Default for Stability {
    fn default() -> Stability {
        return Stability {
            descriptor: ProviderDescriptor {
                name: ProviderName::Stability,
                url: Config::get(ConfigKey::StabilityURL),
                token: Config::get(ConfigKey::StabilityToken),
                capabilities: vec![Capability::Image],
                priority: priority(ConfigKey::StabilityPriority),
            },
            engine: Config::get(ConfigKey::StabilityEngine),
            timeout: Config::get(ConfigKey::HealthCheckTimeout),
        };
    }
}

#[async_trait]
impl Provider for Stability {
    fn descriptor(&self) -> &ProviderDescriptor {
        return &self.descriptor;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.descriptor.url.is_empty() {
            bail!("Stability URL is not defined");
        }
        if self.descriptor.token.is_empty() {
            bail!("Stability token is not defined");
        }

        let res = reqwest::Client::new()
            .get(format!("{url}/v1/user/account", url = self.descriptor.url))
            .header("Authorization", format!("Bearer {}", self.descriptor.token))
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let status = match res {
            Ok(res) => res.status().as_u16(),
            Err(err) => {
                tracing::error!(error = ?err, "Stability is not reachable");
                bail!("Stability is not reachable");
            }
        };

        if status >= 400 {
            tracing::error!(status = status, "Stability health check failed");
            bail!("Stability health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        if self.descriptor.token.is_empty() {
            bail!("Stability token is not defined");
        }
        if request.capability != Capability::Image {
            bail!("Stability only supports image generation");
        }

        let engine = request
            .options
            .engine
            .clone()
            .unwrap_or_else(|| return self.engine.to_string());

        let req = TextToImageRequest {
            text_prompts: vec![TextPrompt {
                text: request.prompt.to_string(),
                weight: 1.0,
            }],
            cfg_scale: request.options.cfg_scale(),
            height: request.options.height(),
            width: request.options.width(),
            steps: request.options.steps(),
            samples: 1,
        };

        let res = reqwest::Client::new()
            .post(format!(
                "{url}/v1/generation/{engine}/text-to-image",
                url = self.descriptor.url
            ))
            .header("Authorization", format!("Bearer {}", self.descriptor.token))
            .header("Accept", "application/json")
            .json(&req)
            .send()
            .await?;

        let body = ensure_success(res, ProviderName::Stability)
            .await?
            .json::<TextToImageResponse>()
            .await?;

        match body.artifacts.first() {
            Some(artifact) => {
                return Ok(Generation::image(
                    ProviderName::Stability,
                    &engine,
                    &png_data_url(&artifact.base64),
                ));
            }
            None => bail!("Stability returned no artifacts"),
        }
    }
}
