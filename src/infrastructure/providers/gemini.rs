#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::ensure_success;
use super::priority;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Capability;
use crate::domain::models::Generation;
use crate::domain::models::GenerationRequest;
use crate::domain::models::Provider;
use crate::domain::models::ProviderDescriptor;
use crate::domain::models::ProviderName;
use crate::domain::models::Role;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

pub struct Gemini {
    descriptor: ProviderDescriptor,
    model: String,
    timeout: String,
}

impl Default for Gemini {
    fn default() -> Gemini {
        return Gemini {
            descriptor: ProviderDescriptor {
                name: ProviderName::Gemini,
                url: Config::get(ConfigKey::GeminiURL),
                token: Config::get(ConfigKey::GeminiToken),
                capabilities: vec![Capability::Text, Capability::Code],
                priority: priority(ConfigKey::GeminiPriority),
            },
            model: Config::get(ConfigKey::GeminiModel),
            timeout: Config::get(ConfigKey::HealthCheckTimeout),
        };
    }
}

impl Gemini {
    fn model_for(&self, request: &GenerationRequest) -> String {
        let mut model = self.model.to_string();
        if request.provider == Some(ProviderName::Gemini) {
            if let Some(requested) = &request.options.model {
                model = requested.to_string();
            }
        }

        return model.trim_start_matches("models/").to_string();
    }
}

#[async_trait]
impl Provider for Gemini {
    fn descriptor(&self) -> &ProviderDescriptor {
        return &self.descriptor;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.descriptor.url.is_empty() {
            bail!("Gemini URL is not defined");
        }
        if self.descriptor.token.is_empty() {
            bail!("Gemini token is not defined");
        }

        let url = format!(
            "{url}/v1beta/models/{model}?key={key}",
            url = self.descriptor.url,
            model = self.model.trim_start_matches("models/"),
            key = self.descriptor.token
        );

        let res = reqwest::Client::new()
            .get(&url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let status = match res {
            Ok(res) => res.status().as_u16(),
            Err(err) => {
                tracing::error!(error = ?err, "Gemini is not reachable");
                bail!("Gemini is not reachable");
            }
        };
        if status >= 400 {
            tracing::error!(status = status, "Gemini health check failed");
            bail!("Gemini health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        if self.descriptor.token.is_empty() {
            bail!("Gemini token is not defined");
        }
        if request.capability == Capability::Image {
            bail!("Gemini does not support image generation");
        }

        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::Assistant => "model",
                    Role::User => "user",
                };
                return Content {
                    role: role.to_string(),
                    parts: vec![Part {
                        text: message.content.to_string(),
                    }],
                };
            })
            .collect();

        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: request.prompt.to_string(),
            }],
        });

        let model = self.model_for(request);
        let req = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: request.options.temperature_for(request.capability),
                max_output_tokens: request.options.max_tokens(),
            },
        };

        let res = reqwest::Client::new()
            .post(format!(
                "{url}/v1beta/models/{model}:generateContent?key={key}",
                url = self.descriptor.url,
                key = self.descriptor.token,
            ))
            .json(&req)
            .send()
            .await?;

        let body = ensure_success(res, ProviderName::Gemini)
            .await?
            .json::<GenerateContentResponse>()
            .await?;
        tracing::debug!(body = ?body, "Gemini response");

        let text = body
            .candidates
            .first()
            .and_then(|candidate| return candidate.content.parts.first())
            .map(|part| return part.text.to_string());

        match text {
            Some(text) => return Ok(Generation::text(ProviderName::Gemini, &model, &text)),
            None => bail!("Gemini returned no candidates"),
        }
    }
}
