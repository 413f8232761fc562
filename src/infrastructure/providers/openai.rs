#[cfg(test)]
#[path = "openai_test.rs"]
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

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MessageRequest {
    role: String,
    content: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<MessageRequest>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionChoiceResponse {
    message: MessageRequest,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoiceResponse>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    response_format: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImageDataResponse {
    b64_json: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDataResponse>,
}

pub struct OpenAI {
    descriptor: ProviderDescriptor,
    chat_model: String,
    image_model: String,
    timeout: String,
}

impl Default for OpenAI {
    fn default() -> OpenAI {
        return OpenAI {
            descriptor: ProviderDescriptor {
                name: ProviderName::OpenAI,
                url: Config::get(ConfigKey::OpenAiURL),
                token: Config::get(ConfigKey::OpenAiToken),
                capabilities: vec![Capability::Text, Capability::Code, Capability::Image],
                priority: priority(ConfigKey::OpenAiPriority),
            },
            chat_model: Config::get(ConfigKey::OpenAiChatModel),
            image_model: Config::get(ConfigKey::OpenAiImageModel),
            timeout: Config::get(ConfigKey::HealthCheckTimeout),
        };
    }
}

impl OpenAI {
    fn model_for(&self, request: &GenerationRequest, default: &str) -> String {
        if request.provider == Some(ProviderName::OpenAI) {
            if let Some(model) = &request.options.model {
                return model.to_string();
            }
        }

        return default.to_string();
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<Generation> {
        let mut messages: Vec<MessageRequest> = request
            .history
            .iter()
            .map(|message| {
                return MessageRequest {
                    role: message.role.to_string(),
                    content: message.content.to_string(),
                };
            })
            .collect();

        messages.push(MessageRequest {
            role: "user".to_string(),
            content: request.prompt.to_string(),
        });

        let req = CompletionRequest {
            model: self.model_for(request, &self.chat_model),
            messages,
            temperature: request.options.temperature_for(request.capability),
            max_tokens: request.options.max_tokens(),
        };

        let res = reqwest::Client::new()
            .post(format!("{url}/v1/chat/completions", url = self.descriptor.url))
            .header("Authorization", format!("Bearer {}", self.descriptor.token))
            .json(&req)
            .send()
            .await?;

        let body = ensure_success(res, ProviderName::OpenAI)
            .await?
            .json::<CompletionResponse>()
            .await?;
        tracing::debug!(body = ?body, "OpenAI completion response");

        match body.choices.first() {
            Some(choice) => {
                return Ok(Generation::text(
                    ProviderName::OpenAI,
                    &req.model,
                    &choice.message.content,
                ));
            }
            None => bail!("OpenAI returned no choices"),
        }
    }

    async fn image(&self, request: &GenerationRequest) -> Result<Generation> {
        let req = ImageRequest {
            model: self.model_for(request, &self.image_model),
            prompt: request.prompt.to_string(),
            n: 1,
            size: request.options.size(),
            response_format: "b64_json".to_string(),
        };

        let res = reqwest::Client::new()
            .post(format!(
                "{url}/v1/images/generations",
                url = self.descriptor.url
            ))
            .header("Authorization", format!("Bearer {}", self.descriptor.token))
            .json(&req)
            .send()
            .await?;

        let body = ensure_success(res, ProviderName::OpenAI)
            .await?
            .json::<ImageResponse>()
            .await?;

        match body.data.first() {
            Some(image) => {
                return Ok(Generation::image(
                    ProviderName::OpenAI,
                    &req.model,
                    &png_data_url(&image.b64_json),
                ));
            }
            None => bail!("OpenAI returned no images"),
        }
    }
}

#[async_trait]
impl Provider for OpenAI {
    fn descriptor(&self) -> &ProviderDescriptor {
        return &self.descriptor;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.descriptor.url.is_empty() {
            bail!("OpenAI URL is not defined");
        }
        if self.descriptor.token.is_empty() {
            bail!("OpenAI token is not defined");
        }

        // The official API answers its index with a 404 or a 418, so there
        // is nothing useful to check there.
        if self.descriptor.url == "https://api.openai.com" {
            return Ok(());
        }

        let res = reqwest::Client::new()
            .get(&self.descriptor.url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let status = match res {
            Ok(res) => res.status().as_u16(),
            Err(err) => {
                tracing::error!(error = ?err, "OpenAI is not reachable");
                bail!("OpenAI is not reachable");
            }
        };

        if status >= 400 {
            tracing::error!(status = status, "OpenAI health check failed");
            bail!("OpenAI health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        if self.descriptor.token.is_empty() {
            bail!("OpenAI token is not defined");
        }

        if request.capability == Capability::Image {
            return self.image(request).await;
        }

        return self.complete(request).await;
    }
}
