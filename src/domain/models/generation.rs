#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Capability;
use super::Message;
use super::ProviderName;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CODE_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
pub const DEFAULT_IMAGE_DIMENSION: u32 = 1024;
pub const DEFAULT_IMAGE_STEPS: u32 = 30;
pub const DEFAULT_CFG_SCALE: f32 = 7.0;

/// Provider agnostic knobs. Unset values fall back to per capability
/// defaults when a provider builds its request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
    pub size: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f32>,
    pub engine: Option<String>,
}

impl GenerationOptions {
    pub fn temperature_for(&self, capability: Capability) -> f32 {
        if let Some(temperature) = self.temperature {
            return temperature;
        }
        if capability == Capability::Code {
            return DEFAULT_CODE_TEMPERATURE;
        }

        return DEFAULT_TEMPERATURE;
    }

    pub fn max_tokens(&self) -> u32 {
        return self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    }

    pub fn size(&self) -> String {
        return self
            .size
            .clone()
            .unwrap_or_else(|| return DEFAULT_IMAGE_SIZE.to_string());
    }

    pub fn width(&self) -> u32 {
        return self.width.unwrap_or(DEFAULT_IMAGE_DIMENSION);
    }

    pub fn height(&self) -> u32 {
        return self.height.unwrap_or(DEFAULT_IMAGE_DIMENSION);
    }

    pub fn steps(&self) -> u32 {
        return self.steps.unwrap_or(DEFAULT_IMAGE_STEPS);
    }

    pub fn cfg_scale(&self) -> f32 {
        return self.cfg_scale.unwrap_or(DEFAULT_CFG_SCALE);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub capability: Capability,
    pub prompt: String,
    pub history: Vec<Message>,
    pub options: GenerationOptions,
    /// Restricts dispatch to a single provider when set.
    pub provider: Option<ProviderName>,
}

impl GenerationRequest {
    pub fn new(capability: Capability, prompt: &str) -> GenerationRequest {
        return GenerationRequest {
            capability,
            prompt: prompt.to_string(),
            history: vec![],
            options: GenerationOptions::default(),
            provider: None,
        };
    }

    pub fn text(prompt: &str) -> GenerationRequest {
        return GenerationRequest::new(Capability::Text, prompt);
    }

    pub fn image(prompt: &str) -> GenerationRequest {
        return GenerationRequest::new(Capability::Image, prompt);
    }

    pub fn code(prompt: &str, language: &str) -> GenerationRequest {
        let text = format!(
            "Write {language} code that: {prompt}

Requirements:
- Return only the code
- Include appropriate comments
- Use best practices for {language}
- Format the code properly"
        );

        return GenerationRequest::new(Capability::Code, &text);
    }

    pub fn explain(code: &str, language: &str) -> GenerationRequest {
        let text = format!(
            "Explain this {language} code:

{code}

Explanation should:
- Describe what the code does
- Explain key functions or methods
- Note any important algorithms or patterns
- Be concise but comprehensive"
        );

        return GenerationRequest::new(Capability::Text, &text);
    }

    pub fn chat(message: &str, history: &[Message]) -> GenerationRequest {
        let mut req = GenerationRequest::new(Capability::Text, message);
        req.history = history.to_vec();
        return req;
    }

    pub fn with_options(mut self, options: GenerationOptions) -> GenerationRequest {
        self.options = options;
        return self;
    }

    pub fn with_provider(mut self, provider: Option<ProviderName>) -> GenerationRequest {
        self.provider = provider;
        return self;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationOutput {
    Text(String),
    Image { url: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub output: GenerationOutput,
    pub provider: ProviderName,
    pub model: String,
}

impl Generation {
    pub fn text(provider: ProviderName, model: &str, content: &str) -> Generation {
        return Generation {
            output: GenerationOutput::Text(content.to_string()),
            provider,
            model: model.to_string(),
        };
    }

    pub fn image(provider: ProviderName, model: &str, url: &str) -> Generation {
        return Generation {
            output: GenerationOutput::Image {
                url: url.to_string(),
            },
            provider,
            model: model.to_string(),
        };
    }

    /// The text content, or the image URL for image generations.
    pub fn content(&self) -> &str {
        match &self.output {
            GenerationOutput::Text(text) => return text,
            GenerationOutput::Image { url } => return url,
        }
    }
}
