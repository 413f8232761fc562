#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

#[cfg(test)]
pub mod fake;
pub mod gemini;
pub mod openai;
pub mod stability;

use anyhow::bail;
use anyhow::Result;
use serde_derive::Deserialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ProviderBox;
use crate::domain::models::ProviderName;

pub struct ProviderManager {}

impl ProviderManager {
    /// Every known provider, configured from `Config`. Providers without a
    /// token are still returned so they can be reported as disabled.
    pub fn registry() -> Vec<ProviderBox> {
        return vec![
            Box::<gemini::Gemini>::default(),
            Box::<openai::OpenAI>::default(),
            Box::<stability::Stability>::default(),
        ];
    }
}

pub(crate) fn priority(key: ConfigKey) -> u32 {
    return Config::get(key).parse::<u32>().unwrap_or_else(|_| {
        return Config::default(key).parse::<u32>().unwrap_or(u32::MAX);
    });
}

/// Data URL for a base64 PNG payload returned by image providers.
pub(crate) fn png_data_url(b64: &str) -> String {
    return format!("data:image/png;base64,{b64}");
}

#[derive(Default, Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
    message: Option<String>,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        if let Some(detail) = self.error {
            if let Some(message) = detail.message {
                return Some(message);
            }
        }

        return self.message;
    }
}

/// Passes through 2xx responses. Anything else becomes an error carrying the
/// status and, when the body has one, the provider's own error message.
pub(crate) async fn ensure_success(
    res: reqwest::Response,
    name: ProviderName,
) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let detail = res
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| return body.message())
        .unwrap_or_else(|| {
            return status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string();
        });

    tracing::error!(
        provider = %name,
        status = status.as_u16(),
        detail = %detail,
        "Provider request failed"
    );
    bail!(format!("{name} API error: {} - {detail}", status.as_u16()));
}
