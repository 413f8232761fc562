use super::png_data_url;
use super::priority;
use super::ErrorBody;
use super::ProviderManager;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Capability;
use crate::domain::models::ProviderName;

#[test]
fn it_registers_every_provider_with_defaults() {
    let registry = ProviderManager::registry()
        .iter()
        .map(|provider| {
            let descriptor = provider.descriptor();
            return (
                descriptor.name,
                descriptor.capabilities.clone(),
                descriptor.priority,
            );
        })
        .collect::<Vec<(ProviderName, Vec<Capability>, u32)>>();

    assert_eq!(
        registry,
        vec![
            (
                ProviderName::Gemini,
                vec![Capability::Text, Capability::Code],
                1
            ),
            (
                ProviderName::OpenAI,
                vec![Capability::Text, Capability::Code, Capability::Image],
                2
            ),
            (ProviderName::Stability, vec![Capability::Image], 1),
        ]
    );
}

#[test]
fn it_falls_back_to_default_priorities() {
    Config::set(ConfigKey::OpenAiPriority, "first");
    assert_eq!(priority(ConfigKey::OpenAiPriority), 2);

    Config::set(ConfigKey::OpenAiPriority, "-1");
    assert_eq!(priority(ConfigKey::OpenAiPriority), 2);

    Config::set(ConfigKey::OpenAiPriority, "2");
    assert_eq!(priority(ConfigKey::OpenAiPriority), 2);
}

#[test]
fn it_builds_png_data_urls() {
    assert_eq!(png_data_url("abc"), "data:image/png;base64,abc");
}

#[test]
fn it_reads_nested_error_messages() {
    let body: ErrorBody =
        serde_json::from_str(r#"{"error": {"message": "quota exceeded", "type": "x"}}"#).unwrap();
    assert_eq!(body.message(), Some("quota exceeded".to_string()));
}

#[test]
fn it_reads_top_level_error_messages() {
    let body: ErrorBody = serde_json::from_str(r#"{"message": "bad engine"}"#).unwrap();
    assert_eq!(body.message(), Some("bad engine".to_string()));
}

#[test]
fn it_handles_error_bodies_without_messages() {
    let body: ErrorBody = serde_json::from_str(r#"{"error": {"code": 500}}"#).unwrap();
    assert_eq!(body.message(), None);
}
