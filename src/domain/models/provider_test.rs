use super::ProviderDescriptor;
use super::ProviderName;
use crate::domain::models::Capability;

fn descriptor(token: &str) -> ProviderDescriptor {
    return ProviderDescriptor {
        name: ProviderName::OpenAI,
        url: "https://api.openai.com".to_string(),
        token: token.to_string(),
        capabilities: vec![Capability::Text, Capability::Image],
        priority: 2,
    };
}

#[test]
fn it_enables_providers_with_credentials() {
    assert!(descriptor("abc").is_enabled());
    assert!(!descriptor("").is_enabled());
}

#[test]
fn it_checks_capabilities() {
    let desc = descriptor("abc");

    assert!(desc.supports(Capability::Text));
    assert!(desc.supports(Capability::Image));
    assert!(!desc.supports(Capability::Code));
}

#[test]
fn it_parses_provider_names() {
    assert_eq!(ProviderName::parse("OpenAI"), Some(ProviderName::OpenAI));
    assert_eq!(ProviderName::parse("gemini"), Some(ProviderName::Gemini));
    assert_eq!(ProviderName::parse("midjourney"), None);
    assert_eq!(ProviderName::Stability.to_string(), "stability");
}

#[test]
fn it_reports_status() {
    let status = descriptor("").status();

    assert_eq!(status.name, ProviderName::OpenAI);
    assert!(!status.enabled);
    assert_eq!(status.priority, 2);
}
