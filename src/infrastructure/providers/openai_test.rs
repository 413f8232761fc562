use anyhow::Result;
use mockito::Matcher;
use serde_json::json;
use test_utils::png_fixture_b64;

use super::CompletionChoiceResponse;
use super::CompletionResponse;
use super::ImageDataResponse;
use super::ImageResponse;
use super::MessageRequest;
use super::OpenAI;
use crate::domain::models::Capability;
use crate::domain::models::GenerationOptions;
use crate::domain::models::GenerationOutput;
use crate::domain::models::GenerationRequest;
use crate::domain::models::Message;
use crate::domain::models::Provider;
use crate::domain::models::ProviderDescriptor;
use crate::domain::models::ProviderName;

impl OpenAI {
    fn with_url(url: String) -> OpenAI {
        return OpenAI {
            descriptor: ProviderDescriptor {
                name: ProviderName::OpenAI,
                url,
                token: "abc".to_string(),
                capabilities: vec![Capability::Text, Capability::Code, Capability::Image],
                priority: 2,
            },
            chat_model: "gpt-3.5-turbo".to_string(),
            image_model: "dall-e-3".to_string(),
            timeout: "200".to_string(),
        };
    }
}

fn completion_body(text: &str) -> Result<String> {
    return Ok(serde_json::to_string(&CompletionResponse {
        choices: vec![CompletionChoiceResponse {
            message: MessageRequest {
                role: "assistant".to_string(),
                content: text.to_string(),
            },
        }],
    })?);
}

#[tokio::test]
async fn it_successfully_health_checks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/").with_status(200).create_async().await;

    let backend = OpenAI::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_ok());
    mock.assert_async().await;
}

#[tokio::test]
async fn it_fails_health_checks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/").with_status(500).create_async().await;

    let backend = OpenAI::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn it_skips_health_checks_for_the_official_api() {
    let backend = OpenAI::with_url("https://api.openai.com".to_string());
    let res = backend.health_check().await;

    assert!(res.is_ok());
}

#[tokio::test]
async fn it_gets_completions() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("Authorization", "Bearer abc")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "How may I help you?" },
                { "role": "user", "content": "Say hi to the world" }
            ],
            "temperature": 0.7,
            "max_tokens": 2048
        })))
        .with_status(200)
        .with_body(completion_body("Hello World")?)
        .create_async()
        .await;

    let history = vec![Message::user("Hi"), Message::assistant("How may I help you?")];
    let backend = OpenAI::with_url(server.url());
    let res = backend
        .generate(&GenerationRequest::chat("Say hi to the world", &history))
        .await?;
    mock.assert_async().await;

    assert_eq!(res.output, GenerationOutput::Text("Hello World".to_string()));
    assert_eq!(res.provider, ProviderName::OpenAI);
    assert_eq!(res.model, "gpt-3.5-turbo");

    return Ok(());
}

#[tokio::test]
async fn it_honors_pinned_models() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "model": "gpt-4" })))
        .with_status(200)
        .with_body(completion_body("Pinned")?)
        .create_async()
        .await;

    let options = GenerationOptions {
        model: Some("gpt-4".to_string()),
        ..GenerationOptions::default()
    };
    let req = GenerationRequest::text("Hi")
        .with_options(options)
        .with_provider(Some(ProviderName::OpenAI));

    let backend = OpenAI::with_url(server.url());
    let res = backend.generate(&req).await?;
    mock.assert_async().await;

    assert_eq!(res.model, "gpt-4");

    return Ok(());
}

#[tokio::test]
async fn it_generates_images() -> Result<()> {
    let body = serde_json::to_string(&ImageResponse {
        data: vec![ImageDataResponse {
            b64_json: png_fixture_b64().to_string(),
        }],
    })?;

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/images/generations")
        .match_header("Authorization", "Bearer abc")
        .match_body(Matcher::PartialJson(json!({
            "model": "dall-e-3",
            "prompt": "A lighthouse at dusk",
            "n": 1,
            "size": "1024x1024",
            "response_format": "b64_json"
        })))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let backend = OpenAI::with_url(server.url());
    let res = backend
        .generate(&GenerationRequest::image("A lighthouse at dusk"))
        .await?;
    mock.assert_async().await;

    assert_eq!(
        res.output,
        GenerationOutput::Image {
            url: format!("data:image/png;base64,{}", png_fixture_b64()),
        }
    );
    assert_eq!(res.model, "dall-e-3");

    return Ok(());
}

#[tokio::test]
async fn it_falls_back_to_status_reason_without_error_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let backend = OpenAI::with_url(server.url());
    let res = backend.generate(&GenerationRequest::text("Hi")).await;
    mock.assert_async().await;

    assert_eq!(
        res.unwrap_err().to_string(),
        "openai API error: 503 - Service Unavailable"
    );
}

#[tokio::test]
async fn it_fails_on_malformed_bodies() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let backend = OpenAI::with_url(server.url());
    let res = backend.generate(&GenerationRequest::text("Hi")).await;
    mock.assert_async().await;

    assert!(res.is_err());
}
