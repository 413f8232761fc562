use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use super::route_model;
use super::router;
use crate::domain::models::Capability;
use crate::domain::models::ProviderName;
use crate::domain::services::Dispatcher;
use crate::infrastructure::providers::fake::FakeHandle;
use crate::infrastructure::providers::fake::FakeProvider;

async fn spawn(dispatcher: Dispatcher) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(Arc::new(dispatcher));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    return Ok(addr);
}

fn dispatcher(fail: bool) -> (Dispatcher, FakeHandle, FakeHandle) {
    let (gemini, gemini_fake) = FakeProvider::boxed(
        ProviderName::Gemini,
        "abc",
        vec![Capability::Text, Capability::Code],
        1,
        fail,
    );
    let (openai, openai_fake) = FakeProvider::boxed(
        ProviderName::OpenAI,
        "abc",
        vec![Capability::Text, Capability::Code, Capability::Image],
        2,
        fail,
    );

    return (
        Dispatcher::new(vec![gemini, openai]),
        gemini_fake,
        openai_fake,
    );
}

#[test]
fn it_routes_models_to_providers() {
    assert_eq!(
        route_model(Some("gpt-3.5-turbo")),
        (ProviderName::OpenAI, "gpt-3.5-turbo".to_string())
    );
    assert_eq!(
        route_model(Some("gemini-pro")),
        (ProviderName::Gemini, "gemini-pro".to_string())
    );
    assert_eq!(
        route_model(Some("claude-2")),
        (ProviderName::OpenAI, "gpt-4".to_string())
    );
    assert_eq!(
        route_model(None),
        (ProviderName::OpenAI, "gpt-4".to_string())
    );
}

#[tokio::test]
async fn it_answers_prompts() -> Result<()> {
    let (dispatcher, gemini_fake, openai_fake) = dispatcher(false);
    let addr = spawn(dispatcher).await?;

    let res = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .json(&json!({ "prompt": "Hello", "model": "gemini-pro" }))
        .send()
        .await?;

    assert_eq!(res.status().as_u16(), 200);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body, json!({ "response": "gemini: Hello" }));
    assert_eq!(openai_fake.calls(), 0);

    let request = gemini_fake.last_request().unwrap();
    assert_eq!(request.provider, Some(ProviderName::Gemini));
    assert_eq!(request.options.model, Some("gemini-pro".to_string()));

    return Ok(());
}

#[tokio::test]
async fn it_defaults_to_gpt_4() -> Result<()> {
    let (dispatcher, gemini_fake, openai_fake) = dispatcher(false);
    let addr = spawn(dispatcher).await?;

    let res = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .json(&json!({ "prompt": "Hello" }))
        .send()
        .await?;

    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(gemini_fake.calls(), 0);
    let request = openai_fake.last_request().unwrap();
    assert_eq!(request.options.model, Some("gpt-4".to_string()));

    return Ok(());
}

#[tokio::test]
async fn it_reports_provider_failures() -> Result<()> {
    let (dispatcher, _, _) = dispatcher(true);
    let addr = spawn(dispatcher).await?;

    let res = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .json(&json!({ "prompt": "Hello", "model": "gpt-4" }))
        .send()
        .await?;

    assert_eq!(res.status().as_u16(), 500);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(
        body,
        json!({ "error": "No available text generation provider succeeded" })
    );

    return Ok(());
}

#[tokio::test]
async fn it_rejects_malformed_bodies() -> Result<()> {
    let (dispatcher, gemini_fake, openai_fake) = dispatcher(false);
    let addr = spawn(dispatcher).await?;

    let res = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .body("{not json")
        .send()
        .await?;

    assert_eq!(res.status().as_u16(), 500);
    let body = res.json::<serde_json::Value>().await?;
    assert!(body["error"].is_string());
    assert_eq!(gemini_fake.calls(), 0);
    assert_eq!(openai_fake.calls(), 0);

    return Ok(());
}

#[tokio::test]
async fn it_returns_not_found_elsewhere() -> Result<()> {
    let (dispatcher, _, _) = dispatcher(false);
    let addr = spawn(dispatcher).await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("http://{addr}/other")).send().await?;
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(res.text().await?, "Not Found");

    let res = client.get(format!("http://{addr}/api")).send().await?;
    assert_eq!(res.status().as_u16(), 404);

    return Ok(());
}
