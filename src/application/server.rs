#[cfg(test)]
#[path = "server_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde_derive::Deserialize;
use serde_json::json;

use crate::domain::models::GenerationOptions;
use crate::domain::models::GenerationRequest;
use crate::domain::models::ProviderName;
use crate::domain::services::Dispatcher;

const FALLBACK_MODEL: &str = "gpt-4";

#[derive(Debug, Deserialize)]
struct ApiRequest {
    prompt: String,
    model: Option<String>,
}

/// Picks the provider and model a proxy request is sent to. `gpt-*` and
/// `gemini-*` models go to their own provider, everything else is answered by
/// OpenAI's `gpt-4`.
pub fn route_model(model: Option<&str>) -> (ProviderName, String) {
    match model {
        Some(model) if model.starts_with("gpt-") => {
            return (ProviderName::OpenAI, model.to_string());
        }
        Some(model) if model.starts_with("gemini-") => {
            return (ProviderName::Gemini, model.to_string());
        }
        _ => return (ProviderName::OpenAI, FALLBACK_MODEL.to_string()),
    }
}

fn error_response(message: &str) -> Response {
    return (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response();
}

async fn not_found() -> Response {
    return (StatusCode::NOT_FOUND, "Not Found").into_response();
}

async fn api(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> Response {
    let payload = match serde_json::from_slice::<ApiRequest>(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(error = %err, "Rejected proxy request body");
            return error_response(&err.to_string());
        }
    };

    let (provider, model) = route_model(payload.model.as_deref());
    let request = GenerationRequest::text(&payload.prompt)
        .with_options(GenerationOptions {
            model: Some(model.to_string()),
            ..Default::default()
        })
        .with_provider(Some(provider));

    match dispatcher.dispatch(&request).await {
        Ok(generation) => {
            return Json(json!({ "response": generation.content() })).into_response();
        }
        Err(err) => {
            tracing::error!(
                provider = %provider,
                model = %model,
                error = %err,
                "Proxy request failed"
            );
            return error_response(&err.to_string());
        }
    }
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    return Router::new()
        .route("/api", post(api).fallback(not_found))
        .fallback(not_found)
        .with_state(dispatcher);
}

pub async fn run(address: &str, dispatcher: Dispatcher) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(address = address, "Proxy server listening");
    println!("Listening on http://{}/api", listener.local_addr()?);

    axum::serve(listener, router(Arc::new(dispatcher)))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    return Ok(());
}
