mod config;
mod error;
mod models;
mod openrouter;
mod pipeline;
mod prompt;
mod routes;
mod store;
mod structured;

use axum::{Router, routing::{get, patch, post}};
use routes::{
    conversation_records, create_conversation, delete_conversation, generate, get_record,
    list_conversations, rename_conversation, retry_generation, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LlmConfig, PipelineConfig};
use crate::openrouter::LlmClient;
use crate::pipeline::Pipeline;
use crate::store::Store;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let llm_config = LlmConfig::from_env();
    let masked: String = llm_config.api_key.chars().take(6).collect();
    tracing::info!(model = %llm_config.model, "Using API key: {}...", masked);

    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(svg_stage = pipeline_config.svg_stage, max_attempts = pipeline_config.max_attempts, "Pipeline configured");

    let store = Arc::new(Store::new());
    let model = Arc::new(LlmClient::new(llm_config));
    let pipeline = Arc::new(Pipeline::new(store.clone(), model, pipeline_config));
    let state = AppState { store, pipeline };

    let app = Router::new()
        .route("/api/conversations", post(create_conversation).get(list_conversations))
        .route("/api/conversations/:id", patch(rename_conversation).delete(delete_conversation))
        .route("/api/conversations/:id/records", get(conversation_records))
        .route("/api/conversations/:id/generate", post(generate))
        .route("/api/records/:id", get(get_record))
        .route("/api/records/:id/retry", post(retry_generation))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0,0,0,0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app).await.unwrap();
}
