use crate::config::Config;
use crate::engine::RecognitionMode;
use crate::engines::EngineInfo;
use crate::enhance::StepTiming;
use crate::error::ReceiptError;
use crate::extract::ExpenseRecord;
use crate::ocr::ReceiptProcessor;
use crate::store::{JsonFileStore, MemoryStore, ReceiptStore, RecordKey};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ReceiptProcessor>,
    pub store: Arc<dyn ReceiptStore>,
    pub config: Arc<Config>,
}

/// Receipt ingestion response
#[derive(Serialize)]
pub struct ReceiptResponse {
    pub key: RecordKey,
    pub record: ExpenseRecord,
    pub text: String,
    pub confidence: f32,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
    pub enhancement_time_ms: u64,
    pub enhancement_steps: Vec<StepTiming>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub default_engine: String,
    pub available_engines: Vec<EngineInfo>,
    pub max_file_size_bytes: usize,
    pub default_language: String,
    pub rescale_factor: f32,
    pub skew_limit: f32,
    pub skew_step: f32,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn ReceiptStore> = match &config.store_path {
        Some(path) => {
            tracing::info!("Persisting records to {}", path.display());
            Arc::new(JsonFileStore::open(path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let processor = ReceiptProcessor::new(&config)?;
    let addr = format!("{}:{}", config.host, config.port);
    let max_file_size = config.max_file_size;

    let state = AppState {
        processor: Arc::new(processor),
        store,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/receipts", post(handle_ingest).get(handle_list))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle receipt uploads
async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ReceiptResponse>, ReceiptError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut language: Option<String> = None;
    let mut mode = RecognitionMode::default();

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ReceiptError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(|e| {
                    ReceiptError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "language" => {
                language = Some(field.text().await.map_err(|e| {
                    ReceiptError::InvalidRequest(format!("Invalid language: {}", e))
                })?);
            }
            "mode" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ReceiptError::InvalidRequest(format!("Invalid mode: {}", e)))?;
                mode = RecognitionMode::from_str(&raw).ok_or_else(|| {
                    ReceiptError::InvalidRequest(format!("Unknown recognition mode: {}", raw))
                })?;
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    // Validate file was provided
    let data = file_data.ok_or(ReceiptError::MissingFile)?;

    // Check file size
    if data.len() > state.config.max_file_size {
        return Err(ReceiptError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let language = language.unwrap_or_else(|| state.config.default_language.clone());

    // Enhancement and recognition are CPU-bound; run them off the async
    // workers so other requests keep flowing.
    let processor = Arc::clone(&state.processor);
    let processed = tokio::task::spawn_blocking(move || processor.process(&data, &language, mode))
        .await
        .map_err(|e| ReceiptError::Internal(format!("processing task failed: {}", e)))??;

    let key = state.store.put(&processed.record)?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Receipt ingested in {}ms (enhancement {}ms), confidence: {:.2}, text length: {}",
        processing_time_ms,
        processed.enhancement_time_ms,
        processed.confidence,
        processed.text.len()
    );

    Ok(Json(ReceiptResponse {
        key,
        record: processed.record,
        text: processed.text,
        confidence: processed.confidence,
        warnings: processed.warnings,
        processing_time_ms,
        enhancement_time_ms: processed.enhancement_time_ms,
        enhancement_steps: processed.enhancement_steps,
    }))
}

/// List stored expense records
async fn handle_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<ExpenseRecord>>, ReceiptError> {
    Ok(Json(state.store.list()?))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_engine: state.processor.default_engine_name().to_string(),
        available_engines: state.processor.engines(),
        max_file_size_bytes: state.config.max_file_size,
        default_language: state.config.default_language.clone(),
        rescale_factor: state.config.enhance.rescale_factor,
        skew_limit: state.config.enhance.skew.limit,
        skew_step: state.config.enhance.skew.step,
    })
}
