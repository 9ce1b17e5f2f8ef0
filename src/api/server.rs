//! HTTP server for the CleanData API.
//!
//! Exposes the import / transform / export pipeline over REST for a
//! browser frontend. The session store is shared behind an async
//! RwLock; the AI round trip runs without the lock so a long call never
//! blocks reads, and the merge is version-fenced when the lock is
//! re-acquired.
//!
//! # API Endpoints
//!
//! | Method | Path             | Description                              |
//! |--------|------------------|------------------------------------------|
//! | GET    | `/health`        | Health check                             |
//! | POST   | `/api/import`    | Upload CSV (multipart, `acceptPartial`)  |
//! | POST   | `/api/transform` | Run an AI transform on the session data  |
//! | GET    | `/api/export`    | Download the cleaned CSV                 |
//! | GET    | `/api/usage`     | Usage counters and plan limits           |
//! | POST   | `/api/clear`     | Clear the dataset                        |
//! | GET    | `/api/events`    | SSE transcript stream                    |

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::events::EVENTS;
use super::types::{error_response, status_for, ImportResponse, TransformBody, TransformResponse, UsageResponse};
use crate::ai::AiClient;
use crate::error::{PipelineError, StoreError};
use crate::pipeline;
use crate::store::SessionStore;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<SessionStore>>,
}

type ApiError = (StatusCode, Json<Value>);

fn pipeline_error(e: PipelineError) -> ApiError {
    (status_for(&e), Json(error_response(&e.to_string())))
}

fn store_error(e: StoreError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(error_response(&e.to_string())),
    )
}

/// Start the HTTP server, loading session state from `state_root`.
pub async fn start_server(
    port: u16,
    state_root: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState {
        store: Arc::new(RwLock::new(SessionStore::load(state_root))),
    };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/import", post(import_csv))
        .route("/api/transform", post(transform))
        .route("/api/export", get(export_csv))
        .route("/api/usage", get(usage))
        .route("/api/clear", post(clear_dataset))
        .route("/api/events", get(sse_events))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 CleanData server running on http://localhost:{}", port);
    println!("   POST /api/import    - Upload CSV file");
    println!("   POST /api/transform - AI transform");
    println!("   GET  /api/export    - Download cleaned CSV");
    println!("   GET  /api/events    - SSE transcript stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "cleandata",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint streaming the chat transcript in real time.
async fn sse_events() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = EVENTS.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(message) => {
            let json = serde_json::to_string(&message).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload CSV endpoint.
///
/// Multipart fields: `file` (the CSV) and optional `acceptPartial`
/// ("true" to confirm a truncated import of the first N rows).
async fn import_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut accept_partial = false;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response(&format!("Multipart error: {}", e))),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            (
                                StatusCode::BAD_REQUEST,
                                Json(error_response(&format!("Read error: {}", e))),
                            )
                        })?
                        .to_vec(),
                );
            }
            "acceptPartial" => {
                accept_partial = field
                    .text()
                    .await
                    .map(|v| v.trim().eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response("No file provided")),
        )
    })?;
    let file_name = file_name.unwrap_or_else(|| "upload.csv".to_string());

    let mut store = state.store.write().await;
    let outcome = pipeline::import_bytes(&mut store, &bytes, &file_name, accept_partial)
        .map_err(pipeline_error)?;

    Ok(Json(ImportResponse::from(outcome)))
}

/// AI transform endpoint.
///
/// The store lock is dropped for the duration of the external call; the
/// merge is fenced on the dataset version captured at submission.
async fn transform(
    State(state): State<AppState>,
    Json(body): Json<TransformBody>,
) -> Result<Json<TransformResponse>, ApiError> {
    let client = AiClient::from_env()
        .map_err(|e| pipeline_error(PipelineError::from(e)))?;

    let request = {
        let mut store = state.store.write().await;
        if let Some(ref model) = body.model {
            store.set_model(model.clone()).map_err(store_error)?;
        }
        pipeline::prepare_transform(&mut store, &body.prompt).map_err(pipeline_error)?
    };

    let result = client
        .transform_rows(&request.model, &request.instruction, &request.sample)
        .await;

    let mut store = state.store.write().await;
    let patches = result.map_err(|e| {
        let err = PipelineError::from(e);
        pipeline::report_failure(&mut store, &err);
        pipeline_error(err)
    })?;

    let summary =
        pipeline::apply_transform(&mut store, &request, &patches).map_err(pipeline_error)?;

    Ok(Json(TransformResponse::from(summary)))
}

/// Download the cleaned dataset as CSV.
async fn export_csv(State(state): State<AppState>) -> Result<(HeaderMap, String), ApiError> {
    let store = state.store.read().await;
    let payload = pipeline::export(&store).map_err(pipeline_error)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "text/csv".parse().unwrap());
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", payload.file_name)
            .parse()
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(error_response("Invalid export file name")),
                )
            })?,
    );

    Ok((headers, payload.content))
}

/// Usage counters and plan limits.
async fn usage(State(state): State<AppState>) -> Json<UsageResponse> {
    let store = state.store.read().await;
    Json(UsageResponse::snapshot(&store))
}

/// Clear the current dataset.
async fn clear_dataset(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut store = state.store.write().await;
    pipeline::clear(&mut store).map_err(pipeline_error)?;
    Ok(Json(json!({ "status": "ok" })))
}
