//! JSON HTTP API for browser front ends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/items?search=` | Items whose name contains `search`, ignoring case |
//! | `POST` | `/items` | Add an item (`name`, `quantity`, optional dates and classification) |
//! | `POST` | `/items/{name}/add` | Add one |
//! | `POST` | `/items/{name}/remove` | Remove one, deleting at zero |
//! | `POST` | `/recipes` | Recipe suggestions for every item |
//! | `POST` | `/classify` | Classify the raw image in the request body |
//!
//! Mutations answer with the full, freshly read item list.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "amount must be at least 1, got 0" } }
//! ```
//!
//! Error codes: `bad_request` (400), `conflict` (409), `upstream_error` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a page served from
//! anywhere can drive the API.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::capture::ImageBlob;
use crate::classify::{HttpClassifier, ImageClassifier};
use crate::config::Config;
use crate::inventory::{Inventory, InventoryError};
use crate::models::{filter_by_name, InventoryItem, ItemDetails};
use crate::recipes::{ChatRecipes, RecipeSource};
use crate::store;
use crate::upstream::UpstreamError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub inventory: Inventory,
    pub recipes: Arc<dyn RecipeSource>,
    pub classifier: Arc<dyn ImageClassifier>,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = store::open(config).await?;
        Ok(Self {
            inventory: Inventory::from_config(store, config),
            recipes: Arc::new(ChatRecipes::new(&config.recipes)?),
            classifier: Arc::new(HttpClassifier::new(&config.classifier)?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/items", get(handle_list).post(handle_create))
        .route("/items/{name}/add", post(handle_add_one))
        .route("/items/{name}/remove", post(handle_remove_one))
        .route("/recipes", post(handle_recipes))
        .route("/classify", post(handle_classify))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        backend = %config.store.backend,
        collection = %config.store.collection,
        "pantry server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Map a failure onto the status code that best describes it.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);

        if let Some(inv) = err.downcast_ref::<InventoryError>() {
            return match inv {
                InventoryError::InvalidAmount(_) | InventoryError::QuantityOverflow { .. } => {
                    bad_request(message)
                }
                InventoryError::Conflict { .. } => AppError {
                    status: StatusCode::CONFLICT,
                    code: "conflict",
                    message,
                },
            };
        }

        if let Some(up) = err.downcast_ref::<UpstreamError>() {
            if !matches!(up, UpstreamError::MissingApiKey(_)) {
                return AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "upstream_error",
                    message,
                };
            }
        } else if err.downcast_ref::<reqwest::Error>().is_some() {
            return AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream_error",
                message,
            };
        }

        tracing::error!(error = %message, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Items ============

#[derive(Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<InventoryItem>,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    search: String,
}

#[derive(Deserialize)]
struct CreateItemRequest {
    name: String,
    #[serde(default = "default_quantity")]
    quantity: u64,
    #[serde(flatten)]
    details: ItemDetails,
}

fn default_quantity() -> u64 {
    1
}

async fn all_items(state: &AppState) -> Result<Json<ItemsResponse>, AppError> {
    let items = state.inventory.list_all().await?;
    Ok(Json(ItemsResponse { items }))
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = state.inventory.list_all().await?;
    let items = filter_by_name(&items, &params.search)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ItemsResponse { items }))
}

async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<Json<ItemsResponse>, AppError> {
    state
        .inventory
        .upsert_increment(&req.name, req.quantity, &req.details)
        .await?;
    all_items(&state).await
}

async fn handle_add_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ItemsResponse>, AppError> {
    state
        .inventory
        .upsert_increment(&name, 1, &ItemDetails::default())
        .await?;
    all_items(&state).await
}

async fn handle_remove_one(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ItemsResponse>, AppError> {
    state.inventory.decrement_or_delete(&name).await?;
    all_items(&state).await
}

// ============ External APIs ============

#[derive(Serialize, Deserialize)]
pub struct RecipesResponse {
    pub recipes: Vec<String>,
}

async fn handle_recipes(
    State(state): State<AppState>,
) -> Result<Json<RecipesResponse>, AppError> {
    let names: Vec<String> = state
        .inventory
        .list_all()
        .await?
        .into_iter()
        .map(|item| item.name)
        .collect();
    let recipes = state.recipes.suggest(&names).await?;
    Ok(Json(RecipesResponse { recipes }))
}

#[derive(Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub classification: String,
}

async fn handle_classify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ClassifyResponse>, AppError> {
    if body.is_empty() {
        return Err(bad_request("request body must contain an image"));
    }
    let mime = match headers.get(CONTENT_TYPE) {
        None => "application/octet-stream".to_string(),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<mime_guess::Mime>().ok())
            .map(|m| m.essence_str().to_string())
            .ok_or_else(|| bad_request("Content-Type is not a valid MIME type"))?,
    };

    let image = ImageBlob::new(body.to_vec(), "upload", mime);
    let classification = state.classifier.classify(&image).await?;
    Ok(Json(ClassifyResponse { classification }))
}
