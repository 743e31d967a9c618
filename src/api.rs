use crate::config::ApiConfig;
use crate::photo_store::{NewPhoto, Photo, PhotoStore};
use crate::reconcile::{self, ReconcileReport};
use crate::s3_storage::{content_type_for, file_extension, KeyError, S3Storage};
use anyhow::{Context, Result};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Content type fixed for presigned uploads; the direct upload endpoint
/// preserves whatever the client declares instead.
const PRESIGNED_UPLOAD_CONTENT_TYPE: &str = "image/jpeg";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PhotoStore>,
    pub storage: Arc<S3Storage>,
    pub presigned_url_expiry: Duration,
}

/// Full photo payload returned by the resource endpoints
#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub storage_key: String,
    pub storage_url: String,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Photo> for PhotoResponse {
    fn from(p: Photo) -> Self {
        Self {
            id: p.id,
            title: p.title,
            description: p.description,
            storage_key: p.storage_key,
            storage_url: p.storage_url,
            uploaded_at: p.uploaded_at,
            updated_at: p.updated_at,
        }
    }
}

/// Gallery listing entry: metadata plus a freshly signed view URL
#[derive(Debug, Serialize)]
pub struct GalleryPhoto {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gallery listing response
#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub photos: Vec<GalleryPhoto>,
}

/// Query parameters for the upload URL endpoint
#[derive(Debug, Deserialize)]
pub struct UploadUrlQuery {
    pub file_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Upload URL response
#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub url: String,
}

/// Client-writable fields of a photo record
#[derive(Debug, Deserialize)]
pub struct UpdatePhotoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn client_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "INVALID_INPUT".to_string(),
        }),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
            code: "NOT_FOUND".to_string(),
        }),
    )
}

/// Upstream (S3 or database) failure, carrying the upstream message
fn server_error(err: anyhow::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{err:#}"),
            code: "UPSTREAM_ERROR".to_string(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/photos/", get(list_photos).post(create_photo))
        .route(
            "/photos/:photo_id",
            get(get_photo).patch(update_photo).delete(delete_photo),
        )
        .route("/get-upload-url/", get(get_upload_url))
        .route("/admin/reconcile", post(run_reconcile))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gallery-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(state.store.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Gallery listing: all photos newest first, each with a time-limited view
/// URL. A record whose signing fails is logged and skipped; partial results
/// are acceptable.
#[instrument(skip(state))]
async fn list_photos(
    State(state): State<AppState>,
) -> Result<Json<GalleryResponse>, ApiError> {
    let photos = state.store.list_photos().await.map_err(server_error)?;

    let mut gallery = Vec::with_capacity(photos.len());
    for photo in photos {
        match state
            .storage
            .presign_get(&photo.storage_key, state.presigned_url_expiry)
            .await
        {
            Ok(image_url) => gallery.push(GalleryPhoto {
                id: photo.id,
                title: photo.title,
                description: photo.description,
                image_url,
                uploaded_at: photo.uploaded_at,
                updated_at: photo.updated_at,
            }),
            Err(e) => {
                error!(
                    error = %e,
                    storage_key = %photo.storage_key,
                    "Failed to sign view URL, skipping record"
                );
                metrics::counter!("gallery.presign.failures").increment(1);
            }
        }
    }

    Ok(Json(GalleryResponse { photos: gallery }))
}

/// Presigned upload workflow: issue a time-limited write URL and create the
/// metadata record immediately. The record exists whether or not the client
/// ever performs the upload; there is no reconciliation beyond the explicit
/// admin sweep.
#[instrument(skip(state, params))]
async fn get_upload_url(
    State(state): State<AppState>,
    Query(params): Query<UploadUrlQuery>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let file_name = params
        .file_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| client_error("File name required"))?;

    let storage_key = state
        .storage
        .storage_key(file_name)
        .map_err(|e| client_error(e.to_string()))?;

    let url = state
        .storage
        .presign_put(
            &storage_key,
            PRESIGNED_UPLOAD_CONTENT_TYPE,
            state.presigned_url_expiry,
        )
        .await
        .map_err(server_error)?;

    let photo = state
        .store
        .create_photo(NewPhoto {
            title: params.title.unwrap_or_else(|| "Untitled".to_string()),
            description: params.description.unwrap_or_default(),
            storage_key,
            storage_url: url.clone(),
        })
        .await
        .map_err(server_error)?;

    info!(photo_id = %photo.id, "Issued upload URL");

    Ok(Json(UploadUrlResponse { url }))
}

/// Direct upload workflow: the payload arrives inline, goes to the object
/// store first, and the record is created only after a successful upload. A
/// database failure past that point leaves the object orphaned; there is no
/// compensating delete.
#[instrument(skip(state, multipart))]
async fn create_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PhotoResponse>), ApiError> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| client_error(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("title") => {
                title = Some(field.text().await.map_err(|e| {
                    client_error(format!("Invalid multipart payload: {e}"))
                })?);
            }
            Some("description") => {
                description = Some(field.text().await.map_err(|e| {
                    client_error(format!("Invalid multipart payload: {e}"))
                })?);
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(ToString::to_string)
                    .ok_or_else(|| client_error("File name required"))?;
                let content_type = field.content_type().map(ToString::to_string);
                let data = field.bytes().await.map_err(|e| {
                    client_error(format!("Invalid multipart payload: {e}"))
                })?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            _ => {}
        }
    }

    let Some((file_name, declared_content_type, data)) = file else {
        return Err(client_error("File required"));
    };

    let extension = file_extension(&file_name)
        .ok_or_else(|| client_error(KeyError::MissingExtension(file_name.clone()).to_string()))?;

    let storage_key = state
        .storage
        .storage_key(&file_name)
        .map_err(|e| client_error(e.to_string()))?;

    let content_type =
        declared_content_type.unwrap_or_else(|| content_type_for(extension).to_string());

    state
        .storage
        .upload(&storage_key, data, &content_type)
        .await
        .map_err(server_error)?;

    let storage_url = state.storage.public_url(&storage_key);

    let photo = state
        .store
        .create_photo(NewPhoto {
            title: title.unwrap_or_else(|| file_name.clone()),
            description: description.unwrap_or_default(),
            storage_key,
            storage_url,
        })
        .await
        .map_err(server_error)?;

    info!(photo_id = %photo.id, "Photo uploaded");

    Ok((StatusCode::CREATED, Json(photo.into())))
}

/// Get a single photo's metadata
#[instrument(skip(state))]
async fn get_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let photo = state
        .store
        .get_photo(photo_id)
        .await
        .map_err(server_error)?;

    match photo {
        Some(p) => Ok(Json(p.into())),
        None => Err(not_found("Photo not found")),
    }
}

/// Edit the client-writable fields (title/description) of a record
#[instrument(skip(state, request))]
async fn update_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
    Json(request): Json<UpdatePhotoRequest>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let photo = state
        .store
        .update_photo(photo_id, request.title, request.description)
        .await
        .map_err(server_error)?;

    match photo {
        Some(p) => Ok(Json(p.into())),
        None => Err(not_found("Photo not found")),
    }
}

/// Delete a photo: the object goes first, then the record. An object-store
/// failure aborts with the record intact.
#[instrument(skip(state))]
async fn delete_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let photo = state
        .store
        .get_photo(photo_id)
        .await
        .map_err(server_error)?
        .ok_or_else(|| not_found("Photo not found"))?;

    state
        .storage
        .delete(&photo.storage_key)
        .await
        .map_err(server_error)?;

    state
        .store
        .delete_photo(photo_id)
        .await
        .map_err(server_error)?;

    info!(photo_id = %photo_id, "Photo deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Orphan sweep: report records without a backing object and objects without
/// a record. Read-only.
#[instrument(skip(state))]
async fn run_reconcile(
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let report = reconcile::run(&state.store, &state.storage)
        .await
        .map_err(server_error)?;

    Ok(Json(report))
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting gallery API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(crate::shutdown_signal())
        .await
        .context("API server error")?;

    Ok(())
}
