//! Gallery Service
//!
//! Photo gallery backend: photo metadata lives in a SQLite table, binary
//! content is delegated to an S3-compatible object store, and the API exposes
//! CRUD endpoints plus presigned upload/view URL generation.
//!
//! ## Features
//!
//! - **Presigned Upload Workflow**: issue a time-limited write URL and record
//!   the photo immediately; the client uploads out-of-band
//! - **Direct Upload Workflow**: accept the payload inline, store it, then
//!   record the photo
//! - **Gallery Listing**: newest-first metadata with per-photo time-limited
//!   view URLs
//! - **Ordered Deletion**: object first, then record, so a failure never
//!   strands a record pointing at nothing
//! - **Reconciliation Sweep**: admin endpoint reporting orphans on either side
//!
//! The two upload workflows have deliberately different consistency windows:
//! the presigned path writes metadata before the bytes exist, the direct path
//! can strand bytes if the metadata insert fails. Neither is transactional
//! across the two stores.

pub mod api;
pub mod config;
pub mod photo_store;
pub mod reconcile;
pub mod s3_storage;

pub use api::{AppState, create_router, start_api_server};
pub use config::Config;
pub use photo_store::{NewPhoto, Photo, PhotoStore};
pub use reconcile::ReconcileReport;
pub use s3_storage::S3Storage;

use tokio::signal;
use tracing::info;

/// Wait for shutdown signal (SIGINT or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
