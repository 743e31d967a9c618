use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Stored photo metadata
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Photo {
    /// Unique photo ID
    pub id: Uuid,
    /// Display title
    pub title: String,
    /// Optional description (empty string when absent)
    pub description: String,
    /// Object store key; unique, immutable once set
    pub storage_key: String,
    /// URL captured at creation time (presigned write URL or public base URL)
    pub storage_url: String,
    /// When the record was created
    pub uploaded_at: DateTime<Utc>,
    /// Refreshed on every mutation of the record
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Photo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Fields for a new photo record; id and timestamps are assigned by the store
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub title: String,
    pub description: String,
    pub storage_key: String,
    pub storage_url: String,
}

/// Metadata store for photo records in SQLite
pub struct PhotoStore {
    pool: SqlitePool,
}

impl PhotoStore {
    /// Create a new photo store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .context("Invalid database URL")?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite")?;

        info!(url = %config.url, "Connected to SQLite database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Insert a photo record. The id is assigned here; `uploaded_at` and
    /// `updated_at` are set to the same instant.
    #[instrument(skip(self, new), fields(storage_key = %new.storage_key))]
    pub async fn create_photo(&self, new: NewPhoto) -> Result<Photo> {
        // Creation invariant: updated_at equals uploaded_at.
        let now = Utc::now();
        let photo = Photo {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            storage_key: new.storage_key,
            storage_url: new.storage_url,
            uploaded_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO photos (
                id, title, description, storage_key, storage_url,
                uploaded_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(photo.id)
        .bind(&photo.title)
        .bind(&photo.description)
        .bind(&photo.storage_key)
        .bind(&photo.storage_url)
        .bind(photo.uploaded_at)
        .bind(photo.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert photo record")?;

        debug!(photo_id = %photo.id, "Photo record created");

        metrics::counter!("gallery.photos.created").increment(1);

        Ok(photo)
    }

    /// Get photo metadata by ID
    pub async fn get_photo(&self, photo_id: Uuid) -> Result<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, title, description, storage_key, storage_url,
                   uploaded_at, updated_at
            FROM photos
            WHERE id = $1
            "#,
        )
        .bind(photo_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query photo")?;

        Ok(photo)
    }

    /// List all photos, newest first
    #[instrument(skip(self))]
    pub async fn list_photos(&self) -> Result<Vec<Photo>> {
        let photos = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, title, description, storage_key, storage_url,
                   uploaded_at, updated_at
            FROM photos
            ORDER BY uploaded_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list photos")?;

        Ok(photos)
    }

    /// List every storage key known to the metadata store
    pub async fn list_storage_keys(&self) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT storage_key FROM photos")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list storage keys")?;

        Ok(keys)
    }

    /// Update the client-writable fields of a record and refresh `updated_at`.
    /// Returns `None` when the id is unknown.
    #[instrument(skip(self, title, description))]
    pub async fn update_photo(
        &self,
        photo_id: Uuid,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Option<Photo>> {
        let Some(existing) = self.get_photo(photo_id).await? else {
            return Ok(None);
        };

        let photo = Photo {
            title: title.unwrap_or(existing.title),
            description: description.unwrap_or(existing.description),
            updated_at: Utc::now(),
            ..existing
        };

        sqlx::query(
            r#"
            UPDATE photos
            SET title = $2, description = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(photo.id)
        .bind(&photo.title)
        .bind(&photo.description)
        .bind(photo.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update photo record")?;

        Ok(Some(photo))
    }

    /// Delete a photo record. Returns whether a record was removed.
    #[instrument(skip(self))]
    pub async fn delete_photo(&self, photo_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1")
            .bind(photo_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete photo record")?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            metrics::counter!("gallery.photos.deleted").increment(1);
        }

        Ok(deleted)
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_store() -> PhotoStore {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        PhotoStore { pool }
    }

    fn new_photo(title: &str, key: &str) -> NewPhoto {
        NewPhoto {
            title: title.to_string(),
            description: String::new(),
            storage_key: key.to_string(),
            storage_url: format!("http://localhost:4566/photo-bucket/{key}"),
        }
    }

    #[tokio::test]
    async fn test_create_photo() {
        let store = test_store().await;

        let photo = store
            .create_photo(NewPhoto {
                title: "Test Photo".to_string(),
                description: "Test Description".to_string(),
                storage_key: "photos/test.jpg".to_string(),
                storage_url: "http://localhost:4566/photo-bucket/photos/test.jpg".to_string(),
            })
            .await
            .unwrap();

        let fetched = store.get_photo(photo.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Test Photo");
        assert_eq!(fetched.description, "Test Description");
        assert_eq!(fetched.uploaded_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn test_photo_display_is_title() {
        let store = test_store().await;
        let photo = store
            .create_photo(new_photo("My Photo", "photos/my.jpg"))
            .await
            .unwrap();

        assert_eq!(photo.to_string(), "My Photo");
    }

    #[tokio::test]
    async fn test_photo_ordering_newest_first() {
        let store = test_store().await;

        store
            .create_photo(new_photo("First", "photos/first.jpg"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .create_photo(new_photo("Second", "photos/second.jpg"))
            .await
            .unwrap();

        let photos = store.list_photos().await.unwrap();
        assert_eq!(photos[0].title, "Second");
        assert_eq!(photos[1].title, "First");
    }

    #[tokio::test]
    async fn test_listing_is_idempotent() {
        let store = test_store().await;

        for (i, key) in ["photos/a.jpg", "photos/b.jpg", "photos/c.jpg"]
            .iter()
            .enumerate()
        {
            store
                .create_photo(new_photo(&format!("Photo {i}"), key))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let first = store.list_photos().await.unwrap();
        let second = store.list_photos().await.unwrap();
        let ids = |photos: &[Photo]| photos.iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_delete_photo() {
        let store = test_store().await;
        let photo = store
            .create_photo(new_photo("Doomed", "photos/doomed.jpg"))
            .await
            .unwrap();

        assert!(store.delete_photo(photo.id).await.unwrap());
        assert!(store.get_photo(photo.id).await.unwrap().is_none());
        assert!(store.list_photos().await.unwrap().is_empty());

        // A second delete finds nothing.
        assert!(!store.delete_photo(photo.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_photo_touches_updated_at() {
        let store = test_store().await;
        let photo = store
            .create_photo(new_photo("Before", "photos/edit.jpg"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let updated = store
            .update_photo(photo.id, Some("After".to_string()), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "After");
        assert_eq!(updated.description, photo.description);
        assert_eq!(updated.uploaded_at, photo.uploaded_at);
        assert!(updated.updated_at > photo.updated_at);

        let missing = store
            .update_photo(Uuid::new_v4(), Some("Nobody".to_string()), None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_storage_keys() {
        let store = test_store().await;
        store
            .create_photo(new_photo("One", "photos/one.jpg"))
            .await
            .unwrap();
        store
            .create_photo(new_photo("Two", "photos/two.jpg"))
            .await
            .unwrap();

        let mut keys = store.list_storage_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["photos/one.jpg", "photos/two.jpg"]);
    }

    #[tokio::test]
    async fn test_storage_key_is_unique() {
        let store = test_store().await;
        store
            .create_photo(new_photo("One", "photos/dup.jpg"))
            .await
            .unwrap();

        let result = store.create_photo(new_photo("Two", "photos/dup.jpg")).await;
        assert!(result.is_err());
    }
}
