//! SQLite-backed tracker store using sqlx.

use std::{str::FromStr, time::Duration};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    },
};

use crate::{
    Error, Result,
    store::TrackerStore,
    types::{ArtifactRef, Observation, ResourceCreate, ResourceId, ResourcePatch, TrackedResource},
};

/// SQLite-backed persistence for resources and observations.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and run
    /// migrations.
    ///
    /// For a shared pool use [`SqliteStore::with_pool`] after calling
    /// [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::message(format!("timestamp out of range: {ms}")))
}

fn resource_from_row(row: &SqliteRow) -> Result<TrackedResource> {
    let interval_ms: i64 = row.try_get("interval_ms")?;
    Ok(TrackedResource {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        interval: Duration::from_millis(u64::try_from(interval_ms).unwrap_or(0)),
        retain_all: row.try_get("retain_all")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn observation_from_row(row: &SqliteRow) -> Result<Observation> {
    Ok(Observation {
        id: row.try_get("id")?,
        resource_id: row.try_get("resource_id")?,
        artifact: ArtifactRef::new(row.try_get::<String, _>("artifact")?),
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

#[async_trait]
impl TrackerStore for SqliteStore {
    async fn get_resource(&self, id: ResourceId) -> Result<Option<TrackedResource>> {
        let row = sqlx::query(
            "SELECT id, url, interval_ms, retain_all, created_at FROM resources WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn list_resources(&self) -> Result<Vec<TrackedResource>> {
        let rows = sqlx::query(
            "SELECT id, url, interval_ms, retain_all, created_at FROM resources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(resource_from_row).collect()
    }

    async fn create_resource(&self, create: &ResourceCreate) -> Result<TrackedResource> {
        create.validate()?;
        let interval_ms = i64::try_from(create.interval.as_millis())
            .map_err(|_| Error::invalid_resource("interval too large"))?;
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO resources (url, interval_ms, retain_all, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&create.url)
        .bind(interval_ms)
        .bind(create.retain_all)
        .bind(millis(created_at))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_resource(id)
            .await?
            .ok_or_else(|| Error::resource_not_found(id))
    }

    async fn update_resource(
        &self,
        id: ResourceId,
        patch: &ResourcePatch,
    ) -> Result<TrackedResource> {
        patch.validate()?;
        let mut resource = self
            .get_resource(id)
            .await?
            .ok_or_else(|| Error::resource_not_found(id))?;
        patch.apply(&mut resource);
        let interval_ms = i64::try_from(resource.interval.as_millis())
            .map_err(|_| Error::invalid_resource("interval too large"))?;

        let result =
            sqlx::query("UPDATE resources SET interval_ms = ?, retain_all = ? WHERE id = ?")
                .bind(interval_ms)
                .bind(resource.retain_all)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::resource_not_found(id));
        }
        Ok(resource)
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM observations WHERE resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::resource_not_found(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_observation(
        &self,
        resource_id: ResourceId,
        artifact: &ArtifactRef,
    ) -> Result<Observation> {
        let created_at = Utc::now();
        // The existence check and the insert are one statement so a
        // concurrent delete cannot slip between them.
        let result = sqlx::query(
            "INSERT INTO observations (resource_id, artifact, created_at)
             SELECT id, ?, ? FROM resources WHERE id = ?",
        )
        .bind(artifact.as_str())
        .bind(millis(created_at))
        .bind(resource_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::resource_not_found(resource_id));
        }

        let id = result.last_insert_rowid();
        let row = sqlx::query(
            "SELECT id, resource_id, artifact, created_at FROM observations WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        observation_from_row(&row)
    }

    async fn last_observation(&self, resource_id: ResourceId) -> Result<Option<Observation>> {
        let row = sqlx::query(
            "SELECT id, resource_id, artifact, created_at
             FROM observations
             WHERE resource_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(observation_from_row).transpose()
    }

    async fn list_observations(
        &self,
        resource_id: ResourceId,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let rows = sqlx::query(
            "SELECT id, resource_id, artifact, created_at
             FROM observations
             WHERE resource_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(resource_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(observation_from_row).collect()
    }
}
