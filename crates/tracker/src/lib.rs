//! Periodic visual change tracking for web pages.
//!
//! A [`scheduler::Scheduler`] owns one recurring job per tracked resource;
//! each firing runs the [`pipeline::UpdatePipeline`]: capture, compare with
//! the last observation, persist when warranted, notify on change.
//! Persistence at `<data_dir>/pagewatch.db`, screenshots under
//! `<screenshots>/<id><hostname>/`.

pub mod artifacts;
pub mod capture;
pub mod diff;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    pagewatch_config::ConflictPolicy,
};

/// Run database migrations for the tracker tables.
///
/// Creates `resources` and `observations`. Call at startup when sharing a
/// pool with [`store_sqlite::SqliteStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
