// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;

/// Connection settings that matter for lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
	/// How long a statement waits on a locked database before failing.
	pub busy_timeout: Duration,
	pub max_connections: u32,
}

impl Default for PoolSettings {
	fn default() -> Self {
		Self {
			busy_timeout: Duration::from_secs(5),
			max_connections: 5,
		}
	}
}

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./loom-queue.db")
/// * `settings` - busy timeout and pool size
///
/// # Errors
/// Returns `DbError::Internal` if the URL is not a `sqlite:` URL or cannot be
/// parsed, `DbError::Sqlx` if the connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, settings: PoolSettings) -> Result<SqlitePool, DbError> {
	if !database_url.starts_with("sqlite:") {
		return Err(DbError::Internal(format!(
			"Invalid database URL: expected a sqlite: URL, got {database_url}"
		)));
	}

	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(settings.busy_timeout)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(settings.max_connections.max(1))
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_settings() {
		let settings = PoolSettings::default();
		assert_eq!(settings.busy_timeout, Duration::from_secs(5));
		assert_eq!(settings.max_connections, 5);
	}

	#[tokio::test]
	async fn test_invalid_url_is_internal_error() {
		let result = create_pool("postgres://localhost/db", PoolSettings::default()).await;
		assert!(matches!(result, Err(DbError::Internal(_))));

		let result = create_pool("./queue.db", PoolSettings::default()).await;
		assert!(matches!(result, Err(DbError::Internal(_))));
	}

	#[tokio::test]
	async fn test_creates_missing_database_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("queue.db");
		let url = format!("sqlite://{}", path.display());

		let pool = create_pool(&url, PoolSettings::default()).await.unwrap();
		assert!(path.exists());
		pool.close().await;
	}
}
