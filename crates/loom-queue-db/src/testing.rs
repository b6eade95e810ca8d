// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Helpers for tests that need a ready-to-use store.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::Result;
use crate::pool::{create_pool, PoolSettings};
use crate::schema::run_migrations;
use crate::store::SqliteQueueStore;

/// A private in-memory database.
///
/// The pool holds a single connection that never idles out, so every
/// statement sees the same database.
pub async fn create_test_pool() -> Result<SqlitePool> {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.min_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await?;
	Ok(pool)
}

/// An in-memory store with the schema applied.
pub async fn create_test_store() -> Result<SqliteQueueStore> {
	let pool = create_test_pool().await?;
	run_migrations(&pool).await?;
	Ok(SqliteQueueStore::new(pool))
}

/// A store over a database file in `dir`, standing in for one process.
///
/// Several of these pointing at the same directory contend through SQLite's
/// file locks exactly like independent processes do.
pub async fn create_file_store(dir: &Path) -> Result<SqliteQueueStore> {
	let url = format!("sqlite://{}", dir.join("queue.db").display());
	let pool = create_pool(
		&url,
		PoolSettings {
			busy_timeout: Duration::from_secs(10),
			max_connections: 1,
		},
	)
	.await?;
	run_migrations(&pool).await?;
	Ok(SqliteQueueStore::new(pool))
}
