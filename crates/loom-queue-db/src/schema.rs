// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Idempotent schema setup for the `jobs` and `scheduled_jobs` tables.

use sqlx::SqlitePool;

use crate::error::Result;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS jobs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		type TEXT NOT NULL,
		data BLOB NOT NULL,
		status TEXT NOT NULL DEFAULT 'pending'
			CHECK (status IN ('pending', 'processing', 'done', 'failed')),
		created_at INTEGER NOT NULL,
		not_before INTEGER NOT NULL,
		failed_at INTEGER,
		error TEXT
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_jobs_status_type_created_at ON jobs(status, type, created_at)",
	r#"
	CREATE TABLE IF NOT EXISTS scheduled_jobs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		type TEXT NOT NULL UNIQUE,
		status TEXT NOT NULL DEFAULT 'idle' CHECK (status IN ('idle', 'processing')),
		cron_expression TEXT NOT NULL,
		next_run_at INTEGER NOT NULL DEFAULT 0,
		claimed_at INTEGER,
		created_at INTEGER NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_status_type_next_run_at ON scheduled_jobs(status, type, next_run_at)",
];

/// Create the queue tables and indexes if they are missing.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!("queue schema ready");
	Ok(())
}
