// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! [`QueueStore`] over a SQLite pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use loom_queue_core::{
	Job, JobFilter, NewJob, QueueStore, Result as StoreResult, ScheduledJob,
};

use crate::schema::run_migrations;

/// SQLite implementation of the queue store.
#[derive(Clone)]
pub struct SqliteQueueStore {
	pool: SqlitePool,
}

impl SqliteQueueStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
	async fn setup(&self) -> StoreResult<()> {
		Ok(run_migrations(&self.pool).await?)
	}

	async fn insert_jobs(&self, jobs: &[NewJob]) -> StoreResult<Vec<i64>> {
		Ok(SqliteQueueStore::insert_jobs(self, jobs).await?)
	}

	async fn claim_job(&self, job_type: &str, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
		Ok(SqliteQueueStore::claim_job(self, job_type, now).await?)
	}

	async fn mark_job_done(&self, id: i64) -> StoreResult<bool> {
		Ok(SqliteQueueStore::mark_job_done(self, id).await?)
	}

	async fn mark_job_failed(
		&self,
		id: i64,
		error: &str,
		failed_at: DateTime<Utc>,
	) -> StoreResult<bool> {
		Ok(SqliteQueueStore::mark_job_failed(self, id, error, failed_at).await?)
	}

	async fn get_job(&self, id: i64) -> StoreResult<Option<Job>> {
		Ok(SqliteQueueStore::get_job(self, id).await?)
	}

	async fn count_jobs(&self, filter: &JobFilter) -> StoreResult<u64> {
		Ok(SqliteQueueStore::count_jobs(self, filter).await?)
	}

	async fn list_jobs(&self, filter: &JobFilter, limit: u32, offset: u32) -> StoreResult<Vec<Job>> {
		Ok(SqliteQueueStore::list_jobs(self, filter, limit, offset).await?)
	}

	async fn job_types(&self) -> StoreResult<Vec<String>> {
		Ok(SqliteQueueStore::job_types(self).await?)
	}

	async fn upsert_scheduled_job(
		&self,
		job_type: &str,
		cron_expression: &str,
		now: DateTime<Utc>,
	) -> StoreResult<i64> {
		Ok(SqliteQueueStore::upsert_scheduled_job(self, job_type, cron_expression, now).await?)
	}

	async fn claim_scheduled_job(&self, now: DateTime<Utc>) -> StoreResult<Option<ScheduledJob>> {
		Ok(SqliteQueueStore::claim_scheduled_job(self, now).await?)
	}

	async fn mark_scheduled_job_idle(
		&self,
		id: i64,
		next_run_at: DateTime<Utc>,
	) -> StoreResult<bool> {
		Ok(SqliteQueueStore::mark_scheduled_job_idle(self, id, next_run_at).await?)
	}

	async fn get_scheduled_job(&self, id: i64) -> StoreResult<Option<ScheduledJob>> {
		Ok(SqliteQueueStore::get_scheduled_job(self, id).await?)
	}

	async fn scheduled_jobs(&self) -> StoreResult<Vec<ScheduledJob>> {
		Ok(SqliteQueueStore::scheduled_jobs(self).await?)
	}

	async fn delete_scheduled_job(&self, job_type: &str) -> StoreResult<bool> {
		Ok(SqliteQueueStore::delete_scheduled_job(self, job_type).await?)
	}

	async fn requeue_timed_out_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
		Ok(SqliteQueueStore::requeue_timed_out_jobs(self, cutoff).await?)
	}

	async fn release_stalled_scheduled_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
		Ok(SqliteQueueStore::release_stalled_scheduled_jobs(self, cutoff).await?)
	}

	async fn remove_done_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
		Ok(SqliteQueueStore::remove_done_jobs(self, cutoff).await?)
	}

	async fn remove_failed_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
		Ok(SqliteQueueStore::remove_failed_jobs(self, cutoff).await?)
	}

	/// Checkpoints the WAL into the main database file before closing.
	#[tracing::instrument(skip(self))]
	async fn close(&self) {
		if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
			.execute(&self.pool)
			.await
		{
			tracing::warn!(error = %e, "WAL checkpoint failed during close");
		}
		self.pool.close().await;
		tracing::debug!("queue store closed");
	}
}
