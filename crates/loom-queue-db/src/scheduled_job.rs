// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Statements over the `scheduled_jobs` table.

use chrono::{DateTime, Utc};

use loom_queue_core::ScheduledJob;

use crate::error::{DbError, Result};
use crate::store::SqliteQueueStore;
use crate::types::{from_millis, to_millis};

const SCHEDULED_JOB_COLUMNS: &str = "id, type, status, cron_expression, next_run_at, created_at";

#[derive(sqlx::FromRow)]
struct ScheduledJobRow {
	id: i64,
	#[sqlx(rename = "type")]
	job_type: String,
	status: String,
	cron_expression: String,
	next_run_at: i64,
	created_at: i64,
}

impl TryFrom<ScheduledJobRow> for ScheduledJob {
	type Error = DbError;

	fn try_from(row: ScheduledJobRow) -> Result<Self> {
		Ok(ScheduledJob {
			id: row.id,
			job_type: row.job_type,
			status: row.status.parse().map_err(DbError::Internal)?,
			cron_expression: row.cron_expression,
			next_run_at: from_millis(row.next_run_at)?,
			created_at: from_millis(row.created_at)?,
		})
	}
}

impl SqliteQueueStore {
	/// New definitions start idle with `next_run_at = 0`; an existing
	/// definition keeps its id, status and due time.
	#[tracing::instrument(skip(self))]
	pub async fn upsert_scheduled_job(
		&self,
		job_type: &str,
		cron_expression: &str,
		now: DateTime<Utc>,
	) -> Result<i64> {
		let id = sqlx::query_scalar::<_, i64>(
			r#"
			INSERT INTO scheduled_jobs (type, status, cron_expression, next_run_at, created_at)
			VALUES (?, 'idle', ?, 0, ?)
			ON CONFLICT(type) DO UPDATE SET
				cron_expression = excluded.cron_expression
			RETURNING id
			"#,
		)
		.bind(job_type)
		.bind(cron_expression)
		.bind(to_millis(now))
		.fetch_one(self.pool())
		.await?;

		Ok(id)
	}

	#[tracing::instrument(skip(self))]
	pub async fn claim_scheduled_job(&self, now: DateTime<Utc>) -> Result<Option<ScheduledJob>> {
		let row = sqlx::query_as::<_, ScheduledJobRow>(&format!(
			r#"
			UPDATE scheduled_jobs
			SET status = 'processing', claimed_at = ?
			WHERE id = (
				SELECT id FROM scheduled_jobs
				WHERE status = 'idle' AND next_run_at <= ?
				ORDER BY next_run_at ASC, id ASC
				LIMIT 1
			)
			RETURNING {SCHEDULED_JOB_COLUMNS}
			"#
		))
		.bind(to_millis(now))
		.bind(to_millis(now))
		.fetch_optional(self.pool())
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn mark_scheduled_job_idle(&self, id: i64, next_run_at: DateTime<Utc>) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE scheduled_jobs SET status = 'idle', next_run_at = ?, claimed_at = NULL WHERE id = ?",
		)
		.bind(to_millis(next_run_at))
		.bind(id)
		.execute(self.pool())
		.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Definitions claimed before `cutoff` and never released go back to
	/// `Idle`. `next_run_at` is untouched, so they are due again at once.
	#[tracing::instrument(skip(self))]
	pub async fn release_stalled_scheduled_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			r#"
			UPDATE scheduled_jobs
			SET status = 'idle', claimed_at = NULL
			WHERE status = 'processing' AND claimed_at < ?
			"#,
		)
		.bind(to_millis(cutoff))
		.execute(self.pool())
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_scheduled_job(&self, id: i64) -> Result<Option<ScheduledJob>> {
		let row = sqlx::query_as::<_, ScheduledJobRow>(&format!(
			"SELECT {SCHEDULED_JOB_COLUMNS} FROM scheduled_jobs WHERE id = ?"
		))
		.bind(id)
		.fetch_optional(self.pool())
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn scheduled_jobs(&self) -> Result<Vec<ScheduledJob>> {
		let rows = sqlx::query_as::<_, ScheduledJobRow>(&format!(
			"SELECT {SCHEDULED_JOB_COLUMNS} FROM scheduled_jobs ORDER BY created_at ASC, id ASC"
		))
		.fetch_all(self.pool())
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_scheduled_job(&self, job_type: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM scheduled_jobs WHERE type = ?")
			.bind(job_type)
			.execute(self.pool())
			.await?;

		Ok(result.rows_affected() > 0)
	}
}
