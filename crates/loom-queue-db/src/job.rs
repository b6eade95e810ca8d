// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Statements over the `jobs` table.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use loom_queue_core::{Job, JobFilter, NewJob};

use crate::error::{DbError, Result};
use crate::store::SqliteQueueStore;
use crate::types::{from_millis, to_millis};

const JOB_COLUMNS: &str = "id, type, data, status, created_at, not_before, failed_at, error";

#[derive(sqlx::FromRow)]
struct JobRow {
	id: i64,
	#[sqlx(rename = "type")]
	job_type: String,
	data: Vec<u8>,
	status: String,
	created_at: i64,
	not_before: i64,
	failed_at: Option<i64>,
	error: Option<String>,
}

impl TryFrom<JobRow> for Job {
	type Error = DbError;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(Job {
			id: row.id,
			job_type: row.job_type,
			data: row.data,
			status: row.status.parse().map_err(DbError::Internal)?,
			created_at: from_millis(row.created_at)?,
			not_before: from_millis(row.not_before)?,
			failed_at: row.failed_at.map(from_millis).transpose()?,
			error: row.error,
		})
	}
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a JobFilter) {
	builder.push(" WHERE 1 = 1");
	if let Some(job_type) = &filter.job_type {
		builder.push(" AND type = ").push_bind(job_type.as_str());
	}
	if let Some(status) = filter.status {
		builder.push(" AND status = ").push_bind(status.as_str());
	}
}

impl SqliteQueueStore {
	#[tracing::instrument(skip(self, jobs), fields(count = jobs.len()))]
	pub async fn insert_jobs(&self, jobs: &[NewJob]) -> Result<Vec<i64>> {
		if jobs.is_empty() {
			return Ok(Vec::new());
		}

		let mut tx = self.pool().begin().await?;
		let mut ids = Vec::with_capacity(jobs.len());

		for job in jobs {
			let id = sqlx::query_scalar::<_, i64>(
				r#"
				INSERT INTO jobs (type, data, status, created_at, not_before)
				VALUES (?, ?, 'pending', ?, ?)
				RETURNING id
				"#,
			)
			.bind(&job.job_type)
			.bind(&job.data)
			.bind(to_millis(job.created_at))
			.bind(to_millis(job.not_before))
			.fetch_one(&mut *tx)
			.await?;
			ids.push(id);
		}

		tx.commit().await?;
		tracing::debug!(count = ids.len(), "inserted jobs");
		Ok(ids)
	}

	/// The subquery and the update run as one statement under the database
	/// write lock, so a row can only ever be handed to one caller.
	#[tracing::instrument(skip(self))]
	pub async fn claim_job(&self, job_type: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!(
			r#"
			UPDATE jobs
			SET status = 'processing'
			WHERE id = (
				SELECT id FROM jobs
				WHERE status = 'pending' AND type = ? AND not_before <= ?
				ORDER BY created_at ASC, id ASC
				LIMIT 1
			)
			RETURNING {JOB_COLUMNS}
			"#
		))
		.bind(job_type)
		.bind(to_millis(now))
		.fetch_optional(self.pool())
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn mark_job_done(&self, id: i64) -> Result<bool> {
		let result = sqlx::query(
			"UPDATE jobs SET status = 'done', failed_at = NULL, error = NULL WHERE id = ?",
		)
		.bind(id)
		.execute(self.pool())
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self, error))]
	pub async fn mark_job_failed(
		&self,
		id: i64,
		error: &str,
		failed_at: DateTime<Utc>,
	) -> Result<bool> {
		let result =
			sqlx::query("UPDATE jobs SET status = 'failed', failed_at = ?, error = ? WHERE id = ?")
				.bind(to_millis(failed_at))
				.bind(error)
				.bind(id)
				.execute(self.pool())
				.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_job(&self, id: i64) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
			.bind(id)
			.fetch_optional(self.pool())
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_jobs(&self, filter: &JobFilter) -> Result<u64> {
		let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM jobs");
		push_filter(&mut builder, filter);

		let count: i64 = builder.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
		Ok(count.max(0) as u64)
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_jobs(&self, filter: &JobFilter, limit: u32, offset: u32) -> Result<Vec<Job>> {
		let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs"));
		push_filter(&mut builder, filter);
		builder
			.push(" ORDER BY id ASC LIMIT ")
			.push_bind(limit as i64)
			.push(" OFFSET ")
			.push_bind(offset as i64);

		let rows: Vec<JobRow> = builder.build_query_as::<JobRow>().fetch_all(self.pool()).await?;
		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn job_types(&self) -> Result<Vec<String>> {
		let types = sqlx::query_scalar::<_, String>("SELECT DISTINCT type FROM jobs")
			.fetch_all(self.pool())
			.await?;
		Ok(types)
	}

	#[tracing::instrument(skip(self))]
	pub async fn requeue_timed_out_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			"UPDATE jobs SET status = 'pending' WHERE status = 'processing' AND created_at < ?",
		)
		.bind(to_millis(cutoff))
		.execute(self.pool())
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn remove_done_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM jobs WHERE status = 'done' AND created_at < ?")
			.bind(to_millis(cutoff))
			.execute(self.pool())
			.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn remove_failed_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM jobs WHERE status = 'failed' AND failed_at < ?")
			.bind(to_millis(cutoff))
			.execute(self.pool())
			.await?;

		Ok(result.rows_affected())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_file_store, create_test_store};
	use chrono::Duration;
	use loom_queue_core::JobStatus;
	use std::collections::HashSet;

	fn new_job(job_type: &str, data: &[u8], created_at: DateTime<Utc>) -> NewJob {
		NewJob::immediate(job_type, data.to_vec(), created_at)
	}

	fn at(millis: i64) -> DateTime<Utc> {
		from_millis(millis).unwrap()
	}

	#[tokio::test]
	async fn test_insert_and_get_job() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);

		let ids = store
			.insert_jobs(&[new_job("paint", br#"{"color":"red"}"#, now)])
			.await
			.unwrap();
		assert_eq!(ids.len(), 1);

		let job = store.get_job(ids[0]).await.unwrap().unwrap();
		assert_eq!(job.job_type, "paint");
		assert_eq!(job.data, br#"{"color":"red"}"#.to_vec());
		assert_eq!(job.status, JobStatus::Pending);
		assert_eq!(job.created_at, now);
		assert_eq!(job.not_before, now);
		assert!(job.is_consistent());
	}

	#[tokio::test]
	async fn test_insert_returns_ids_in_input_order() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let jobs: Vec<NewJob> = (0..5)
			.map(|i| new_job("paint", format!("{i}").as_bytes(), now))
			.collect();

		let ids = store.insert_jobs(&jobs).await.unwrap();
		for (i, id) in ids.iter().enumerate() {
			let job = store.get_job(*id).await.unwrap().unwrap();
			assert_eq!(job.data, format!("{i}").into_bytes());
		}
		assert!(ids.windows(2).all(|w| w[0] < w[1]));
	}

	#[tokio::test]
	async fn test_insert_batch_is_all_or_nothing() {
		let store = create_test_store().await.unwrap();
		sqlx::query(
			r#"
			CREATE TRIGGER reject_third_row BEFORE INSERT ON jobs
			WHEN NEW.data = x'33'
			BEGIN
				SELECT RAISE(ABORT, 'rejected');
			END
			"#,
		)
		.execute(store.pool())
		.await
		.unwrap();

		let now = at(1_700_000_000_000);
		let jobs: Vec<NewJob> = ["1", "2", "3", "4"]
			.iter()
			.map(|data| new_job("t", data.as_bytes(), now))
			.collect();

		assert!(store.insert_jobs(&jobs).await.is_err());
		assert_eq!(store.count_jobs(&JobFilter::new()).await.unwrap(), 0);
		assert!(store.claim_job("t", now).await.unwrap().is_none());

		// the store stays usable after the rollback
		let ids = store.insert_jobs(&jobs[..2]).await.unwrap();
		assert_eq!(ids.len(), 2);
	}

	#[tokio::test]
	async fn test_insert_empty_batch() {
		let store = create_test_store().await.unwrap();
		assert!(store.insert_jobs(&[]).await.unwrap().is_empty());
		assert_eq!(store.count_jobs(&JobFilter::new()).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_claim_is_fifo_by_type() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let ids = store
			.insert_jobs(&[
				new_job("t", b"A", now),
				new_job("other", b"X", now),
				new_job("t", b"B", now),
				new_job("t", b"C", now + Duration::milliseconds(1)),
			])
			.await
			.unwrap();

		let later = now + Duration::seconds(1);
		let a = store.claim_job("t", later).await.unwrap().unwrap();
		let b = store.claim_job("t", later).await.unwrap().unwrap();
		let c = store.claim_job("t", later).await.unwrap().unwrap();
		assert_eq!((a.id, b.id, c.id), (ids[0], ids[2], ids[3]));
		assert_eq!(a.status, JobStatus::Processing);
		assert!(store.claim_job("t", later).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_claim_orders_by_created_at_before_id() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let ids = store
			.insert_jobs(&[
				new_job("t", b"newer", now),
				new_job("t", b"older", now - Duration::seconds(5)),
			])
			.await
			.unwrap();

		let first = store.claim_job("t", now).await.unwrap().unwrap();
		assert_eq!(first.id, ids[1]);
	}

	#[tokio::test]
	async fn test_claim_respects_not_before() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let mut delayed = new_job("t", b"later", now);
		delayed.not_before = now + Duration::minutes(5);
		store.insert_jobs(&[delayed]).await.unwrap();

		assert!(store.claim_job("t", now).await.unwrap().is_none());
		let job = store
			.claim_job("t", now + Duration::minutes(5))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(job.data, b"later".to_vec());
	}

	#[tokio::test]
	async fn test_claim_without_pending_has_no_side_effects() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let ids = store.insert_jobs(&[new_job("t", b"", now)]).await.unwrap();
		store.mark_job_done(ids[0]).await.unwrap();

		assert!(store.claim_job("t", now).await.unwrap().is_none());
		let job = store.get_job(ids[0]).await.unwrap().unwrap();
		assert_eq!(job.status, JobStatus::Done);
	}

	#[tokio::test]
	async fn test_mark_failed_then_done_clears_failure() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let ids = store.insert_jobs(&[new_job("t", b"", now)]).await.unwrap();
		let id = ids[0];

		assert!(store.mark_job_failed(id, "boom", now).await.unwrap());
		let failed = store.get_job(id).await.unwrap().unwrap();
		assert_eq!(failed.status, JobStatus::Failed);
		assert_eq!(failed.error.as_deref(), Some("boom"));
		assert_eq!(failed.failed_at, Some(now));
		assert!(failed.is_consistent());

		assert!(store.mark_job_done(id).await.unwrap());
		let done = store.get_job(id).await.unwrap().unwrap();
		assert_eq!(done.status, JobStatus::Done);
		assert!(done.is_consistent());
	}

	#[tokio::test]
	async fn test_mark_missing_job_reports_false() {
		let store = create_test_store().await.unwrap();
		assert!(!store.mark_job_done(42).await.unwrap());
		assert!(!store.mark_job_failed(42, "gone", Utc::now()).await.unwrap());
	}

	#[tokio::test]
	async fn test_count_and_list_with_filters() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let ids = store
			.insert_jobs(&[
				new_job("paint", b"1", now),
				new_job("paint", b"2", now),
				new_job("sand", b"3", now),
			])
			.await
			.unwrap();
		store.mark_job_done(ids[1]).await.unwrap();

		assert_eq!(store.count_jobs(&JobFilter::new()).await.unwrap(), 3);
		assert_eq!(
			store
				.count_jobs(&JobFilter::new().job_type("paint"))
				.await
				.unwrap(),
			2
		);
		assert_eq!(
			store
				.count_jobs(&JobFilter::new().job_type("paint").status(JobStatus::Pending))
				.await
				.unwrap(),
			1
		);
		assert_eq!(
			store
				.count_jobs(&JobFilter::new().status(JobStatus::Done))
				.await
				.unwrap(),
			1
		);

		let listed = store.list_jobs(&JobFilter::new(), 2, 1).await.unwrap();
		assert_eq!(
			listed.iter().map(|j| j.id).collect::<Vec<_>>(),
			vec![ids[1], ids[2]]
		);
	}

	#[tokio::test]
	async fn test_job_types_are_distinct() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		store
			.insert_jobs(&[
				new_job("paint", b"", now),
				new_job("paint", b"", now),
				new_job("sand", b"", now),
			])
			.await
			.unwrap();

		let mut types = store.job_types().await.unwrap();
		types.sort();
		assert_eq!(types, vec!["paint".to_string(), "sand".to_string()]);
	}

	#[tokio::test]
	async fn test_requeue_timed_out_jobs() {
		let store = create_test_store().await.unwrap();
		let created = at(1_700_000_000_000);
		let ids = store
			.insert_jobs(&[
				new_job("t", b"stale", created),
				new_job("t", b"fresh", created + Duration::minutes(10)),
			])
			.await
			.unwrap();
		let now = created + Duration::minutes(20);
		store.claim_job("t", now).await.unwrap().unwrap();
		store.claim_job("t", now).await.unwrap().unwrap();

		let requeued = store
			.requeue_timed_out_jobs(now - Duration::minutes(15))
			.await
			.unwrap();
		assert_eq!(requeued, 1);

		let stale = store.get_job(ids[0]).await.unwrap().unwrap();
		let fresh = store.get_job(ids[1]).await.unwrap().unwrap();
		assert_eq!(stale.status, JobStatus::Pending);
		assert_eq!(fresh.status, JobStatus::Processing);

		let reclaimed = store.claim_job("t", now).await.unwrap().unwrap();
		assert_eq!(reclaimed.id, ids[0]);
	}

	#[tokio::test]
	async fn test_remove_done_jobs_boundary() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let older_than = Duration::days(7);
		let cutoff = now - older_than;
		let ids = store
			.insert_jobs(&[
				new_job("t", b"expired", cutoff - Duration::milliseconds(1)),
				new_job("t", b"kept", cutoff + Duration::milliseconds(1)),
				new_job("t", b"pending", cutoff - Duration::days(1)),
			])
			.await
			.unwrap();
		store.mark_job_done(ids[0]).await.unwrap();
		store.mark_job_done(ids[1]).await.unwrap();

		assert_eq!(store.remove_done_jobs(cutoff).await.unwrap(), 1);
		assert!(store.get_job(ids[0]).await.unwrap().is_none());
		assert!(store.get_job(ids[1]).await.unwrap().is_some());
		assert!(store.get_job(ids[2]).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_remove_failed_jobs_uses_failed_at() {
		let store = create_test_store().await.unwrap();
		let now = at(1_700_000_000_000);
		let cutoff = now - Duration::days(30);
		let ids = store
			.insert_jobs(&[
				new_job("t", b"old-failure", cutoff - Duration::days(10)),
				new_job("t", b"recent-failure", cutoff - Duration::days(10)),
			])
			.await
			.unwrap();
		store
			.mark_job_failed(ids[0], "boom", cutoff - Duration::milliseconds(1))
			.await
			.unwrap();
		store
			.mark_job_failed(ids[1], "boom", cutoff + Duration::milliseconds(1))
			.await
			.unwrap();

		assert_eq!(store.remove_failed_jobs(cutoff).await.unwrap(), 1);
		assert!(store.get_job(ids[0]).await.unwrap().is_none());
		assert!(store.get_job(ids[1]).await.unwrap().is_some());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_claims_single_job_across_processes() {
		let dir = tempfile::tempdir().unwrap();
		let mut stores = Vec::new();
		for _ in 0..8 {
			stores.push(create_file_store(dir.path()).await.unwrap());
		}
		let now = Utc::now();
		stores[0]
			.insert_jobs(&[new_job("t", b"only", now)])
			.await
			.unwrap();

		let claims = futures::future::join_all(stores.iter().map(|store| {
			let store = store.clone();
			tokio::spawn(async move { store.claim_job("t", Utc::now()).await })
		}))
		.await;

		let winners = claims
			.into_iter()
			.map(|joined| joined.unwrap().unwrap())
			.filter(Option::is_some)
			.count();
		assert_eq!(winners, 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_claims_never_duplicate() {
		let dir = tempfile::tempdir().unwrap();
		let mut stores = Vec::new();
		for _ in 0..4 {
			stores.push(create_file_store(dir.path()).await.unwrap());
		}
		let now = Utc::now();
		let jobs: Vec<NewJob> = (0..40)
			.map(|i| new_job("t", format!("{i}").as_bytes(), now))
			.collect();
		stores[0].insert_jobs(&jobs).await.unwrap();

		let handles: Vec<_> = stores
			.iter()
			.map(|store| {
				let store = store.clone();
				tokio::spawn(async move {
					let mut claimed = Vec::new();
					while let Some(job) = store.claim_job("t", Utc::now()).await.unwrap() {
						claimed.push(job.id);
					}
					claimed
				})
			})
			.collect();

		let mut all = Vec::new();
		for handle in handles {
			all.extend(handle.await.unwrap());
		}
		let unique: HashSet<i64> = all.iter().copied().collect();
		assert_eq!(all.len(), 40);
		assert_eq!(unique.len(), 40);
	}
}
