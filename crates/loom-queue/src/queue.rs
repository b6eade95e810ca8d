// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The queue facade producers, workers and the scheduler go through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use loom_queue_core::{Job, JobFilter, NewJob, QueueStore, ScheduledJob};

use crate::error::{QueueError, Result};
use crate::maintenance::{cutoff, MaintenanceCycle, MaintenanceHandle};
use crate::options::QueueOptions;
use crate::schedule::validate_cron_expression;

struct QueueInner {
	store: Arc<dyn QueueStore>,
	options: QueueOptions,
	maintenance: Mutex<Option<MaintenanceHandle>>,
	closed: AtomicBool,
}

/// A handle to one queue engine instance.
///
/// Cloning is cheap and every clone shares the same store and maintenance
/// task. The engine keeps no job state of its own: every read goes to the
/// store.
#[derive(Clone)]
pub struct Queue {
	inner: Arc<QueueInner>,
}

impl Queue {
	/// Apply the schema and start the maintenance cycle.
	#[instrument(skip(store, options))]
	pub async fn open(store: Arc<dyn QueueStore>, options: QueueOptions) -> Result<Self> {
		store.setup().await?;
		let maintenance = MaintenanceCycle::new(store.clone(), options.clone()).start();
		Ok(Self::from_parts(store, options, Some(maintenance)))
	}

	/// Apply the schema without starting maintenance. Suited to short-lived
	/// producers that leave maintenance to a long-running process.
	#[instrument(skip(store, options))]
	pub async fn open_without_maintenance(
		store: Arc<dyn QueueStore>,
		options: QueueOptions,
	) -> Result<Self> {
		store.setup().await?;
		Ok(Self::from_parts(store, options, None))
	}

	fn from_parts(
		store: Arc<dyn QueueStore>,
		options: QueueOptions,
		maintenance: Option<MaintenanceHandle>,
	) -> Self {
		Self {
			inner: Arc::new(QueueInner {
				store,
				options,
				maintenance: Mutex::new(maintenance),
				closed: AtomicBool::new(false),
			}),
		}
	}

	pub fn options(&self) -> &QueueOptions {
		&self.inner.options
	}

	pub fn store(&self) -> &Arc<dyn QueueStore> {
		&self.inner.store
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	/// A one-off maintenance cycle bound to this queue's store and options.
	pub fn maintenance(&self) -> MaintenanceCycle {
		MaintenanceCycle::new(self.inner.store.clone(), self.inner.options.clone())
	}

	fn encode<T: Serialize + ?Sized>(&self, data: &T) -> Result<Vec<u8>> {
		let value = serde_json::to_value(data)?;
		Ok(self.inner.options.serializer.serialize(&value)?)
	}

	// Producers

	pub async fn add<T: Serialize + ?Sized>(&self, job_type: &str, data: &T) -> Result<i64> {
		self.add_at(job_type, data, DateTime::<Utc>::UNIX_EPOCH).await
	}

	/// Enqueue a job that cannot be claimed before `not_before`. Instants in
	/// the past are clamped to now.
	#[instrument(skip(self, data))]
	pub async fn add_at<T: Serialize + ?Sized>(
		&self,
		job_type: &str,
		data: &T,
		not_before: DateTime<Utc>,
	) -> Result<i64> {
		require_job_type(job_type)?;
		let now = Utc::now();
		let job = NewJob {
			job_type: job_type.to_string(),
			data: self.encode(data)?,
			created_at: now,
			not_before: not_before.max(now),
		};

		let ids = self.inner.store.insert_jobs(std::slice::from_ref(&job)).await?;
		let id = ids.into_iter().next().ok_or_else(|| {
			QueueError::Store(loom_queue_core::StoreError::Corrupt(
				"insert returned no id".to_string(),
			))
		})?;
		debug!(job_id = id, "job added");
		Ok(id)
	}

	pub async fn add_delayed<T: Serialize + ?Sized>(
		&self,
		job_type: &str,
		data: &T,
		delay: Duration,
	) -> Result<i64> {
		let delay = chrono::Duration::from_std(delay)
			.map_err(|e| QueueError::InvalidArgument(format!("delay out of range: {e}")))?;
		self.add_at(job_type, data, Utc::now() + delay).await
	}

	/// Enqueue a batch atomically. Ids are returned in input order.
	#[instrument(skip(self, data), fields(count = data.len()))]
	pub async fn add_many<T: Serialize>(&self, job_type: &str, data: &[T]) -> Result<Vec<i64>> {
		require_job_type(job_type)?;
		if data.is_empty() {
			return Ok(Vec::new());
		}

		let now = Utc::now();
		let jobs = data
			.iter()
			.map(|item| Ok(NewJob::immediate(job_type, self.encode(item)?, now)))
			.collect::<Result<Vec<_>>>()?;

		let ids = self.inner.store.insert_jobs(&jobs).await?;
		debug!(count = ids.len(), "jobs added");
		Ok(ids)
	}

	/// Create or update the recurring definition for `job_type`.
	#[instrument(skip(self))]
	pub async fn schedule(&self, job_type: &str, cron_expression: &str) -> Result<i64> {
		require_job_type(job_type)?;
		validate_cron_expression(cron_expression)?;

		let id = self
			.inner
			.store
			.upsert_scheduled_job(job_type, cron_expression, Utc::now())
			.await?;
		info!(scheduled_job_id = id, "job scheduled");
		Ok(id)
	}

	/// Remove the recurring definition for `job_type`. Jobs it already
	/// produced are untouched.
	#[instrument(skip(self))]
	pub async fn unschedule(&self, job_type: &str) -> Result<bool> {
		let removed = self.inner.store.delete_scheduled_job(job_type).await?;
		if removed {
			info!("job unscheduled");
		}
		Ok(removed)
	}

	// Claims and outcomes

	pub async fn get_and_mark_job_as_processing(&self, job_type: &str) -> Result<Option<Job>> {
		require_job_type(job_type)?;
		Ok(self.inner.store.claim_job(job_type, Utc::now()).await?)
	}

	/// Unknown ids are ignored so that a late report racing retention
	/// cleanup is harmless.
	#[instrument(skip(self))]
	pub async fn mark_job_as_done(&self, id: i64) -> Result<()> {
		if !self.inner.store.mark_job_done(id).await? {
			debug!("mark_job_as_done: job no longer exists");
		}
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn mark_job_as_failed(&self, id: i64, error: &str) -> Result<()> {
		if !self
			.inner
			.store
			.mark_job_failed(id, error, Utc::now())
			.await?
		{
			debug!("mark_job_as_failed: job no longer exists");
		}
		Ok(())
	}

	pub async fn get_and_mark_scheduled_job_as_processing(&self) -> Result<Option<ScheduledJob>> {
		Ok(self.inner.store.claim_scheduled_job(Utc::now()).await?)
	}

	pub async fn mark_scheduled_job_as_idle(&self, id: i64, next_run_at: DateTime<Utc>) -> Result<()> {
		if !self
			.inner
			.store
			.mark_scheduled_job_idle(id, next_run_at)
			.await?
		{
			debug!(scheduled_job_id = id, "scheduled job no longer exists");
		}
		Ok(())
	}

	// Reads

	pub async fn count_jobs(&self, filter: &JobFilter) -> Result<u64> {
		Ok(self.inner.store.count_jobs(filter).await?)
	}

	pub async fn get_job_by_id(&self, id: i64) -> Result<Option<Job>> {
		Ok(self.inner.store.get_job(id).await?)
	}

	/// Jobs matching `filter` in id order.
	pub async fn list_jobs(&self, filter: &JobFilter, limit: u32, offset: u32) -> Result<Vec<Job>> {
		Ok(self.inner.store.list_jobs(filter, limit, offset).await?)
	}

	pub async fn get_job_types(&self) -> Result<Vec<String>> {
		Ok(self.inner.store.job_types().await?)
	}

	pub async fn get_scheduled_jobs(&self) -> Result<Vec<ScheduledJob>> {
		Ok(self.inner.store.scheduled_jobs().await?)
	}

	pub async fn get_scheduled_job_by_id(&self, id: i64) -> Result<Option<ScheduledJob>> {
		Ok(self.inner.store.get_scheduled_job(id).await?)
	}

	// Maintenance primitives

	pub async fn requeue_timed_out_jobs(&self, timeout: Duration) -> Result<u64> {
		Ok(self
			.inner
			.store
			.requeue_timed_out_jobs(cutoff(Utc::now(), timeout))
			.await?)
	}

	/// Return scheduled definitions held in `Processing` longer than
	/// `timeout` to `Idle`.
	pub async fn release_stalled_scheduled_jobs(&self, timeout: Duration) -> Result<u64> {
		Ok(self
			.inner
			.store
			.release_stalled_scheduled_jobs(cutoff(Utc::now(), timeout))
			.await?)
	}

	pub async fn remove_done_jobs(&self, older_than: Duration) -> Result<u64> {
		Ok(self
			.inner
			.store
			.remove_done_jobs(cutoff(Utc::now(), older_than))
			.await?)
	}

	pub async fn remove_failed_jobs(&self, older_than: Duration) -> Result<u64> {
		Ok(self
			.inner
			.store
			.remove_failed_jobs(cutoff(Utc::now(), older_than))
			.await?)
	}

	/// Stop maintenance, then close the store. Later calls are no-ops.
	#[instrument(skip(self))]
	pub async fn close(&self) {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(maintenance) = self.inner.maintenance.lock().await.take() {
			maintenance.stop().await;
		}
		self.inner.store.close().await;
		info!("queue closed");
	}
}

fn require_job_type(job_type: &str) -> Result<()> {
	if job_type.trim().is_empty() {
		return Err(QueueError::InvalidArgument(
			"job type must not be empty".to_string(),
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_queue_core::{JobStatus, ScheduledJobStatus, StoreError};
	use loom_queue_db::testing::create_test_store;
	use serde_json::json;

	async fn open_queue() -> Queue {
		let store = Arc::new(create_test_store().await.unwrap());
		Queue::open(store, QueueOptions::default()).await.unwrap()
	}

	#[tokio::test]
	async fn test_paint_batch_scenario() {
		let queue = open_queue().await;

		let ids = queue
			.add_many(
				"paint",
				&[
					json!({"color": "red"}),
					json!({"color": "green"}),
					json!({"color": "blue"}),
				],
			)
			.await
			.unwrap();
		assert_eq!(ids.len(), 3);
		assert!(ids.windows(2).all(|w| w[0] < w[1]));
		assert_eq!(
			queue
				.count_jobs(&JobFilter::new().job_type("paint"))
				.await
				.unwrap(),
			3
		);

		let job = queue
			.get_and_mark_job_as_processing("paint")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(job.id, ids[0]);
		assert_eq!(job.json_payload::<serde_json::Value>().unwrap(), json!({"color": "red"}));
		queue.mark_job_as_done(job.id).await.unwrap();

		let pending = JobFilter::new().job_type("paint").status(JobStatus::Pending);
		assert_eq!(queue.count_jobs(&pending).await.unwrap(), 2);
		let done = JobFilter::new().status(JobStatus::Done);
		assert_eq!(queue.count_jobs(&done).await.unwrap(), 1);

		queue.close().await;
	}

	#[tokio::test]
	async fn test_failed_job_scenario() {
		let queue = open_queue().await;

		let id = queue.add("t", &json!({"x": 1})).await.unwrap();
		let job = queue.get_and_mark_job_as_processing("t").await.unwrap().unwrap();
		assert_eq!(job.id, id);
		assert_eq!(job.status, JobStatus::Processing);
		queue.mark_job_as_failed(id, "boom").await.unwrap();

		let job = queue.get_job_by_id(id).await.unwrap().unwrap();
		assert_eq!(job.status, JobStatus::Failed);
		assert_eq!(job.error.as_deref(), Some("boom"));
		assert!(job.failed_at.is_some());
		assert!(job.is_consistent());

		queue.close().await;
	}

	#[tokio::test]
	async fn test_fifo_by_type() {
		let queue = open_queue().await;
		let a = queue.add("t", "A").await.unwrap();
		queue.add("other", "X").await.unwrap();
		let b = queue.add("t", "B").await.unwrap();
		let c = queue.add("t", "C").await.unwrap();

		let mut claimed = Vec::new();
		while let Some(job) = queue.get_and_mark_job_as_processing("t").await.unwrap() {
			claimed.push(job.id);
		}
		assert_eq!(claimed, vec![a, b, c]);
	}

	#[tokio::test]
	async fn test_marking_unknown_job_is_a_no_op() {
		let queue = open_queue().await;
		queue.mark_job_as_done(12345).await.unwrap();
		queue.mark_job_as_failed(12345, "gone").await.unwrap();
		assert!(queue.get_job_by_id(12345).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_delayed_job_is_not_claimable_early() {
		let queue = open_queue().await;
		let id = queue
			.add_delayed("later", &json!({}), Duration::from_secs(3600))
			.await
			.unwrap();

		assert!(queue
			.get_and_mark_job_as_processing("later")
			.await
			.unwrap()
			.is_none());
		let job = queue.get_job_by_id(id).await.unwrap().unwrap();
		assert_eq!(job.status, JobStatus::Pending);
		assert!(job.not_before > job.created_at);
	}

	#[tokio::test]
	async fn test_schedule_upsert_keeps_id() {
		let queue = open_queue().await;

		let first = queue.schedule("x", "0 0 * * *").await.unwrap();
		let second = queue.schedule("x", "*/5 * * * *").await.unwrap();
		assert_eq!(first, second);

		let all = queue.get_scheduled_jobs().await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].job_type, "x");
		assert_eq!(all[0].cron_expression, "*/5 * * * *");
		assert_eq!(all[0].status, ScheduledJobStatus::Idle);
	}

	#[tokio::test]
	async fn test_schedule_rejects_bad_cron() {
		let queue = open_queue().await;
		let result = queue.schedule("x", "every tuesday").await;
		assert!(matches!(result, Err(QueueError::InvalidSchedule(_))));
		assert!(queue.get_scheduled_jobs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_unschedule() {
		let queue = open_queue().await;
		queue.schedule("x", "0 0 * * *").await.unwrap();
		assert!(queue.unschedule("x").await.unwrap());
		assert!(!queue.unschedule("x").await.unwrap());
	}

	#[tokio::test]
	async fn test_empty_job_type_is_rejected() {
		let queue = open_queue().await;
		assert!(matches!(
			queue.add("", &json!({})).await,
			Err(QueueError::InvalidArgument(_))
		));
		assert!(matches!(
			queue.schedule(" ", "0 0 * * *").await,
			Err(QueueError::InvalidArgument(_))
		));
	}

	#[tokio::test]
	async fn test_requeue_timed_out_jobs() {
		let queue = open_queue().await;
		let created = Utc::now() - chrono::Duration::hours(1);
		let ids = queue
			.store()
			.insert_jobs(&[NewJob::immediate("t", b"{}".to_vec(), created)])
			.await
			.unwrap();
		let claimed = queue.get_and_mark_job_as_processing("t").await.unwrap().unwrap();
		assert_eq!(claimed.id, ids[0]);

		assert_eq!(
			queue
				.requeue_timed_out_jobs(Duration::from_secs(2 * 3600))
				.await
				.unwrap(),
			0
		);
		assert_eq!(
			queue
				.requeue_timed_out_jobs(Duration::from_secs(1800))
				.await
				.unwrap(),
			1
		);

		let again = queue.get_and_mark_job_as_processing("t").await.unwrap().unwrap();
		assert_eq!(again.id, ids[0]);
	}

	#[tokio::test]
	async fn test_retention_primitives() {
		let queue = open_queue().await;
		let old = Utc::now() - chrono::Duration::days(10);
		let ids = queue
			.store()
			.insert_jobs(&[
				NewJob::immediate("t", b"1".to_vec(), old),
				NewJob::immediate("t", b"2".to_vec(), old),
			])
			.await
			.unwrap();
		for _ in 0..2 {
			queue.get_and_mark_job_as_processing("t").await.unwrap();
		}
		queue.mark_job_as_done(ids[0]).await.unwrap();
		queue.mark_job_as_failed(ids[1], "x").await.unwrap();

		let week = Duration::from_secs(7 * 24 * 3600);
		assert_eq!(queue.remove_done_jobs(week).await.unwrap(), 1);
		// failed_at is now, so the failed job is still inside the window
		assert_eq!(queue.remove_failed_jobs(week).await.unwrap(), 0);
		assert_eq!(queue.count_jobs(&JobFilter::new()).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_reads() {
		let queue = open_queue().await;
		queue.add_many("a", &[1, 2, 3]).await.unwrap();
		queue.add("b", &4).await.unwrap();

		let mut types = queue.get_job_types().await.unwrap();
		types.sort();
		assert_eq!(types, vec!["a".to_string(), "b".to_string()]);

		let page = queue
			.list_jobs(&JobFilter::new().job_type("a"), 2, 1)
			.await
			.unwrap();
		assert_eq!(page.len(), 2);
		assert_eq!(page[0].json_payload::<i32>().unwrap(), 2);

		let id = queue.schedule("nightly", "0 0 * * *").await.unwrap();
		let scheduled = queue.get_scheduled_job_by_id(id).await.unwrap().unwrap();
		assert_eq!(scheduled.job_type, "nightly");
	}

	#[tokio::test]
	async fn test_close_is_idempotent() {
		let queue = open_queue().await;
		let clone = queue.clone();
		queue.close().await;
		clone.close().await;
		assert!(clone.is_closed());

		let result = clone.count_jobs(&JobFilter::new()).await;
		assert!(matches!(
			result,
			Err(QueueError::Store(StoreError::Unavailable(_)))
		));
	}
}
