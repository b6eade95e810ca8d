// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The contract between the queue engine and its durable store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::job::{Job, JobFilter, NewJob};
use crate::scheduled_job::ScheduledJob;

/// Durable storage for jobs and scheduled jobs.
///
/// Every mutating method is atomic with respect to every other caller of the
/// same store, including callers in other processes. Implementations pick
/// their own mechanism (a single conditional statement returning the row, or
/// a locked transaction around select + update); the engine relies only on
/// the outcome. Reads are never cached.
///
/// Timestamps are supplied by the caller so that the store never consults a
/// clock of its own.
#[async_trait]
pub trait QueueStore: Send + Sync {
	/// Create the record sets and indexes if they do not exist.
	async fn setup(&self) -> Result<()>;

	// Job operations
	/// Insert all jobs or none. Ids are returned in input order.
	async fn insert_jobs(&self, jobs: &[NewJob]) -> Result<Vec<i64>>;

	/// Move the oldest claimable `Pending` job of `job_type` to `Processing`
	/// and return it. Claimable means `not_before <= now`; oldest means
	/// smallest `(created_at, id)`.
	async fn claim_job(&self, job_type: &str, now: DateTime<Utc>) -> Result<Option<Job>>;

	/// Returns `false` when no job has this id.
	async fn mark_job_done(&self, id: i64) -> Result<bool>;

	/// Returns `false` when no job has this id.
	async fn mark_job_failed(&self, id: i64, error: &str, failed_at: DateTime<Utc>) -> Result<bool>;

	async fn get_job(&self, id: i64) -> Result<Option<Job>>;
	async fn count_jobs(&self, filter: &JobFilter) -> Result<u64>;
	async fn list_jobs(&self, filter: &JobFilter, limit: u32, offset: u32) -> Result<Vec<Job>>;
	async fn job_types(&self) -> Result<Vec<String>>;

	// Scheduled job operations
	/// Insert an `Idle` definition due immediately, or update the cron
	/// expression of the existing definition for `job_type`. Returns the id.
	async fn upsert_scheduled_job(
		&self,
		job_type: &str,
		cron_expression: &str,
		now: DateTime<Utc>,
	) -> Result<i64>;

	/// Move the earliest-due `Idle` definition with `next_run_at <= now` to
	/// `Processing` and return it.
	async fn claim_scheduled_job(&self, now: DateTime<Utc>) -> Result<Option<ScheduledJob>>;

	/// Move a definition back to `Idle` and commit its next due instant.
	async fn mark_scheduled_job_idle(&self, id: i64, next_run_at: DateTime<Utc>) -> Result<bool>;

	async fn get_scheduled_job(&self, id: i64) -> Result<Option<ScheduledJob>>;

	/// All definitions ordered by `created_at`.
	async fn scheduled_jobs(&self) -> Result<Vec<ScheduledJob>>;

	/// Returns `false` when no definition exists for `job_type`.
	async fn delete_scheduled_job(&self, job_type: &str) -> Result<bool>;

	// Maintenance
	/// `Processing` jobs with `created_at < cutoff` go back to `Pending`.
	async fn requeue_timed_out_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64>;

	/// `Processing` definitions claimed before `cutoff` go back to `Idle`
	/// with their due instant unchanged.
	async fn release_stalled_scheduled_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64>;

	/// Delete `Done` jobs with `created_at < cutoff`.
	async fn remove_done_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64>;

	/// Delete `Failed` jobs with `failed_at < cutoff`.
	async fn remove_failed_jobs(&self, cutoff: DateTime<Utc>) -> Result<u64>;

	/// Flush and release the store. No call is valid afterwards.
	async fn close(&self);
}
