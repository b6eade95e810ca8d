// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns due cron definitions into ordinary jobs.
//!
//! There is no scheduler process. Idle workers call [`CronScheduler::run_due`]
//! between polls, and the claim on the definition keeps two callers from
//! materializing the same due instant.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::{QueueError, Result};
use crate::queue::Queue;
use crate::schedule::next_run_after;

/// Seconds before retrying a definition whose expression stopped parsing.
const INVALID_SCHEDULE_RETRY_SECS: i64 = 60;

/// What one call to [`CronScheduler::run_due`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRun {
	pub scheduled_job_id: i64,
	pub job_type: String,
	pub job_id: i64,
	pub next_run_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CronScheduler {
	queue: Queue,
}

impl CronScheduler {
	pub fn new(queue: Queue) -> Self {
		Self { queue }
	}

	pub async fn run_due(&self) -> Result<Option<ScheduledRun>> {
		self.run_due_at(Utc::now()).await
	}

	/// Claim one due definition, enqueue a job for it with an empty object
	/// payload, and return the definition to idle with its next due instant.
	#[instrument(skip(self))]
	pub async fn run_due_at(&self, now: DateTime<Utc>) -> Result<Option<ScheduledRun>> {
		let Some(scheduled) = self.queue.store().claim_scheduled_job(now).await? else {
			return Ok(None);
		};

		let next_run_at = match next_run_after(&scheduled.cron_expression, now) {
			Ok(next) => next,
			Err(e) => {
				warn!(
					scheduled_job_id = scheduled.id,
					job_type = %scheduled.job_type,
					error = %e,
					"scheduled job has an unusable cron expression"
				);
				let retry_at = now + chrono::Duration::seconds(INVALID_SCHEDULE_RETRY_SECS);
				self.queue
					.mark_scheduled_job_as_idle(scheduled.id, retry_at)
					.await?;
				return Err(e);
			}
		};

		let job_id = match self.queue.add(&scheduled.job_type, &json!({})).await {
			Ok(id) => id,
			Err(e) => {
				// Leave the definition due so the next caller tries again.
				if let Err(release) = self
					.queue
					.mark_scheduled_job_as_idle(scheduled.id, scheduled.next_run_at)
					.await
				{
					warn!(
						scheduled_job_id = scheduled.id,
						error = %release,
						"failed to release scheduled job"
					);
				}
				return Err(e);
			}
		};

		self.queue
			.mark_scheduled_job_as_idle(scheduled.id, next_run_at)
			.await?;

		info!(
			scheduled_job_id = scheduled.id,
			job_type = %scheduled.job_type,
			job_id,
			%next_run_at,
			"scheduled job triggered"
		);

		Ok(Some(ScheduledRun {
			scheduled_job_id: scheduled.id,
			job_type: scheduled.job_type,
			job_id,
			next_run_at,
		}))
	}

	/// Run every definition due now. A definition with an unusable
	/// expression is pushed back and skipped; any other error stops the pass,
	/// since the failed definition stays due and would be claimed again.
	pub async fn run_all_due(&self) -> Result<Vec<ScheduledRun>> {
		let now = Utc::now();
		let mut runs = Vec::new();
		loop {
			match self.run_due_at(now).await {
				Ok(Some(run)) => runs.push(run),
				Ok(None) => return Ok(runs),
				Err(QueueError::InvalidSchedule(_)) => continue,
				Err(e) => return Err(e),
			}
		}
	}
}

impl From<&Queue> for CronScheduler {
	fn from(queue: &Queue) -> Self {
		Self::new(queue.clone())
	}
}
