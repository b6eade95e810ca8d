// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run a worker until its job type has nothing left to do.
//!
//! Intended for batch jobs and tests. Long-running services should use
//! [`Worker::start`] and [`WorkerHandle::stop`](crate::WorkerHandle::stop).

use std::time::Duration;

use tracing::{info, instrument};

use loom_queue_core::{JobFilter, JobStatus};

use crate::error::{QueueError, Result};
use crate::worker::Worker;

const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Start `worker` and return once no `Pending` or `Processing` job of its
/// type remains, stopping the worker first.
///
/// Jobs delayed past `timeout` keep the queue from draining.
///
/// # Errors
///
/// [`QueueError::DrainTimeout`] when `timeout` elapses first; store errors
/// from the drain check are returned as they occur.
#[instrument(skip(worker), fields(job_type = %worker.job_type()))]
pub async fn run_until_drained(worker: &Worker, timeout: Duration) -> Result<()> {
	let handle = worker.start();
	let outcome = tokio::time::timeout(timeout, wait_for_drain(worker)).await;
	handle.stop().await;

	match outcome {
		Ok(result) => {
			result?;
			info!("queue drained");
			Ok(())
		}
		Err(_) => Err(QueueError::DrainTimeout(timeout)),
	}
}

async fn wait_for_drain(worker: &Worker) -> Result<()> {
	let queue = worker.queue();
	let pending = JobFilter::new()
		.job_type(worker.job_type())
		.status(JobStatus::Pending);
	let processing = JobFilter::new()
		.job_type(worker.job_type())
		.status(JobStatus::Processing);

	loop {
		let outstanding = queue.count_jobs(&pending).await? + queue.count_jobs(&processing).await?;
		if outstanding == 0 {
			return Ok(());
		}
		tokio::time::sleep(DRAIN_CHECK_INTERVAL).await;
	}
}
