// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic lease reaping and retention cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use loom_queue_core::QueueStore;

use crate::options::{CountCallback, QueueOptions};

/// Longest period between passes; larger intervals are clamped to it.
pub const MAX_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `now - age`, saturating at the earliest representable instant.
pub(crate) fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
	chrono::Duration::from_std(age)
		.ok()
		.and_then(|age| now.checked_sub_signed(age))
		.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Counts from one maintenance pass. `None` means the step failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
	pub requeued: Option<u64>,
	pub scheduled_released: Option<u64>,
	pub done_removed: Option<u64>,
	pub failed_removed: Option<u64>,
}

impl MaintenanceReport {
	pub fn is_complete(&self) -> bool {
		self.requeued.is_some()
			&& self.scheduled_released.is_some()
			&& self.done_removed.is_some()
			&& self.failed_removed.is_some()
	}
}

pub struct MaintenanceCycle {
	store: Arc<dyn QueueStore>,
	options: QueueOptions,
}

impl MaintenanceCycle {
	pub fn new(store: Arc<dyn QueueStore>, options: QueueOptions) -> Self {
		Self { store, options }
	}

	pub async fn run_once(&self) -> MaintenanceReport {
		self.run_once_at(Utc::now()).await
	}

	/// Requeue jobs, release stalled scheduled definitions, then purge `Done`
	/// and `Failed`. Each step is its own store call; a failing step is
	/// logged and the next one still runs.
	#[instrument(skip(self))]
	pub async fn run_once_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
		let requeued = report(
			"requeue_timed_out_jobs",
			self.store
				.requeue_timed_out_jobs(cutoff(now, self.options.timeout))
				.await,
			self.options.on_processing_jobs_requeued.as_ref(),
		);

		let scheduled_released = report(
			"release_stalled_scheduled_jobs",
			self.store
				.release_stalled_scheduled_jobs(cutoff(now, self.options.timeout))
				.await,
			None,
		);

		let done_removed = report(
			"remove_done_jobs",
			self.store
				.remove_done_jobs(cutoff(now, self.options.remove_done_jobs_older_than))
				.await,
			self.options.on_done_jobs_removed.as_ref(),
		);

		let failed_removed = report(
			"remove_failed_jobs",
			self.store
				.remove_failed_jobs(cutoff(now, self.options.remove_failed_jobs_older_than))
				.await,
			self.options.on_failed_jobs_removed.as_ref(),
		);

		MaintenanceReport {
			requeued,
			scheduled_released,
			done_removed,
			failed_removed,
		}
	}

	/// Spawn the periodic task. The first pass runs one interval from now.
	pub fn start(self) -> MaintenanceHandle {
		let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
		let period = self
			.options
			.maintenance_interval
			.clamp(Duration::from_millis(1), MAX_MAINTENANCE_INTERVAL);

		let handle = tokio::spawn(async move {
			let now = tokio::time::Instant::now();
			let start = now.checked_add(period).unwrap_or(now);
			let mut interval = tokio::time::interval_at(start, period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = interval.tick() => {
						let report = self.run_once().await;
						debug!(?report, "maintenance pass finished");
					}
					_ = shutdown_rx.recv() => {
						info!("Shutting down queue maintenance");
						break;
					}
				}
			}
		});

		info!(interval = ?period, "Queue maintenance started");
		MaintenanceHandle {
			shutdown_tx,
			handle: Some(handle),
		}
	}
}

fn report(
	step: &'static str,
	result: loom_queue_core::Result<u64>,
	callback: Option<&CountCallback>,
) -> Option<u64> {
	match result {
		Ok(count) => {
			if count > 0 {
				info!(step, count, "maintenance step affected jobs");
			}
			if let Some(callback) = callback {
				callback(count);
			}
			Some(count)
		}
		Err(e) => {
			warn!(step, error = %e, "maintenance step failed");
			None
		}
	}
}

/// Owns the running maintenance task. Dropping the handle aborts the task.
pub struct MaintenanceHandle {
	shutdown_tx: broadcast::Sender<()>,
	handle: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
	/// Signal shutdown and wait for the task to exit. A pass already in
	/// progress completes first; no store call happens after this returns.
	pub async fn stop(mut self) {
		let _ = self.shutdown_tx.send(());
		if let Some(handle) = self.handle.take() {
			let _ = handle.await;
		}
	}

	pub fn is_finished(&self) -> bool {
		self.handle.as_ref().map_or(true, JoinHandle::is_finished)
	}
}

impl Drop for MaintenanceHandle {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}
}
