// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Polling workers bound to one job type.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use loom_queue_core::Job;

use crate::error::Result;
use crate::queue::Queue;
use crate::scheduler::CronScheduler;

/// Runs one claimed job. An `Err` or a panic marks the job `Failed`.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
	async fn handle(&self, job: Job) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
	F: Fn(Job) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
	async fn handle(&self, job: Job) -> anyhow::Result<()> {
		(self)(job).await
	}
}

pub type JobCallback = Arc<dyn Fn(&Job) + Send + Sync>;
pub type FailedCallback = Arc<dyn Fn(&Job, &str) + Send + Sync>;

#[derive(Clone)]
pub struct WorkerOptions {
	/// Sleep between polls that found nothing to do.
	pub poll_interval: Duration,
	/// Upper bound of the random delay added to `poll_interval`.
	pub poll_jitter: Duration,
	/// Whether idle polls also advance due cron definitions.
	pub run_scheduler: bool,
	pub on_processing: Option<JobCallback>,
	pub on_completed: Option<JobCallback>,
	pub on_failed: Option<FailedCallback>,
}

impl Default for WorkerOptions {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			poll_jitter: Duration::from_millis(100),
			run_scheduler: true,
			on_processing: None,
			on_completed: None,
			on_failed: None,
		}
	}
}

impl WorkerOptions {
	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn poll_jitter(mut self, jitter: Duration) -> Self {
		self.poll_jitter = jitter;
		self
	}

	pub fn run_scheduler(mut self, enabled: bool) -> Self {
		self.run_scheduler = enabled;
		self
	}

	pub fn on_processing(mut self, callback: impl Fn(&Job) + Send + Sync + 'static) -> Self {
		self.on_processing = Some(Arc::new(callback));
		self
	}

	pub fn on_completed(mut self, callback: impl Fn(&Job) + Send + Sync + 'static) -> Self {
		self.on_completed = Some(Arc::new(callback));
		self
	}

	pub fn on_failed(mut self, callback: impl Fn(&Job, &str) + Send + Sync + 'static) -> Self {
		self.on_failed = Some(Arc::new(callback));
		self
	}

	/// Delay before the next poll after an idle one.
	pub fn backoff(&self) -> Duration {
		let jitter_ms = u64::try_from(self.poll_jitter.as_millis()).unwrap_or(u64::MAX);
		self.poll_interval + Duration::from_millis(fastrand::u64(0..=jitter_ms))
	}
}

impl fmt::Debug for WorkerOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkerOptions")
			.field("poll_interval", &self.poll_interval)
			.field("poll_jitter", &self.poll_jitter)
			.field("run_scheduler", &self.run_scheduler)
			.finish_non_exhaustive()
	}
}

/// A worker for one job type. Cloning shares the handler.
#[derive(Clone)]
pub struct Worker {
	queue: Queue,
	job_type: String,
	handler: Arc<dyn JobHandler>,
	options: WorkerOptions,
}

impl Worker {
	pub fn new(queue: Queue, job_type: impl Into<String>, handler: impl JobHandler) -> Self {
		Self {
			queue,
			job_type: job_type.into(),
			handler: Arc::new(handler),
			options: WorkerOptions::default(),
		}
	}

	pub fn with_options(mut self, options: WorkerOptions) -> Self {
		self.options = options;
		self
	}

	pub fn job_type(&self) -> &str {
		&self.job_type
	}

	pub fn queue(&self) -> &Queue {
		&self.queue
	}

	pub fn options(&self) -> &WorkerOptions {
		&self.options
	}

	/// Spawn the poll loop and return immediately.
	///
	/// Dropping the returned handle also stops the loop after its current
	/// iteration.
	#[must_use = "dropping the handle stops the worker"]
	pub fn start(&self) -> WorkerHandle {
		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		let worker = self.clone();
		let span = info_span!("worker", job_type = %self.job_type);
		let handle = tokio::spawn(worker.run(shutdown_rx).instrument(span));

		WorkerHandle {
			job_type: self.job_type.clone(),
			shutdown_tx,
			handle,
		}
	}

	async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
		info!("Worker started");
		loop {
			match shutdown_rx.try_recv() {
				Err(TryRecvError::Empty) => {}
				_ => break,
			}

			let busy = match self.work_once().await {
				Ok(busy) => busy,
				Err(e) => {
					warn!(error = %e, "worker poll failed, backing off");
					false
				}
			};
			if busy {
				continue;
			}

			tokio::select! {
				_ = tokio::time::sleep(self.options.backoff()) => {}
				_ = shutdown_rx.recv() => break,
			}
		}
		info!("Worker stopped");
	}

	/// One poll: claim and run a job, or, when none is claimable, advance
	/// due cron definitions. Returns `true` when anything was done.
	pub async fn work_once(&self) -> Result<bool> {
		if let Some(job) = self
			.queue
			.get_and_mark_job_as_processing(&self.job_type)
			.await?
		{
			self.process(job).await?;
			return Ok(true);
		}

		if self.options.run_scheduler {
			let runs = CronScheduler::new(self.queue.clone()).run_all_due().await?;
			return Ok(!runs.is_empty());
		}
		Ok(false)
	}

	#[instrument(skip(self, job), fields(job_id = job.id))]
	async fn process(&self, job: Job) -> Result<()> {
		debug!("Running job");
		if let Some(callback) = &self.options.on_processing {
			callback(&job);
		}

		let outcome = AssertUnwindSafe(self.handler.handle(job.clone()))
			.catch_unwind()
			.await
			.map_err(|panic| panic_message(&*panic))
			.and_then(|result| result.map_err(|e| e.to_string()));

		match outcome {
			Ok(()) => {
				self.queue.mark_job_as_done(job.id).await?;
				debug!("Job completed");
				if let Some(callback) = &self.options.on_completed {
					callback(&job);
				}
			}
			Err(message) => {
				warn!(error = %message, "Job failed");
				self.queue.mark_job_as_failed(job.id, &message).await?;
				if let Some(callback) = &self.options.on_failed {
					callback(&job, &message);
				}
			}
		}
		Ok(())
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	let detail = panic
		.downcast_ref::<&str>()
		.map(|s| s.to_string())
		.or_else(|| panic.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic payload".to_string());
	format!("handler panicked: {detail}")
}

/// Controls a running worker.
pub struct WorkerHandle {
	job_type: String,
	shutdown_tx: broadcast::Sender<()>,
	handle: JoinHandle<()>,
}

impl WorkerHandle {
	pub fn job_type(&self) -> &str {
		&self.job_type
	}

	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	/// Ask the loop to exit and wait for it. An in-flight handler runs to
	/// completion and its outcome is recorded before this returns.
	pub async fn stop(self) {
		let _ = self.shutdown_tx.send(());
		if let Err(e) = self.handle.await {
			warn!(job_type = %self.job_type, error = %e, "worker task ended abnormally");
		}
	}
}
