// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Engine options and maintenance callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::serializer::{JsonSerializer, Serializer};

/// Receives the number of rows a maintenance step affected.
pub type CountCallback = Arc<dyn Fn(u64) + Send + Sync>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REMOVE_DONE_JOBS_OLDER_THAN: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_REMOVE_FAILED_JOBS_OLDER_THAN: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Clone)]
pub struct QueueOptions {
	/// Lease duration before a `Processing` job is requeued.
	pub timeout: Duration,
	pub maintenance_interval: Duration,
	pub remove_done_jobs_older_than: Duration,
	pub remove_failed_jobs_older_than: Duration,
	pub serializer: Arc<dyn Serializer>,
	pub on_done_jobs_removed: Option<CountCallback>,
	pub on_failed_jobs_removed: Option<CountCallback>,
	pub on_processing_jobs_requeued: Option<CountCallback>,
}

impl Default for QueueOptions {
	fn default() -> Self {
		Self {
			timeout: DEFAULT_TIMEOUT,
			maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
			remove_done_jobs_older_than: DEFAULT_REMOVE_DONE_JOBS_OLDER_THAN,
			remove_failed_jobs_older_than: DEFAULT_REMOVE_FAILED_JOBS_OLDER_THAN,
			serializer: Arc::new(JsonSerializer),
			on_done_jobs_removed: None,
			on_failed_jobs_removed: None,
			on_processing_jobs_requeued: None,
		}
	}
}

impl QueueOptions {
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn maintenance_interval(mut self, interval: Duration) -> Self {
		self.maintenance_interval = interval;
		self
	}

	pub fn remove_done_jobs_older_than(mut self, age: Duration) -> Self {
		self.remove_done_jobs_older_than = age;
		self
	}

	pub fn remove_failed_jobs_older_than(mut self, age: Duration) -> Self {
		self.remove_failed_jobs_older_than = age;
		self
	}

	pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
		self.serializer = Arc::new(serializer);
		self
	}

	pub fn on_done_jobs_removed(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
		self.on_done_jobs_removed = Some(Arc::new(callback));
		self
	}

	pub fn on_failed_jobs_removed(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
		self.on_failed_jobs_removed = Some(Arc::new(callback));
		self
	}

	pub fn on_processing_jobs_requeued(
		mut self,
		callback: impl Fn(u64) + Send + Sync + 'static,
	) -> Self {
		self.on_processing_jobs_requeued = Some(Arc::new(callback));
		self
	}
}

impl fmt::Debug for QueueOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueueOptions")
			.field("timeout", &self.timeout)
			.field("maintenance_interval", &self.maintenance_interval)
			.field("remove_done_jobs_older_than", &self.remove_done_jobs_older_than)
			.field("remove_failed_jobs_older_than", &self.remove_failed_jobs_older_than)
			.field("on_done_jobs_removed", &self.on_done_jobs_removed.is_some())
			.field("on_failed_jobs_removed", &self.on_failed_jobs_removed.is_some())
			.field("on_processing_jobs_requeued", &self.on_processing_jobs_requeued.is_some())
			.finish_non_exhaustive()
	}
}
