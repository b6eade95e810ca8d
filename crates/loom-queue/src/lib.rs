// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistent, crash-tolerant job queue for Loom.
//!
//! Producers enqueue one-off or cron-recurring jobs through [`Queue`]; any
//! number of [`Worker`]s, in this process or others, claim and run them.
//! Every piece of coordination goes through the shared [`QueueStore`]:
//!
//! - claims are atomic, so a job has at most one active claimant;
//! - the [`MaintenanceCycle`] requeues jobs whose lease timed out and purges
//!   old `Done`/`Failed` records;
//! - the [`CronScheduler`] turns due [`ScheduledJob`]s into ordinary jobs and
//!   is driven by idle workers, so no dedicated scheduler process is needed.
//!
//! Execution is at-least-once: a job whose worker crashed is handed out again
//! after the lease timeout.

pub mod drain;
pub mod error;
pub mod maintenance;
pub mod options;
pub mod queue;
pub mod schedule;
pub mod scheduler;
pub mod serializer;
pub mod worker;

pub use drain::run_until_drained;
pub use error::{QueueError, Result};
pub use maintenance::{MaintenanceCycle, MaintenanceHandle, MaintenanceReport};
pub use options::{CountCallback, QueueOptions};
pub use queue::Queue;
pub use schedule::{next_run_after, validate_cron_expression};
pub use scheduler::{CronScheduler, ScheduledRun};
pub use serializer::{JsonSerializer, Serializer, SerializerError};
pub use worker::{FailedCallback, JobCallback, JobHandler, Worker, WorkerHandle, WorkerOptions};

pub use loom_queue_core::{
	Job, JobFilter, JobStatus, NewJob, QueueStore, ScheduledJob, ScheduledJobStatus, StoreError,
};
