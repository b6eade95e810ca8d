// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom job queue.
//!
//! This crate holds the data model shared by every queue component and the
//! [`QueueStore`] contract that a durable backend must satisfy. It has no
//! knowledge of any particular database.

pub mod error;
pub mod job;
pub mod scheduled_job;
pub mod store;

pub use error::{Result, StoreError};
pub use job::{Job, JobFilter, JobStatus, NewJob};
pub use scheduled_job::{ScheduledJob, ScheduledJobStatus};
pub use store::QueueStore;
