// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-off job types.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a [`Job`].
///
/// `Pending -> Processing -> {Done | Failed}`, with `Processing -> Pending`
/// reserved for the timeout requeue performed by maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Pending,
	Processing,
	Done,
	Failed,
}

impl JobStatus {
	pub const ALL: [JobStatus; 4] = [
		JobStatus::Pending,
		JobStatus::Processing,
		JobStatus::Done,
		JobStatus::Failed,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Processing => "processing",
			JobStatus::Done => "done",
			JobStatus::Failed => "failed",
		}
	}

	/// Terminal states are the only ones retention may purge.
	pub fn is_terminal(&self) -> bool {
		matches!(self, JobStatus::Done | JobStatus::Failed)
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"pending" => Ok(JobStatus::Pending),
			"processing" => Ok(JobStatus::Processing),
			"done" => Ok(JobStatus::Done),
			"failed" => Ok(JobStatus::Failed),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

/// A unit of one-off work as stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
	pub id: i64,
	pub job_type: String,
	/// Serialized payload, exactly as produced by the queue's serializer.
	pub data: Vec<u8>,
	pub status: JobStatus,
	/// FIFO ordering key; while `Processing` it also marks the lease start.
	pub created_at: DateTime<Utc>,
	/// Earliest instant at which the job may be claimed.
	pub not_before: DateTime<Utc>,
	pub failed_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
}

impl Job {
	/// Decode the payload as JSON.
	///
	/// Only meaningful when the queue uses the default JSON serializer.
	pub fn json_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
		serde_json::from_slice(&self.data)
	}

	/// `failed_at` and `error` are set iff the job is `Failed`.
	pub fn is_consistent(&self) -> bool {
		let failure_recorded = self.failed_at.is_some() && self.error.is_some();
		let failure_absent = self.failed_at.is_none() && self.error.is_none();
		match self.status {
			JobStatus::Failed => failure_recorded,
			_ => failure_absent,
		}
	}
}

/// A job waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
	pub job_type: String,
	pub data: Vec<u8>,
	pub created_at: DateTime<Utc>,
	pub not_before: DateTime<Utc>,
}

impl NewJob {
	/// A job that becomes claimable as soon as it is inserted.
	pub fn immediate(job_type: impl Into<String>, data: Vec<u8>, now: DateTime<Utc>) -> Self {
		Self {
			job_type: job_type.into(),
			data,
			created_at: now,
			not_before: now,
		}
	}
}

/// Optional constraints for counting and listing jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
	pub job_type: Option<String>,
	pub status: Option<JobStatus>,
}

impl JobFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
		self.job_type = Some(job_type.into());
		self
	}

	pub fn status(mut self, status: JobStatus) -> Self {
		self.status = Some(status);
		self
	}
}
