// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recurring job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledJobStatus {
	Idle,
	Processing,
}

impl ScheduledJobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ScheduledJobStatus::Idle => "idle",
			ScheduledJobStatus::Processing => "processing",
		}
	}
}

impl fmt::Display for ScheduledJobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ScheduledJobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"idle" => Ok(ScheduledJobStatus::Idle),
			"processing" => Ok(ScheduledJobStatus::Processing),
			_ => Err(format!("unknown scheduled job status: {s}")),
		}
	}
}

/// A cron-driven definition that materializes ordinary jobs of `job_type`.
///
/// There is at most one definition per `job_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
	pub id: i64,
	pub job_type: String,
	pub status: ScheduledJobStatus,
	pub cron_expression: String,
	/// Due at or after this instant. The Unix epoch means "due immediately".
	pub next_run_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
	pub fn is_due(&self, now: DateTime<Utc>) -> bool {
		self.status == ScheduledJobStatus::Idle && self.next_run_at <= now
	}
}
