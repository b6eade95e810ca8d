// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron expression parsing and next run calculation.
//!
//! All schedules are evaluated in UTC.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::error::{QueueError, Result};

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
///
/// We add "0" for seconds (run at :00 of each minute) and "*" for year (any year).
fn convert_to_cron_crate_format(expression: &str) -> String {
	let field_count = expression.split_whitespace().count();
	if field_count == 5 {
		format!("0 {} *", expression.trim())
	} else {
		// 6 or 7 fields are already in extended format; anything else is left
		// for the parser to reject.
		expression.to_string()
	}
}

fn parse(expression: &str) -> Result<Schedule> {
	Schedule::from_str(&convert_to_cron_crate_format(expression))
		.map_err(|e| QueueError::InvalidSchedule(format!("{expression:?}: {e}")))
}

/// Validate a cron expression without calculating a next run.
pub fn validate_cron_expression(expression: &str) -> Result<()> {
	parse(expression).map(|_| ())
}

/// The first trigger instant strictly after `after`.
///
/// # Errors
///
/// Returns [`QueueError::InvalidSchedule`] if the expression is malformed or
/// never fires again.
pub fn next_run_after(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
	parse(expression)?.after(&after).next().ok_or_else(|| {
		QueueError::InvalidSchedule(format!("{expression:?} has no run after {after}"))
	})
}
