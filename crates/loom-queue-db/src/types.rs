// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timestamp encoding. Every instant is stored as INTEGER milliseconds since
//! the Unix epoch.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{DbError, Result};

pub fn to_millis(instant: DateTime<Utc>) -> i64 {
	instant.timestamp_millis()
}

pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
	Utc.timestamp_millis_opt(millis)
		.single()
		.ok_or_else(|| DbError::Internal(format!("timestamp out of range: {millis}")))
}
