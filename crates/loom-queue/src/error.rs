// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for queue operations.

use std::time::Duration;

use loom_queue_core::StoreError;
use thiserror::Error;

use crate::serializer::SerializerError;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced to callers of the queue.
///
/// Handler failures are deliberately absent: they are recorded on the job and
/// never leave the worker loop.
#[derive(Debug, Error)]
pub enum QueueError {
	/// The cron expression passed to `schedule` cannot be parsed.
	#[error("invalid schedule: {0}")]
	InvalidSchedule(String),

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("serialization error: {0}")]
	Serialization(String),

	/// Transaction, lock or I/O failure in the store.
	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("queue did not drain within {0:?}")]
	DrainTimeout(Duration),
}

impl From<SerializerError> for QueueError {
	fn from(err: SerializerError) -> Self {
		QueueError::Serialization(err.to_string())
	}
}

impl From<serde_json::Error> for QueueError {
	fn from(err: serde_json::Error) -> Self {
		QueueError::Serialization(err.to_string())
	}
}
