// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a [`crate::QueueStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The store could not complete the operation: I/O failure, lock
	/// timeout, busy database or a closed connection.
	#[error("store unavailable: {0}")]
	Unavailable(String),

	/// A stored row could not be decoded into the data model.
	#[error("corrupt record: {0}")]
	Corrupt(String),
}
