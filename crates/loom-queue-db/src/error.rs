// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_queue_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for StoreError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::Sqlx(sqlx::Error::ColumnDecode { index, source }) => {
				StoreError::Corrupt(format!("column {index}: {source}"))
			}
			DbError::Sqlx(e) => StoreError::Unavailable(e.to_string()),
			DbError::Internal(message) => StoreError::Corrupt(message),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_internal_maps_to_corrupt() {
		let err: StoreError = DbError::Internal("bad status".to_string()).into();
		assert!(matches!(err, StoreError::Corrupt(m) if m == "bad status"));
	}

	#[test]
	fn test_sqlx_maps_to_unavailable() {
		let err: StoreError = DbError::Sqlx(sqlx::Error::PoolTimedOut).into();
		assert!(matches!(err, StoreError::Unavailable(_)));
	}
}
