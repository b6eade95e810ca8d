// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Payload encoding.
//!
//! The queue serializes payloads once, on insert, and stores the bytes
//! verbatim. Reads hand those bytes back untouched; decoding is up to the
//! handler.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SerializerError(pub String);

/// A reversible codec between payload values and stored bytes.
pub trait Serializer: Send + Sync {
	fn serialize(&self, value: &Value) -> Result<Vec<u8>, SerializerError>;
	fn deserialize(&self, bytes: &[u8]) -> Result<Value, SerializerError>;
}

/// Compact JSON, the default codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
	fn serialize(&self, value: &Value) -> Result<Vec<u8>, SerializerError> {
		serde_json::to_vec(value).map_err(|e| SerializerError(e.to_string()))
	}

	fn deserialize(&self, bytes: &[u8]) -> Result<Value, SerializerError> {
		serde_json::from_slice(bytes).map_err(|e| SerializerError(e.to_string()))
	}
}
