// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Queue engine and worker timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;
const DEFAULT_REMOVE_DONE_JOBS_OLDER_THAN_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_REMOVE_FAILED_JOBS_OLDER_THAN_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_POLL_JITTER_MS: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct QueueConfigLayer {
	pub timeout_secs: Option<u64>,
	pub maintenance_interval_secs: Option<u64>,
	pub remove_done_jobs_older_than_secs: Option<u64>,
	pub remove_failed_jobs_older_than_secs: Option<u64>,
	pub poll_interval_ms: Option<u64>,
	pub poll_jitter_ms: Option<u64>,
}

impl QueueConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
		if other.maintenance_interval_secs.is_some() {
			self.maintenance_interval_secs = other.maintenance_interval_secs;
		}
		if other.remove_done_jobs_older_than_secs.is_some() {
			self.remove_done_jobs_older_than_secs = other.remove_done_jobs_older_than_secs;
		}
		if other.remove_failed_jobs_older_than_secs.is_some() {
			self.remove_failed_jobs_older_than_secs = other.remove_failed_jobs_older_than_secs;
		}
		if other.poll_interval_ms.is_some() {
			self.poll_interval_ms = other.poll_interval_ms;
		}
		if other.poll_jitter_ms.is_some() {
			self.poll_jitter_ms = other.poll_jitter_ms;
		}
	}

	pub fn finalize(self) -> QueueConfig {
		QueueConfig {
			timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
			maintenance_interval_secs: self
				.maintenance_interval_secs
				.unwrap_or(DEFAULT_MAINTENANCE_INTERVAL_SECS),
			remove_done_jobs_older_than_secs: self
				.remove_done_jobs_older_than_secs
				.unwrap_or(DEFAULT_REMOVE_DONE_JOBS_OLDER_THAN_SECS),
			remove_failed_jobs_older_than_secs: self
				.remove_failed_jobs_older_than_secs
				.unwrap_or(DEFAULT_REMOVE_FAILED_JOBS_OLDER_THAN_SECS),
			poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
			poll_jitter_ms: self.poll_jitter_ms.unwrap_or(DEFAULT_POLL_JITTER_MS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
	pub timeout_secs: u64,
	pub maintenance_interval_secs: u64,
	pub remove_done_jobs_older_than_secs: u64,
	pub remove_failed_jobs_older_than_secs: u64,
	pub poll_interval_ms: u64,
	pub poll_jitter_ms: u64,
}

impl QueueConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	pub fn maintenance_interval(&self) -> Duration {
		Duration::from_secs(self.maintenance_interval_secs)
	}

	pub fn remove_done_jobs_older_than(&self) -> Duration {
		Duration::from_secs(self.remove_done_jobs_older_than_secs)
	}

	pub fn remove_failed_jobs_older_than(&self) -> Duration {
		Duration::from_secs(self.remove_failed_jobs_older_than_secs)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn poll_jitter(&self) -> Duration {
		Duration::from_millis(self.poll_jitter_ms)
	}
}

impl Default for QueueConfig {
	fn default() -> Self {
		QueueConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_default_values() {
		let config = QueueConfig::default();
		assert_eq!(config.timeout(), Duration::from_secs(1800));
		assert_eq!(config.maintenance_interval(), Duration::from_secs(60));
		assert_eq!(config.remove_done_jobs_older_than(), Duration::from_secs(604_800));
		assert_eq!(config.remove_failed_jobs_older_than(), Duration::from_secs(2_592_000));
		assert_eq!(config.poll_interval(), Duration::from_millis(1000));
		assert_eq!(config.poll_jitter(), Duration::from_millis(100));
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let toml_str = r#"
timeout_secs = 600
poll_interval_ms = 250
"#;
		let layer: QueueConfigLayer = toml::from_str(toml_str).unwrap();
		assert_eq!(layer.timeout_secs, Some(600));
		assert_eq!(layer.poll_interval_ms, Some(250));
		assert!(layer.maintenance_interval_secs.is_none());

		let config = layer.finalize();
		assert_eq!(config.timeout_secs, 600);
		assert_eq!(config.maintenance_interval_secs, 60);
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = QueueConfig {
			timeout_secs: 5,
			..Default::default()
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: QueueConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}

	fn arb_layer() -> impl Strategy<Value = QueueConfigLayer> {
		(
			proptest::option::of(any::<u64>()),
			proptest::option::of(any::<u64>()),
			proptest::option::of(any::<u64>()),
			proptest::option::of(any::<u64>()),
			proptest::option::of(any::<u64>()),
			proptest::option::of(any::<u64>()),
		)
			.prop_map(|(a, b, c, d, e, f)| QueueConfigLayer {
				timeout_secs: a,
				maintenance_interval_secs: b,
				remove_done_jobs_older_than_secs: c,
				remove_failed_jobs_older_than_secs: d,
				poll_interval_ms: e,
				poll_jitter_ms: f,
			})
	}

	proptest! {
		#[test]
		fn merge_with_empty_is_identity(layer in arb_layer()) {
			let mut merged = layer.clone();
			merged.merge(QueueConfigLayer::default());
			prop_assert_eq!(&merged, &layer);

			let mut onto_empty = QueueConfigLayer::default();
			onto_empty.merge(layer.clone());
			prop_assert_eq!(onto_empty, layer);
		}

		#[test]
		fn merge_is_associative(a in arb_layer(), b in arb_layer(), c in arb_layer()) {
			let mut left = a.clone();
			left.merge(b.clone());
			left.merge(c.clone());

			let mut bc = b;
			bc.merge(c);
			let mut right = a;
			right.merge(bc);

			prop_assert_eq!(left, right);
		}
	}
}
