// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The mergeable, partially-specified form of the whole configuration.

use serde::Deserialize;

use crate::sections::{DatabaseConfigLayer, LoggingConfigLayer, QueueConfigLayer};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct QueueServiceConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub queue: Option<QueueConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl QueueServiceConfigLayer {
	/// Overlay `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: QueueServiceConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.queue, other.queue, QueueConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(base), Some(other)) => merge(base, other),
		(None, Some(other)) => *base = Some(other),
		(_, None) => {}
	}
}
