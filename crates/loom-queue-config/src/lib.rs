// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the Loom job queue service.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`LOOM_QUEUE_*`)
//!
//! # Usage
//!
//! ```ignore
//! use loom_queue_config::load_config;
//!
//! let config = load_config()?;
//! println!("queue database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::QueueServiceConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::debug;

/// Fully resolved queue service configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueServiceConfig {
	pub database: DatabaseConfig,
	pub queue: QueueConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LOOM_QUEUE_*`)
/// 2. Config file (`/etc/loom/queue.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<QueueServiceConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource::default()),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<QueueServiceConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::default()),
	])
}

/// Merge `sources` in precedence order and finalize the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<QueueServiceConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = QueueServiceConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: QueueServiceConfigLayer) -> Result<QueueServiceConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let queue = layer.queue.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&database, &queue)?;

	Ok(QueueServiceConfig {
		database,
		queue,
		logging,
	})
}

/// Upper bound on `queue.maintenance_interval_secs`: one year.
pub const MAX_MAINTENANCE_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

fn validate_config(database: &DatabaseConfig, queue: &QueueConfig) -> Result<(), ConfigError> {
	if database.max_connections == 0 {
		return Err(ConfigError::Validation(
			"database.max_connections must be at least 1".to_string(),
		));
	}
	if queue.timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"queue.timeout_secs must be greater than zero".to_string(),
		));
	}
	if queue.maintenance_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"queue.maintenance_interval_secs must be greater than zero".to_string(),
		));
	}
	if queue.maintenance_interval_secs > MAX_MAINTENANCE_INTERVAL_SECS {
		return Err(ConfigError::Validation(format!(
			"queue.maintenance_interval_secs must be at most {MAX_MAINTENANCE_INTERVAL_SECS}"
		)));
	}
	Ok(())
}
