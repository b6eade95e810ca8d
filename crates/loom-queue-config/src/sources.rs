// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::QueueServiceConfigLayer;
use crate::sections::{DatabaseConfigLayer, LogFormat, LoggingConfigLayer, QueueConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<QueueServiceConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<QueueServiceConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(QueueServiceConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/queue.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<QueueServiceConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(QueueServiceConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: QueueServiceConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: LOOM_QUEUE_<SECTION>_<FIELD>
pub struct EnvSource {
	lookup: Lookup,
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}
}

impl EnvSource {
	/// Read variables through `lookup` instead of the process environment.
	pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn u64(&self, name: &str) -> Result<Option<u64>, ConfigError> {
		self.parsed(name, "u64")
	}

	fn u32(&self, name: &str) -> Result<Option<u32>, ConfigError> {
		self.parsed(name, "u32")
	}

	fn parsed<T: std::str::FromStr>(
		&self,
		name: &str,
		kind: &str,
	) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {kind} value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn database(&self) -> Result<DatabaseConfigLayer, ConfigError> {
		Ok(DatabaseConfigLayer {
			url: self.var("LOOM_QUEUE_DATABASE_URL"),
			busy_timeout_ms: self.u64("LOOM_QUEUE_DATABASE_BUSY_TIMEOUT_MS")?,
			max_connections: self.u32("LOOM_QUEUE_DATABASE_MAX_CONNECTIONS")?,
		})
	}

	fn queue(&self) -> Result<QueueConfigLayer, ConfigError> {
		Ok(QueueConfigLayer {
			timeout_secs: self.u64("LOOM_QUEUE_QUEUE_TIMEOUT_SECS")?,
			maintenance_interval_secs: self.u64("LOOM_QUEUE_QUEUE_MAINTENANCE_INTERVAL_SECS")?,
			remove_done_jobs_older_than_secs: self
				.u64("LOOM_QUEUE_QUEUE_REMOVE_DONE_JOBS_OLDER_THAN_SECS")?,
			remove_failed_jobs_older_than_secs: self
				.u64("LOOM_QUEUE_QUEUE_REMOVE_FAILED_JOBS_OLDER_THAN_SECS")?,
			poll_interval_ms: self.u64("LOOM_QUEUE_QUEUE_POLL_INTERVAL_MS")?,
			poll_jitter_ms: self.u64("LOOM_QUEUE_QUEUE_POLL_JITTER_MS")?,
		})
	}

	fn logging(&self) -> Result<LoggingConfigLayer, ConfigError> {
		let format = match self.var("LOOM_QUEUE_LOGGING_FORMAT") {
			Some(v) => Some(v.parse::<LogFormat>().map_err(|message| {
				ConfigError::InvalidValue {
					key: "LOOM_QUEUE_LOGGING_FORMAT".to_string(),
					message,
				}
			})?),
			None => None,
		};

		Ok(LoggingConfigLayer {
			level: self.var("LOOM_QUEUE_LOGGING_LEVEL"),
			format,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<QueueServiceConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(QueueServiceConfigLayer {
			database: Some(self.database()?),
			queue: Some(self.queue()?),
			logging: Some(self.logging()?),
		})
	}
}
