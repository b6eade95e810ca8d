// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns resolved configuration into a running store, queue and subscriber.

use std::sync::Arc;

use loom_queue::{Queue, QueueOptions, QueueStore, WorkerOptions};
use loom_queue_config::{DatabaseConfig, LogFormat, LoggingConfig, QueueConfig, QueueServiceConfig};
use loom_queue_db::{create_pool, PoolSettings, SqliteQueueStore};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn queue_options(config: &QueueConfig) -> QueueOptions {
	QueueOptions::default()
		.timeout(config.timeout())
		.maintenance_interval(config.maintenance_interval())
		.remove_done_jobs_older_than(config.remove_done_jobs_older_than())
		.remove_failed_jobs_older_than(config.remove_failed_jobs_older_than())
		.on_processing_jobs_requeued(|count| {
			if count > 0 {
				tracing::warn!(count, "requeued jobs whose lease timed out");
			}
		})
}

/// Poll timing for anything that drives the cron scheduler from this binary.
pub fn worker_options(config: &QueueConfig) -> WorkerOptions {
	WorkerOptions::default()
		.poll_interval(config.poll_interval())
		.poll_jitter(config.poll_jitter())
}

pub fn pool_settings(config: &DatabaseConfig) -> PoolSettings {
	PoolSettings {
		busy_timeout: config.busy_timeout(),
		max_connections: config.max_connections,
	}
}

pub async fn open_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn QueueStore>> {
	let pool = create_pool(&config.url, pool_settings(config)).await?;
	Ok(Arc::new(SqliteQueueStore::new(pool)))
}

/// Open the queue. Maintenance only runs when `with_maintenance` is set, so
/// one-shot commands do not leave a timer behind.
pub async fn open_queue(
	config: &QueueServiceConfig,
	with_maintenance: bool,
) -> anyhow::Result<Queue> {
	let store = open_store(&config.database).await?;
	let options = queue_options(&config.queue);
	let queue = if with_maintenance {
		Queue::open(store, options).await?
	} else {
		Queue::open_without_maintenance(store, options).await?
	};
	Ok(queue)
}

pub fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn test_queue_options_follow_config() {
		let config = QueueConfig {
			timeout_secs: 10,
			maintenance_interval_secs: 5,
			remove_done_jobs_older_than_secs: 100,
			remove_failed_jobs_older_than_secs: 200,
			..Default::default()
		};
		let options = queue_options(&config);
		assert_eq!(options.timeout, Duration::from_secs(10));
		assert_eq!(options.maintenance_interval, Duration::from_secs(5));
		assert_eq!(options.remove_done_jobs_older_than, Duration::from_secs(100));
		assert_eq!(options.remove_failed_jobs_older_than, Duration::from_secs(200));
		assert!(options.on_processing_jobs_requeued.is_some());
	}

	#[test]
	fn test_worker_options_follow_config() {
		let config = QueueConfig {
			poll_interval_ms: 250,
			poll_jitter_ms: 0,
			..Default::default()
		};
		let options = worker_options(&config);
		assert_eq!(options.poll_interval, Duration::from_millis(250));
		assert_eq!(options.poll_jitter, Duration::ZERO);
	}

	#[test]
	fn test_pool_settings_follow_config() {
		let settings = pool_settings(&DatabaseConfig::default());
		assert_eq!(settings, PoolSettings::default());
	}

	#[tokio::test]
	async fn test_open_queue_on_file_database() {
		let dir = tempfile::tempdir().unwrap();
		let config = QueueServiceConfig {
			database: DatabaseConfig {
				url: format!("sqlite://{}", dir.path().join("q.db").display()),
				..Default::default()
			},
			..Default::default()
		};

		let queue = open_queue(&config, false).await.unwrap();
		let id = queue.add("t", &serde_json::json!({})).await.unwrap();
		assert!(queue.get_job_by_id(id).await.unwrap().is_some());
		queue.close().await;
	}
}
