// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use tracing::{info, instrument, warn};

use loom_queue::{CronScheduler, Job, JobFilter, JobStatus, Queue, ScheduledJob};
use loom_queue_config::QueueServiceConfig;

use crate::wiring;

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Enqueue a job
	Add {
		job_type: String,
		/// JSON payload
		#[arg(long, default_value = "{}")]
		data: String,
		/// Seconds before the job becomes claimable
		#[arg(long)]
		delay_secs: Option<u64>,
	},
	/// Create or update the cron definition for a job type
	Schedule {
		job_type: String,
		/// Five-field cron expression, evaluated in UTC
		cron_expression: String,
	},
	/// Remove the cron definition for a job type
	Unschedule { job_type: String },
	/// Show one job
	Get { id: i64 },
	/// Count jobs
	Count {
		#[arg(long = "type")]
		job_type: Option<String>,
		#[arg(long, value_parser = parse_status)]
		status: Option<JobStatus>,
	},
	/// List jobs in id order
	List {
		#[arg(long = "type")]
		job_type: Option<String>,
		#[arg(long, value_parser = parse_status)]
		status: Option<JobStatus>,
		#[arg(long, default_value_t = 50)]
		limit: u32,
		#[arg(long, default_value_t = 0)]
		offset: u32,
	},
	/// List distinct job types
	Types,
	/// List cron definitions
	Scheduled,
	/// Run one maintenance pass and print what it did
	Maintain,
	/// Run maintenance and the cron scheduler until interrupted
	Serve,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
	s.parse()
}

fn filter(job_type: Option<String>, status: Option<JobStatus>) -> JobFilter {
	JobFilter {
		job_type,
		status,
	}
}

#[derive(Debug, Serialize)]
struct JobView {
	id: i64,
	#[serde(rename = "type")]
	job_type: String,
	status: JobStatus,
	data: serde_json::Value,
	created_at: DateTime<Utc>,
	not_before: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	failed_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

impl JobView {
	fn new(queue: &Queue, job: Job) -> Self {
		// Payloads that are not valid for the serializer are shown as text.
		let data = queue
			.options()
			.serializer
			.deserialize(&job.data)
			.unwrap_or_else(|_| {
				serde_json::Value::String(String::from_utf8_lossy(&job.data).into_owned())
			});
		Self {
			id: job.id,
			job_type: job.job_type,
			status: job.status,
			data,
			created_at: job.created_at,
			not_before: job.not_before,
			failed_at: job.failed_at,
			error: job.error,
		}
	}
}

#[derive(Debug, Serialize)]
struct ScheduledJobView {
	id: i64,
	#[serde(rename = "type")]
	job_type: String,
	status: String,
	cron_expression: String,
	/// `None` while the definition is due immediately.
	next_run_at: Option<DateTime<Utc>>,
	created_at: DateTime<Utc>,
}

impl From<ScheduledJob> for ScheduledJobView {
	fn from(job: ScheduledJob) -> Self {
		Self {
			id: job.id,
			job_type: job.job_type,
			status: job.status.to_string(),
			cron_expression: job.cron_expression,
			next_run_at: (job.next_run_at != DateTime::<Utc>::UNIX_EPOCH)
				.then_some(job.next_run_at),
			created_at: job.created_at,
		}
	}
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

pub async fn run(command: Command, config: &QueueServiceConfig) -> anyhow::Result<()> {
	let serve = matches!(command, Command::Serve);
	let queue = wiring::open_queue(config, serve).await?;

	let result = execute(&queue, command, config).await;

	queue.close().await;
	result
}

async fn execute(
	queue: &Queue,
	command: Command,
	config: &QueueServiceConfig,
) -> anyhow::Result<()> {
	match command {
		Command::Add {
			job_type,
			data,
			delay_secs,
		} => {
			let payload: serde_json::Value =
				serde_json::from_str(&data).context("--data must be valid JSON")?;
			let id = match delay_secs {
				Some(secs) => {
					queue
						.add_delayed(&job_type, &payload, Duration::from_secs(secs))
						.await?
				}
				None => queue.add(&job_type, &payload).await?,
			};
			println!("{id}");
		}
		Command::Schedule {
			job_type,
			cron_expression,
		} => {
			let id = queue.schedule(&job_type, &cron_expression).await?;
			println!("{id}");
		}
		Command::Unschedule { job_type } => {
			if !queue.unschedule(&job_type).await? {
				anyhow::bail!("no scheduled job for type '{job_type}'");
			}
		}
		Command::Get { id } => {
			let job = queue
				.get_job_by_id(id)
				.await?
				.with_context(|| format!("job {id} not found"))?;
			print_json(&JobView::new(queue, job))?;
		}
		Command::Count { job_type, status } => {
			println!("{}", queue.count_jobs(&filter(job_type, status)).await?);
		}
		Command::List {
			job_type,
			status,
			limit,
			offset,
		} => {
			let jobs = queue
				.list_jobs(&filter(job_type, status), limit, offset)
				.await?;
			let views: Vec<JobView> = jobs.into_iter().map(|j| JobView::new(queue, j)).collect();
			print_json(&views)?;
		}
		Command::Types => {
			let mut types = queue.get_job_types().await?;
			types.sort();
			for job_type in types {
				println!("{job_type}");
			}
		}
		Command::Scheduled => {
			let views: Vec<ScheduledJobView> = queue
				.get_scheduled_jobs()
				.await?
				.into_iter()
				.map(Into::into)
				.collect();
			print_json(&views)?;
		}
		Command::Maintain => {
			let report = queue.maintenance().run_once().await;
			println!(
				"requeued={} scheduled_released={} done_removed={} failed_removed={}",
				show(report.requeued),
				show(report.scheduled_released),
				show(report.done_removed),
				show(report.failed_removed)
			);
			if !report.is_complete() {
				anyhow::bail!("one or more maintenance steps failed");
			}
		}
		Command::Serve => serve_until_interrupted(queue, config).await?,
	}
	Ok(())
}

fn show(count: Option<u64>) -> String {
	count.map_or_else(|| "error".to_string(), |c| c.to_string())
}

/// Drive the cron scheduler on the worker poll cadence while the queue's
/// maintenance task runs in the background.
#[instrument(skip_all)]
async fn serve_until_interrupted(queue: &Queue, config: &QueueServiceConfig) -> anyhow::Result<()> {
	let scheduler = CronScheduler::new(queue.clone());
	let poll = wiring::worker_options(&config.queue);
	info!(
		poll_interval = ?poll.poll_interval,
		maintenance_interval = ?queue.options().maintenance_interval,
		"queue service running"
	);

	loop {
		match scheduler.run_all_due().await {
			Ok(runs) => {
				for run in runs {
					info!(
						job_type = %run.job_type,
						job_id = run.job_id,
						"materialized scheduled job"
					);
				}
			}
			Err(e) => warn!(error = %e, "scheduler pass failed"),
		}

		tokio::select! {
			_ = tokio::time::sleep(poll.backoff()) => {}
			_ = tokio::signal::ctrl_c() => {
				info!("interrupt received, shutting down");
				break;
			}
		}
	}
	Ok(())
}
