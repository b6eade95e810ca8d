// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `loom-queue`: enqueue, inspect and maintain a Loom job queue.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod wiring;

/// Loom job queue command-line tool.
#[derive(Parser, Debug)]
#[command(name = "loom-queue", about = "Loom persistent job queue", version)]
struct Args {
	/// Config file (defaults to /etc/loom/queue.toml)
	#[arg(long, global = true, env = "LOOM_QUEUE_CONFIG")]
	config: Option<PathBuf>,

	/// Override the database URL from configuration
	#[arg(long, global = true)]
	database_url: Option<String>,

	#[command(subcommand)]
	command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let mut config = match &args.config {
		Some(path) => loom_queue_config::load_config_with_file(path)?,
		None => loom_queue_config::load_config()?,
	};
	if let Some(url) = args.database_url {
		config.database.url = url;
	}

	wiring::init_tracing(&config.logging);
	tracing::info!(
		database = %config.database.url,
		timeout_secs = config.queue.timeout_secs,
		maintenance_interval_secs = config.queue.maintenance_interval_secs,
		log_format = %config.logging.format,
		"Queue configuration loaded"
	);

	commands::run(args.command, &config).await
}
