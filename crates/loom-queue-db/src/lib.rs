// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the Loom job queue.
//!
//! [`SqliteQueueStore`] implements [`loom_queue_core::QueueStore`]. Claims are
//! single `UPDATE ... RETURNING` statements, so SQLite's write lock is the only
//! thing standing between concurrent workers, whether they share a pool or
//! live in different processes.

pub mod error;
pub mod job;
pub mod pool;
pub mod scheduled_job;
pub mod schema;
pub mod store;
pub mod testing;
pub mod types;

pub use error::{DbError, Result};
pub use pool::{create_pool, PoolSettings};
pub use schema::run_migrations;
pub use store::SqliteQueueStore;
