//! # pricewatcher
//!
//! Decides which price watchers are due for a check and spreads them over
//! per-domain job queues that external workers drain.
//!
//! Provides the durable watcher store (SQLite), the domain registry, the
//! in-memory queue manager, the periodic scheduler, and the HTTP surface
//! workers talk to.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
