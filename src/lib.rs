//! # tradewind-worker
//!
//! Postgres-backed work queue engine for the Tradewind commerce platform.
//!
//! Provides priority-ordered exclusive allocation, retry clones with a
//! decrementing budget, scheduled (delayed) execution, and a
//! NOTIFY-assisted polling loop — all coordinated through the storage
//! layer's atomic conditional updates, so any number of pollers and
//! external workers can share one queue.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handler;
pub mod model;
pub mod telemetry;
