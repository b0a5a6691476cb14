//! Activities regime lifecycle worker.
//!
//! This crate ships the `lifecycle-worker` binary and exposes its parts as a
//! library for integration testing and reuse.

pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod monitoring;
pub mod movements;
pub mod operations;
pub mod ports;
pub mod scheduler;
pub mod state;
pub mod unit_of_work;

#[cfg(test)]
mod testing;
