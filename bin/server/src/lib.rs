//! reportek HTTP server.
//!
//! Exposes envelope workflows over a JSON API backed by PostgreSQL, with
//! state-change notifications published to NATS or an in-process channel.

pub mod actor;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod startup;
pub mod state;

#[cfg(test)]
mod memory;
