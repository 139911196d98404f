//! Media transformation job orchestrator
//!
//! Accepts media jobs over HTTP, deduplicates them by content fingerprint,
//! dispatches them to a remote GPU compute backend, and reconciles their
//! completion from signed callbacks or status polling.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
