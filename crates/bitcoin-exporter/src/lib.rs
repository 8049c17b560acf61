// Numan Thabit 2025
//! Prometheus exporter for a replicated Bitcoin node deployment.
//!
//! Every scrape triggers one collection pass: resolve the current set of
//! node replicas, query each one's JSON-RPC endpoint concurrently, and
//! publish the results as an immutable snapshot rendered in the
//! Prometheus text format.

/// Per-pass fan-out and the single-flight scrape gate.
pub mod collector;
/// Exporter configuration and RPC credential resolution.
pub mod config;
/// StatefulSet ordinal DNS discovery.
pub mod discovery;
/// Scrape-facing HTTP server.
pub mod http;
/// Bitcoin JSON-RPC client.
pub mod rpc;
/// Immutable metric snapshots and text exposition.
pub mod snapshot;
