//! Processor tuning knobs.
//!
//! Defaults mirror the production deployment; tests shrink the intervals so
//! polling loops run in milliseconds.

use std::collections::HashMap;
use std::time::Duration;

/// Tuning for chunking, batching, aggregation, and the polling loops.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Lower bound on chunk byte size.
    pub min_chunk_size: u64,
    /// Lower bound on lines per chunk; combined with the sampled average
    /// line size to compute the effective chunk size.
    pub min_lines_per_chunk: u64,
    /// Bound on concurrently aggregating chunks.
    pub max_parallel_chunks: u32,
    /// Lines sampled from the head of the file to estimate line size.
    pub sample_lines: usize,
    /// Records per dispatched batch.
    pub batch_size: usize,
    /// Width of the shared fetch-convert-append worker pool.
    pub converter_pool_size: usize,
    /// Sleep between status-store scans while discovering completed batches.
    pub poll_interval: Duration,
    /// Minimum spacing between liveness signals to the engine. Must stay
    /// below the engine's stall-detection timeout.
    pub heartbeat_interval: Duration,
    /// Bounded wait used while draining in-flight conversions.
    pub drain_wait: Duration,
    /// Buffer size that triggers an intermediate part upload.
    pub part_size_threshold: usize,
    /// A throttling delay is inserted after every this many closed batches.
    pub throttle_every: usize,
    pub throttle_delay: Duration,
    /// Expiry applied to every status-store key.
    pub status_ttl: Duration,
    /// Deployment environment and region, used to derive bucket names.
    pub env: String,
    pub region: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 5 * 1024 * 1024,
            min_lines_per_chunk: 50_000,
            max_parallel_chunks: 4,
            sample_lines: 100,
            batch_size: 100,
            converter_pool_size: 10,
            poll_interval: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(60),
            drain_wait: Duration::from_secs(10),
            part_size_threshold: 10 * 1024 * 1024,
            throttle_every: 10,
            throttle_delay: Duration::from_millis(500),
            status_ttl: Duration::from_secs(43_200),
            env: "dev".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Overlay defaults with `BULKFLOW_`-prefixed environment variables.
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix("BULKFLOW_")
                    .map(|name| (name.to_lowercase(), v))
            })
            .collect();

        let mut config = Self::default();
        if let Some(v) = vars.get("min_chunk_size").and_then(|v| v.parse().ok()) {
            config.min_chunk_size = v;
        }
        if let Some(v) = vars.get("min_lines_per_chunk").and_then(|v| v.parse().ok()) {
            config.min_lines_per_chunk = v;
        }
        if let Some(v) = vars.get("max_parallel_chunks").and_then(|v| v.parse().ok()) {
            config.max_parallel_chunks = v;
        }
        if let Some(v) = vars.get("sample_lines").and_then(|v| v.parse().ok()) {
            config.sample_lines = v;
        }
        if let Some(v) = vars.get("batch_size").and_then(|v| v.parse().ok()) {
            config.batch_size = v;
        }
        if let Some(v) = vars.get("env") {
            config.env = v.clone();
        }
        if let Some(v) = vars.get("region") {
            config.region = v.clone();
        }
        config
    }
}

/// Identity strings substituted into the summary report header.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub vendor_name: String,
    pub software_name: String,
    pub software_version: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            vendor_name: "Bulkflow Data Services".to_string(),
            software_name: "bulkflow".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
