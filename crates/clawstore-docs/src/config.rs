//! Configuration management for the document store
//!
//! Provides flush-budget presets and validation. Loading these values from a
//! file is left to the embedding application.

use std::time::Duration;

/// Document store configuration with flush-budget presets
#[derive(Debug, Clone)]
pub struct Config {
    /// Every stale document is written at most this long after it went stale
    /// (one full write per interval)
    pub persist_every: Duration,
    /// Partial writes attempted per second between full writes
    pub partial_writes_per_second: u32,
    /// Background tick period
    pub tick_interval: Duration,
    /// How often the ticker resizes the object pool
    pub pool_check_interval: Duration,
    /// Target number of pooled instances per record type
    pub instance_pool_size: usize,
    /// Preserve on-disk fields the current record type no longer declares
    pub merge_on_write: bool,
    /// Apply the reversible byte-shift transform to written files
    pub obfuscate_files: bool,
    /// Pretty-print JSON files
    pub indent_json: bool,
    /// Start the background ticker on `init`; when false the caller drives
    /// `Database::scheduler().tick()` and `flush_now()` itself
    pub background_ticker: bool,
}

impl Config {
    /// Default budget: full write every 10s, one partial write per second.
    pub fn standard() -> Self {
        Self {
            persist_every: Duration::from_secs(10),
            partial_writes_per_second: 1,
            tick_interval: Duration::from_millis(100),
            pool_check_interval: Duration::from_secs(1),
            instance_pool_size: 2000,
            merge_on_write: true,
            obfuscate_files: false,
            indent_json: true,
            background_ticker: true,
        }
    }

    /// Tighter crash-loss window: full write every 2s, four partial writes per second.
    pub fn durable() -> Self {
        Self {
            persist_every: Duration::from_secs(2),
            partial_writes_per_second: 4,
            ..Self::standard()
        }
    }

    /// No background ticker and a small pool. Flushing happens only when the
    /// caller ticks the scheduler or calls `flush_now()`.
    pub fn manual() -> Self {
        Self {
            instance_pool_size: 16,
            indent_json: false,
            background_ticker: false,
            ..Self::standard()
        }
    }

    /// Interval between partial writes.
    pub fn partial_write_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.partial_writes_per_second.max(1) as f64)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.persist_every.is_zero() {
            return Err("persist_every must be > 0".into());
        }
        if self.partial_writes_per_second == 0 {
            return Err("partial_writes_per_second must be > 0".into());
        }
        if self.partial_write_interval() > self.persist_every {
            return Err("partial write interval must not exceed persist_every".into());
        }
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be > 0".into());
        }
        if self.tick_interval > self.persist_every {
            return Err("tick_interval must not exceed persist_every".into());
        }
        if self.pool_check_interval.is_zero() {
            return Err("pool_check_interval must be > 0".into());
        }
        if self.instance_pool_size > 10_000_000 {
            return Err("instance_pool_size must be <= 10,000,000".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::standard() }
}
