//! Ambient engine configuration. Config-file loading is out of scope (see
//! `SPEC_FULL.md` §6); callers build an `EngineConfig` directly, the way
//! `rpglot-core`'s `RotationConfig` is built directly by its caller rather
//! than parsed from a file.

/// Where (and how durably) record bytes and checkpoints are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StorageMode {
    /// Nothing touches disk; `flush` is a no-op.
    InMemory,
    /// Checkpoint log is written; record bytes stay OS-buffered.
    DurableRelaxed,
    /// Checkpoint log is written and `flush` issues an explicit fsync.
    Durable,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::InMemory
    }
}

/// Tunables for a single atomic multilog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Width, in nanoseconds, of one filter time-block.
    pub time_resolution_ns: u64,
    /// Radix index trie depth (levels).
    pub radix_depth: usize,
    /// Radix index fan-out per level.
    pub radix_width: usize,
    /// Trigger monitor tick period, in milliseconds.
    pub monitor_tick_ms: u64,
    /// Trigger monitor rolling window, in milliseconds.
    pub monitor_window_ms: u64,
    /// Fixed block size (in elements) for linear-schedule logs.
    pub linear_block_size: usize,
    /// Maximum number of blocks a log may grow to before `Overflow`.
    pub max_blocks: usize,
    /// Maximum number of threads that may hold a registered id concurrently.
    pub max_concurrency: usize,
    /// Where record bytes and checkpoints live.
    pub storage_mode: StorageMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            time_resolution_ns: 1_000_000, // 1 ms
            radix_depth: 8,
            radix_width: 256,
            monitor_tick_ms: 1,
            monitor_window_ms: 1000,
            linear_block_size: 64 * 1024 * 1024,
            max_blocks: 1024,
            max_concurrency: 256,
            storage_mode: StorageMode::InMemory,
        }
    }
}
