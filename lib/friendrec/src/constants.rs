//! Centralized environment variable names and default values for runtime tuning.

// Environment variable names
pub const ENV_KEEP_INTERMEDIATES: &str = "FRIENDREC_KEEP_INTERMEDIATES";
pub const ENV_RAYON_THREADS: &str = "FRIENDREC_RAYON_THREADS";
pub const ENV_NUM_REDUCERS: &str = "FRIENDREC_NUM_REDUCERS";
pub const ENV_FLUSH_BYTES: &str = "FRIENDREC_FLUSH_BYTES";
pub const ENV_FLUSH_INTERVAL_MS: &str = "FRIENDREC_FLUSH_INTERVAL_MS";
pub const ENV_WRITER_QUEUE_CAP: &str = "FRIENDREC_WRITER_QUEUE_CAP";
pub const ENV_LOCAL_BATCH_BYTES: &str = "FRIENDREC_LOCAL_BATCH_BYTES";
pub const ENV_LOCAL_TASKS: &str = "FRIENDREC_LOCAL_TASKS";
/// Parent directory for staged-run scratch files
pub const ENV_WORK_DIR: &str = "FRIENDREC_WORK_DIR";

// Defaults (picked to reduce wakeups/syscalls under heavy shuffle)
pub const DEFAULT_LOCAL_BATCH_BYTES: usize = 256 * 1024; // per-partition buffer in a map task
pub const DEFAULT_WRITER_QUEUE_CAP: usize = 1024;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;
pub const DEFAULT_FLUSH_BYTES: usize = 16 * 1024 * 1024; // 16 MiB
pub const DEFAULT_WORK_DIR: &str = ".friendrec_runs";

/// Pairs per message between map and reduce workers in the channel engine
pub const CHANNEL_BATCH_PAIRS: usize = 4096;
