use crate::constants::*;
use crate::utils::{env_parse, env_var_truthy};
use std::time::Duration;

/// Engine tuning. Every field has an environment override (see [`crate::constants`]).
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Parallel map tasks. Defaults to the number of CPUs.
    pub local_tasks: usize,
    /// Reduce partitions; `None` means one per map task.
    pub num_reducers: Option<usize>,
    pub rayon_threads: Option<usize>,
    pub keep_intermediates: bool,
    pub work_dir: String,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub writer_queue_cap: usize,
    pub local_batch_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            local_tasks: num_cpus::get().max(1),
            num_reducers: None,
            rayon_threads: None,
            keep_intermediates: false,
            work_dir: DEFAULT_WORK_DIR.to_string(),
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            writer_queue_cap: DEFAULT_WRITER_QUEUE_CAP,
            local_batch_bytes: DEFAULT_LOCAL_BATCH_BYTES,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            local_tasks: env_parse::<usize>(ENV_LOCAL_TASKS).unwrap_or(d.local_tasks).max(1),
            num_reducers: env_parse::<usize>(ENV_NUM_REDUCERS).filter(|&n| n > 0),
            rayon_threads: env_parse::<usize>(ENV_RAYON_THREADS).filter(|&n| n > 0),
            keep_intermediates: env_var_truthy(ENV_KEEP_INTERMEDIATES),
            work_dir: std::env::var(ENV_WORK_DIR).unwrap_or(d.work_dir),
            flush_bytes: env_parse(ENV_FLUSH_BYTES).unwrap_or(d.flush_bytes),
            flush_interval: env_parse::<u64>(ENV_FLUSH_INTERVAL_MS)
                .map(Duration::from_millis)
                .unwrap_or(d.flush_interval),
            writer_queue_cap: env_parse::<usize>(ENV_WRITER_QUEUE_CAP).unwrap_or(d.writer_queue_cap).max(1),
            local_batch_bytes: env_parse(ENV_LOCAL_BATCH_BYTES).unwrap_or(d.local_batch_bytes),
        }
    }

    pub fn with_tasks(mut self, tasks: usize) -> Self {
        self.local_tasks = tasks.max(1);
        self
    }

    pub fn with_reducers(mut self, reducers: usize) -> Self {
        self.num_reducers = Some(reducers.max(1));
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<String>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Reducer count for a job with `map_tasks` map tasks, clamped to at least 1.
    pub fn reducers_for(&self, map_tasks: usize) -> usize {
        self.num_reducers.unwrap_or(map_tasks).max(1)
    }

    /// Installs the global rayon pool size once. Later calls are no-ops.
    pub fn apply_rayon_threads(&self) {
        if let Some(n) = self.rayon_threads {
            if rayon::ThreadPoolBuilder::new().num_threads(n).build_global().is_err() {
                tracing::debug!(threads = n, "rayon global pool already initialised");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_to_one() {
        let cfg = RuntimeConfig::default().with_tasks(0).with_reducers(0);
        assert_eq!(cfg.local_tasks, 1);
        assert_eq!(cfg.reducers_for(8), 1);
    }

    #[test]
    fn reducers_default_to_map_tasks() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.reducers_for(3), 3);
        assert_eq!(cfg.reducers_for(0), 1);
    }
}
