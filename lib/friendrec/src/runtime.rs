use crate::api::{ExecutablePipeline, Mapper, Reducer};
use crate::config::RuntimeConfig;
use crate::io::{decode_bin, ensure_dir, hash_to_partition, list_files_recursive, open_writer, read_bin_line, read_lines, reset_dir, write_bin};
use crate::sort::external_sort_by_key;
use crate::stats::{MapTaskStats, ReduceTaskStats, SortTaskStats, StatsCollector};
use crate::writer::{partition_path, WriterPool};
use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Staged engine: map output is hash-partitioned into spill files, each
/// partition is externally sorted by key, then reduced as a stream of key runs.
/// Emits one `part-NNNNN.tsv` per partition.
pub struct RuntimePipeline {
    inputs: Vec<String>,
    output: Option<String>,
    config: RuntimeConfig,
    last_stats: Option<StatsCollector>,
}

impl RuntimePipeline {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { inputs: vec![], output: None, config, last_stats: None }
    }

    /// Phase statistics of the most recent successful run.
    pub fn last_stats(&self) -> Option<&StatsCollector> {
        self.last_stats.as_ref()
    }

    fn run_stages<M, R>(&self, mapper: &M, reducer: &R, output_dir: &str, launch_root: &str) -> Result<StatsCollector>
    where
        M: Mapper<Input = String> + Sync,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Sync,
    {
        let map_out_dir = format!("{}/map_out", launch_root);
        let sort_out_dir = format!("{}/sort_out", launch_root);
        ensure_dir(&map_out_dir)?;
        ensure_dir(&sort_out_dir)?;
        reset_dir(output_dir)?;

        let mut all_files = Vec::new();
        for inp in &self.inputs {
            all_files.append(&mut list_files_recursive(inp)?);
        }

        let ntasks = self.config.local_tasks.min(all_files.len().max(1));
        // partition files among logical tasks
        let chunks: Vec<Vec<PathBuf>> = (0..ntasks)
            .map(|i| all_files.iter().enumerate().filter(|(idx, _)| idx % ntasks == i).map(|(_, p)| p.clone()).collect())
            .collect();
        let num_reducers = self.config.reducers_for(ntasks);
        info!(ntasks, num_reducers, files = all_files.len(), launch_root, "starting map phase");

        let mut stats = StatsCollector::new();

        // Map phase
        let (pool, mut joiner) = WriterPool::new(
            &map_out_dir,
            num_reducers,
            self.config.flush_bytes,
            self.config.flush_interval,
            self.config.writer_queue_cap,
        )?;
        let map_phase_start = Instant::now();
        let run_map_for = |task_id: usize| -> Result<MapTaskStats> {
            let task_start = Instant::now();
            let files = &chunks[task_id];
            debug!(task_id, num_files = files.len(), writers = num_reducers, "map task starting");
            let mut tw = pool.make_thread_writer(self.config.local_batch_bytes);
            let mut total_emits: u64 = 0;
            for file in files {
                let mut io_err = None;
                let lines = read_lines(file)?.map_while(|r| match r {
                    Ok(line) => Some(line),
                    Err(e) => {
                        io_err = Some(e);
                        None
                    }
                });
                let mut emit_err: Option<anyhow::Error> = None;
                let mut emit = |k: M::Key, v: M::Value| {
                    let part = hash_to_partition(&k, num_reducers);
                    if let Err(e) = write_bin(tw.buffer(part), &k, &v).and_then(|_| tw.maybe_flush(part)) {
                        emit_err.get_or_insert(e);
                    }
                    total_emits += 1;
                };
                mapper.do_map(lines, &mut emit)?;
                if let Some(e) = emit_err {
                    return Err(e.context(format!("map task {} spill", task_id)));
                }
                if let Some(e) = io_err {
                    return Err(e.context(format!("read {}", file.display())));
                }
            }
            tw.flush_all()?;
            let (total_flushes, total_bytes_out) = tw.stats();
            Ok(MapTaskStats {
                task_id,
                num_files: files.len() as u64,
                total_emits,
                total_bytes_out,
                total_flushes,
                wall_ms: task_start.elapsed().as_millis() as u64,
            })
        };
        let map_result: Result<Vec<MapTaskStats>> = (0..ntasks).into_par_iter().map(run_map_for).collect();

        // Ensure all writers are closed before proceeding
        pool.close_all();
        let joined = joiner.join_all();
        let map_stats = map_result?;
        joined?;
        for m in pool.metrics_snapshot().iter().enumerate() {
            debug!(partition = m.0, bytes_written = m.1.bytes_written, write_calls = m.1.write_calls, "spill writer");
        }
        stats.record_map(&map_stats, map_phase_start.elapsed().as_millis() as u64);

        // Sort/shuffle
        let sort_phase_start = Instant::now();
        let run_sort_for = |r: usize| -> Result<SortTaskStats> {
            let start = Instant::now();
            let input = partition_path(&map_out_dir, r);
            let out_path = format!("{}/reduce_in_part{}.bin", sort_out_dir, r);
            let outcome = external_sort_by_key(&[input], &out_path)?;
            debug!(reducer = r, lines = outcome.lines_in, sort_ms = outcome.sort_only_ms, "partition sorted");
            Ok(SortTaskStats {
                reducer: r,
                input_files: 1,
                lines_in: outcome.lines_in,
                bytes_in: outcome.bytes_in,
                wall_ms: start.elapsed().as_millis() as u64,
            })
        };
        let sort_stats: Vec<SortTaskStats> = (0..num_reducers).into_par_iter().map(run_sort_for).collect::<Result<_>>()?;
        stats.record_sort(&sort_stats, sort_phase_start.elapsed().as_millis() as u64);

        // Reduce phase
        let reduce_phase_start = Instant::now();
        let run_reduce_for = |r: usize| -> Result<ReduceTaskStats> {
            let start = Instant::now();
            let in_path = format!("{}/reduce_in_part{}.bin", sort_out_dir, r);
            let out_path = format!("{}/part-{:05}.tsv", output_dir, r);
            let mut out_writer = open_writer(&out_path)?;

            let file = fs::File::open(&in_path).with_context(|| format!("open {}", in_path))?;
            let map = if file.metadata().map(|m| m.len()).unwrap_or(0) > 0 {
                Some(unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", in_path))?)
            } else {
                None
            };
            let bytes: &[u8] = map.as_deref().unwrap_or(&[]);

            let mut groups: u64 = 0;
            let mut lines_in: u64 = 0;
            let mut write_err: Option<std::io::Error> = None;
            let mut flush_group = |key: &M::Key, vals: Vec<M::Value>| -> Result<()> {
                reducer.do_reduce(key, vals, &mut |o: R::Out| {
                    if write_err.is_none() {
                        if let Err(e) = writeln!(out_writer, "{}", o) {
                            write_err = Some(e);
                        }
                    }
                })?;
                groups += 1;
                Ok(())
            };

            let mut current_key: Option<M::Key> = None;
            let mut buffer: Vec<M::Value> = Vec::new();
            let mut off = 0usize;
            while let Some((k, v, next)) = read_bin_line(bytes, off) {
                let (k_typed, v_typed): (M::Key, M::Value) = decode_bin(k, v)?;
                lines_in += 1;
                match &current_key {
                    Some(cur) if cur == &k_typed => {}
                    Some(cur) => {
                        flush_group(cur, std::mem::take(&mut buffer))?;
                        current_key = Some(k_typed);
                    }
                    None => current_key = Some(k_typed),
                }
                buffer.push(v_typed);
                off = next;
            }
            if let Some(cur) = current_key.take() {
                flush_group(&cur, buffer)?;
            }
            drop(flush_group);
            if let Some(e) = write_err {
                return Err(anyhow::Error::from(e).context(format!("write {}", out_path)));
            }
            out_writer.flush().with_context(|| format!("flush {}", out_path))?;
            Ok(ReduceTaskStats { reducer: r, lines_in, groups, wall_ms: start.elapsed().as_millis() as u64 })
        };
        let reduce_stats: Vec<ReduceTaskStats> = (0..num_reducers).into_par_iter().map(run_reduce_for).collect::<Result<_>>()?;
        stats.record_reduce(&reduce_stats, reduce_phase_start.elapsed().as_millis() as u64);

        Ok(stats)
    }
}

impl Default for RuntimePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutablePipeline for RuntimePipeline {
    fn add_input(&mut self, input_path: impl Into<String>) {
        self.inputs.push(input_path.into());
    }

    fn add_output(&mut self, output_path: impl Into<String>) {
        self.output = Some(output_path.into());
    }

    fn map_reduce<M, R>(&mut self, mapper: M, reducer: R) -> Result<()>
    where
        M: Mapper<Input = String> + Send + Sync + 'static,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync + 'static,
    {
        let output_dir = self.output.clone().context("output not set")?;
        self.config.apply_rayon_threads();

        let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
        let job_id = format!("local-{}-{}", std::process::id(), ts);
        let launch_root = format!("{}/{}", self.config.work_dir, job_id);
        ensure_dir(&launch_root)?;

        let result = self.run_stages(&mapper, &reducer, &output_dir, &launch_root);

        // local cleanup of intermediates
        if !self.config.keep_intermediates {
            if let Err(e) = fs::remove_dir_all(&launch_root) {
                warn!(launch_root = %launch_root, error = %e, "failed to remove intermediates");
            }
        } else {
            info!(launch_root = %launch_root, "keeping intermediates");
        }

        self.last_stats = Some(result?);
        Ok(())
    }
}
