use crate::api::{ExecutablePipeline, Grouping, Mapper, Reducer};
use crate::config::RuntimeConfig;
use crate::grouping::HashGrouping;
use crate::io::{list_files_recursive, read_all_lines, reset_dir, write_lines};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Single-process engine: parallel map over line chunks, in-memory grouping, parallel reduce.
pub struct LocalPipeline<G: Grouping = HashGrouping> {
    inputs: Vec<String>,
    output: Option<String>,
    grouping: G,
    config: RuntimeConfig,
}

impl LocalPipeline<HashGrouping> {
    pub fn new() -> Self {
        Self::with_grouping(HashGrouping)
    }
}

impl Default for LocalPipeline<HashGrouping> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Grouping> LocalPipeline<G> {
    pub fn with_grouping(grouping: G) -> Self {
        Self { inputs: vec![], output: None, grouping, config: RuntimeConfig::from_env() }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the job over in-memory lines. Outputs are ordered by ascending key.
    pub fn run_lines<M, R>(&self, mapper: &M, reducer: &R, lines: Vec<String>) -> Result<Vec<(M::Key, R::Out)>>
    where
        M: Mapper<Input = String> + Sync,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Sync,
    {
        let tasks = self.config.local_tasks.min(lines.len()).max(1);
        let chunk_len = lines.len().div_ceil(tasks).max(1);

        let map_start = Instant::now();
        let per_task: Vec<Vec<(M::Key, M::Value)>> = lines
            .par_chunks(chunk_len)
            .enumerate()
            .map(|(task_id, chunk)| -> Result<Vec<(M::Key, M::Value)>> {
                let mut pairs = Vec::new();
                mapper.do_map(chunk.iter().cloned(), &mut |k, v| pairs.push((k, v)))?;
                debug!(task_id, lines = chunk.len(), emits = pairs.len(), "map task done");
                Ok(pairs)
            })
            .collect::<Result<_>>()?;
        let pairs: Vec<(M::Key, M::Value)> = per_task.into_iter().flatten().collect();
        info!(phase = "map", tasks, total_emits = pairs.len(), wall_ms = map_start.elapsed().as_millis() as u64, "Map phase complete");

        let reduce_start = Instant::now();
        let grouped = self.grouping.group_by_key(pairs, |key, values| {
            let mut outs = Vec::with_capacity(1);
            reducer.do_reduce(key, values, &mut |o| outs.push(o))?;
            Ok(outs)
        })?;
        let results: Vec<(M::Key, R::Out)> = grouped
            .into_iter()
            .flat_map(|(k, outs)| outs.into_iter().map(move |o| (k.clone(), o)))
            .collect();
        info!(phase = "reduce", outputs = results.len(), wall_ms = reduce_start.elapsed().as_millis() as u64, "Reduce phase complete");
        Ok(results)
    }
}

impl<G: Grouping> ExecutablePipeline for LocalPipeline<G> {
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

        let mut files = Vec::new();
        for inp in &self.inputs {
            files.append(&mut list_files_recursive(inp)?);
        }
        let lines = read_all_lines(&files)?;
        info!(files = files.len(), lines = lines.len(), "local pipeline starting");

        let results = self.run_lines(&mapper, &reducer, lines)?;

        reset_dir(&output_dir)?;
        let written = write_lines(format!("{}/part-00000.tsv", output_dir), results.into_iter().map(|(_, o)| o))?;
        info!(output = %output_dir, records = written, "local pipeline finished");
        Ok(())
    }
}
