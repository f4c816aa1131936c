use crate::api::{ExecutablePipeline, Mapper, Reducer};
use crate::config::RuntimeConfig;
use crate::constants::CHANNEL_BATCH_PAIRS;
use crate::io::{hash_to_partition, list_files_recursive, read_all_lines, reset_dir, write_lines};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use std::collections::HashMap;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Message-passing engine. Map workers route batches of pairs to the reduce
/// worker owning `hash(key) % reducers`; each reduce worker starts reducing only
/// once every map worker has hung up, so its groups are complete.
pub struct ChannelPipeline {
    inputs: Vec<String>,
    output: Option<String>,
    config: RuntimeConfig,
}

impl ChannelPipeline {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { inputs: vec![], output: None, config }
    }

    /// Runs the job over in-memory lines. Outputs are ordered by ascending key.
    pub fn run_lines<M, R>(&self, mapper: &M, reducer: &R, lines: Vec<String>) -> Result<Vec<(M::Key, R::Out)>>
    where
        M: Mapper<Input = String> + Sync,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Sync,
    {
        let map_workers = self.config.local_tasks.min(lines.len()).max(1);
        let reduce_workers = self.config.reducers_for(map_workers);
        let chunk_len = lines.len().div_ceil(map_workers).max(1);
        let queue_cap = self.config.writer_queue_cap;
        let start = Instant::now();

        let mut results = thread::scope(|s| -> Result<Vec<(M::Key, R::Out)>> {
            let mut senders = Vec::with_capacity(reduce_workers);
            let mut reduce_handles = Vec::with_capacity(reduce_workers);
            for worker in 0..reduce_workers {
                let (tx, rx) = channel::bounded::<Vec<(M::Key, M::Value)>>(queue_cap);
                senders.push(tx);
                reduce_handles.push(s.spawn(move || -> Result<Vec<(M::Key, R::Out)>> {
                    let mut groups: HashMap<M::Key, Vec<M::Value>> = HashMap::new();
                    let mut received = 0u64;
                    for batch in rx.iter() {
                        received += batch.len() as u64;
                        for (k, v) in batch {
                            groups.entry(k).or_default().push(v);
                        }
                    }
                    let mut groups: Vec<_> = groups.into_iter().collect();
                    groups.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                    debug!(worker, received, groups = groups.len(), "reduce worker draining");

                    let mut out = Vec::with_capacity(groups.len());
                    for (key, vals) in groups {
                        reducer.do_reduce(&key, vals, &mut |o| out.push((key.clone(), o)))?;
                    }
                    Ok(out)
                }));
            }

            let map_handles: Vec<_> = lines
                .chunks(chunk_len)
                .enumerate()
                .map(|(task_id, chunk)| {
                    let senders = senders.clone();
                    s.spawn(move || -> Result<u64> {
                        let mut batches: Vec<Vec<(M::Key, M::Value)>> = (0..reduce_workers).map(|_| Vec::new()).collect();
                        let mut emits = 0u64;
                        let mut hung_up: Option<usize> = None;
                        mapper.do_map(chunk.iter().cloned(), &mut |k, v| {
                            let part = hash_to_partition(&k, reduce_workers);
                            batches[part].push((k, v));
                            emits += 1;
                            if batches[part].len() >= CHANNEL_BATCH_PAIRS && hung_up.is_none() {
                                if senders[part].send(std::mem::take(&mut batches[part])).is_err() {
                                    hung_up = Some(part);
                                }
                            }
                        })?;
                        if let Some(part) = hung_up {
                            return Err(anyhow!("reduce worker {} hung up", part));
                        }
                        for (part, batch) in batches.into_iter().enumerate() {
                            if !batch.is_empty() {
                                senders[part].send(batch).map_err(|_| anyhow!("reduce worker {} hung up", part))?;
                            }
                        }
                        debug!(task_id, lines = chunk.len(), emits, "map worker done");
                        Ok(emits)
                    })
                })
                .collect();
            // Reduce workers see disconnect once the last map worker's clones drop.
            drop(senders);

            let mut first_err: Option<anyhow::Error> = None;
            let mut total_emits = 0u64;
            for h in map_handles {
                match h.join() {
                    Ok(Ok(n)) => total_emits += n,
                    Ok(Err(e)) => {
                        first_err.get_or_insert(e);
                    }
                    Err(_) => {
                        first_err.get_or_insert(anyhow!("map worker panicked"));
                    }
                }
            }
            info!(phase = "map", tasks = map_workers, total_emits, wall_ms = start.elapsed().as_millis() as u64, "Map phase complete");

            let mut results = Vec::new();
            for h in reduce_handles {
                match h.join() {
                    Ok(Ok(mut out)) => results.append(&mut out),
                    Ok(Err(e)) => {
                        first_err.get_or_insert(e);
                    }
                    Err(_) => {
                        first_err.get_or_insert(anyhow!("reduce worker panicked"));
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(results),
            }
        })?;

        // stable: outputs of one key keep their emit order
        results.sort_by(|a, b| a.0.cmp(&b.0));
        info!(phase = "reduce", reducers = reduce_workers, outputs = results.len(), wall_ms = start.elapsed().as_millis() as u64, "Reduce phase complete");
        Ok(results)
    }
}

impl Default for ChannelPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutablePipeline for ChannelPipeline {
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
        let mut files = Vec::new();
        for inp in &self.inputs {
            files.append(&mut list_files_recursive(inp)?);
        }
        let lines = read_all_lines(&files)?;
        info!(files = files.len(), lines = lines.len(), "channel pipeline starting");

        let results = self.run_lines(&mapper, &reducer, lines)?;

        reset_dir(&output_dir)?;
        let written = write_lines(format!("{}/part-00000.tsv", output_dir), results.into_iter().map(|(_, o)| o))?;
        info!(output = %output_dir, records = written, "channel pipeline finished");
        Ok(())
    }
}
