use crate::io::{ensure_dir, open_writer};
use anyhow::Result;
use crossbeam_channel as channel;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::error;

// One dedicated IO thread per partition file. Senders are bounded for backpressure.
pub struct WriterPool {
    senders: Vec<channel::Sender<WriterMsg>>,
    metrics: Vec<Arc<PartitionCounters>>,
}

enum WriterMsg {
    Data(Vec<u8>),
    Close,
}

pub struct WriterJoiner {
    handles: Vec<thread::JoinHandle<Result<()>>>,
}

impl WriterJoiner {
    /// Waits for every writer thread; the first write failure wins.
    pub fn join_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for h in self.handles.drain(..) {
            let res = h.join().unwrap_or_else(|_| Err(anyhow::anyhow!("writer thread panicked")));
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl WriterPool {
    /// Spawns `num_partitions` writers, writing to `<base_dir>/part<N>.bin`.
    pub fn new(base_dir: &str, num_partitions: usize, flush_bytes: usize, flush_interval: Duration, queue_cap: usize) -> Result<(Self, WriterJoiner)> {
        ensure_dir(base_dir)?;
        let mut senders = Vec::with_capacity(num_partitions);
        let mut handles = Vec::with_capacity(num_partitions);
        let mut metrics = Vec::with_capacity(num_partitions);
        for part in 0..num_partitions {
            let (tx, rx) = channel::bounded::<WriterMsg>(queue_cap);
            let path = partition_path(base_dir, part);
            let counters = Arc::new(PartitionCounters::default());
            let thread_counters = Arc::clone(&counters);
            let handle = thread::spawn(move || -> Result<()> {
                let mut writer = open_writer(&path)?;
                let mut buf: Vec<u8> = Vec::with_capacity(flush_bytes.min(1 << 20));
                let mut last_flush = Instant::now();
                let mut write_out = |buf: &mut Vec<u8>| -> Result<()> {
                    if !buf.is_empty() {
                        writer.write_all(buf).map_err(|e| {
                            error!("writer write_all {}: {}", path, e);
                            e
                        })?;
                        thread_counters.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                        thread_counters.write_calls.fetch_add(1, Ordering::Relaxed);
                        buf.clear();
                    }
                    writer.flush()?;
                    Ok(())
                };
                loop {
                    // Batch writes up to flush_bytes or flush_interval.
                    let timeout = flush_interval.saturating_sub(last_flush.elapsed());
                    match rx.recv_timeout(timeout) {
                        Ok(WriterMsg::Data(bytes)) => {
                            thread_counters.recv_count.fetch_add(1, Ordering::Relaxed);
                            buf.extend_from_slice(&bytes);
                        }
                        Ok(WriterMsg::Close) | Err(channel::RecvTimeoutError::Disconnected) => {
                            write_out(&mut buf)?;
                            return Ok(());
                        }
                        Err(channel::RecvTimeoutError::Timeout) => {}
                    }
                    if buf.len() >= flush_bytes || last_flush.elapsed() >= flush_interval {
                        write_out(&mut buf)?;
                        last_flush = Instant::now();
                    }
                }
            });
            senders.push(tx);
            handles.push(handle);
            metrics.push(counters);
        }
        Ok((Self { senders, metrics }, WriterJoiner { handles }))
    }

    pub fn num_partitions(&self) -> usize {
        self.senders.len()
    }

    /// Hands a chunk of encoded records to the partition's writer thread.
    pub fn send_raw(&self, partition: usize, bytes: Vec<u8>) -> Result<()> {
        let counters = &self.metrics[partition];
        counters.enq_count.fetch_add(1, Ordering::Relaxed);
        counters.enq_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.senders[partition]
            .send(WriterMsg::Data(bytes))
            .map_err(|e| anyhow::anyhow!("send to partition {} failed: {}", partition, e))
    }

    pub fn close_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(WriterMsg::Close);
        }
    }

    pub fn make_thread_writer(&self, batch_bytes: usize) -> ThreadWriter<'_> {
        ThreadWriter::new(self, batch_bytes)
    }

    pub fn metrics_snapshot(&self) -> Vec<WriterPartitionMetrics> {
        self.metrics
            .iter()
            .map(|c| WriterPartitionMetrics {
                enq_count: c.enq_count.load(Ordering::Relaxed),
                enq_bytes: c.enq_bytes.load(Ordering::Relaxed),
                recv_count: c.recv_count.load(Ordering::Relaxed),
                bytes_written: c.bytes_written.load(Ordering::Relaxed),
                write_calls: c.write_calls.load(Ordering::Relaxed),
            })
            .collect()
    }
}

pub fn partition_path(base_dir: &str, partition: usize) -> String {
    format!("{}/part{}.bin", base_dir, partition)
}

/// Per-map-task batching in front of the pool.
pub struct ThreadWriter<'a> {
    pool: &'a WriterPool,
    local_buffers: Vec<Vec<u8>>, // per-partition aggregation buffers
    batch_bytes: usize,
    flushes: u64,
    bytes_sent: u64,
}

impl<'a> ThreadWriter<'a> {
    fn new(pool: &'a WriterPool, batch_bytes: usize) -> Self {
        let local_buffers = (0..pool.num_partitions()).map(|_| Vec::new()).collect();
        Self { pool, local_buffers, batch_bytes, flushes: 0, bytes_sent: 0 }
    }

    /// Mutable access to a partition's pending buffer; call [`Self::maybe_flush`] after appending.
    pub fn buffer(&mut self, partition: usize) -> &mut Vec<u8> {
        &mut self.local_buffers[partition]
    }

    pub fn maybe_flush(&mut self, partition: usize) -> Result<()> {
        if self.local_buffers[partition].len() >= self.batch_bytes {
            self.flush_partition(partition)?;
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        for p in 0..self.local_buffers.len() {
            if !self.local_buffers[p].is_empty() {
                self.flush_partition(p)?;
            }
        }
        Ok(())
    }

    fn flush_partition(&mut self, partition: usize) -> Result<()> {
        let chunk = std::mem::take(&mut self.local_buffers[partition]);
        self.bytes_sent += chunk.len() as u64;
        self.flushes += 1;
        self.pool.send_raw(partition, chunk)
    }

    /// (flushes, bytes sent)
    pub fn stats(&self) -> (u64, u64) {
        (self.flushes, self.bytes_sent)
    }
}

#[derive(Default)]
struct PartitionCounters {
    enq_count: AtomicU64,
    enq_bytes: AtomicU64,
    recv_count: AtomicU64,
    bytes_written: AtomicU64,
    write_calls: AtomicU64,
}

#[derive(Clone, Debug)]
pub struct WriterPartitionMetrics {
    pub enq_count: u64,
    pub enq_bytes: u64,
    pub recv_count: u64,
    pub bytes_written: u64,
    pub write_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_land_in_their_partition_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().into_owned();
        let (pool, mut joiner) = WriterPool::new(&base, 2, 1024, Duration::from_millis(10), 8).unwrap();
        {
            let mut tw = pool.make_thread_writer(4);
            tw.buffer(0).extend_from_slice(b"ab");
            tw.maybe_flush(0).unwrap();
            tw.buffer(1).extend_from_slice(b"xyz1");
            tw.maybe_flush(1).unwrap();
            tw.buffer(0).extend_from_slice(b"cd");
            tw.flush_all().unwrap();
            assert_eq!(tw.stats(), (2, 8));
        }
        pool.close_all();
        joiner.join_all().unwrap();

        assert_eq!(std::fs::read(partition_path(&base, 0)).unwrap(), b"abcd");
        assert_eq!(std::fs::read(partition_path(&base, 1)).unwrap(), b"xyz1");
        let m = pool.metrics_snapshot();
        assert_eq!(m[0].bytes_written + m[1].bytes_written, 8);
    }
}
