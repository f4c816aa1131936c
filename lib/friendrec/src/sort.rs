use crate::io::{read_bin_line, BIN_HEADER_LEN};
use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

#[derive(Clone, Debug, Default)]
pub struct SortOutcome {
    pub lines_in: u64,
    pub bytes_in: u64,
    pub sort_only_ms: u64,
    pub io_read_ms: u64,
    pub io_write_ms: u64,
}

// Given set of partition files, produce a single sorted-by-key file at out_path.
// Records with equal key bytes end up adjacent; that is all the reduce stage needs.
pub fn external_sort_by_key<P: AsRef<Path>>(input_paths: &[P], out_path: impl AsRef<Path>) -> Result<SortOutcome> {
    let read_start = Instant::now();
    // Mmap each input file and build record index: (file_idx, start, key_end, end)
    let mut file_maps: Vec<Mmap> = Vec::new();
    let mut index: Vec<(usize, usize, usize, usize)> = Vec::new();
    let mut bytes_in: u64 = 0;

    for p in input_paths {
        let p = p.as_ref();
        let file = File::open(p).with_context(|| format!("open {}", p.display()))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        bytes_in += len;
        if len == 0 {
            // mmap of an empty file fails on some platforms
            continue;
        }
        let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", p.display()))?;
        let file_idx = file_maps.len();
        let mut off = 0usize;
        while let Some((k, _v, next)) = read_bin_line(&map, off) {
            let key_end = off + BIN_HEADER_LEN + k.len();
            index.push((file_idx, off, key_end, next));
            off = next;
        }
        if off != map.len() {
            anyhow::bail!("truncated record in {} at offset {}", p.display(), off);
        }
        file_maps.push(map);
    }
    let io_read_ms = read_start.elapsed().as_millis() as u64;

    let sort_only_start = Instant::now();
    index.par_sort_by(|a, b| {
        let (fia, sa, ka, _) = *a;
        let (fib, sb, kb, _) = *b;
        file_maps[fia][(sa + BIN_HEADER_LEN)..ka].cmp(&file_maps[fib][(sb + BIN_HEADER_LEN)..kb])
    });
    let sort_only_ms = sort_only_start.elapsed().as_millis() as u64;

    let io_write_start = Instant::now();
    let out_path = out_path.as_ref();
    let file = File::create(out_path).with_context(|| format!("create {}", out_path.display()))?;
    let mut w = BufWriter::with_capacity(8 * 1024 * 1024, file);
    for &(fi, s, _k, e) in &index {
        w.write_all(&file_maps[fi][s..e]).with_context(|| format!("write {}", out_path.display()))?;
    }
    w.flush().with_context(|| format!("flush {}", out_path.display()))?;
    let io_write_ms = io_write_start.elapsed().as_millis() as u64;

    Ok(SortOutcome { lines_in: index.len() as u64, bytes_in, sort_only_ms, io_read_ms, io_write_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{decode_bin, write_bin};

    #[test]
    fn equal_keys_become_adjacent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut buf = Vec::new();
        for (k, v) in [(3i64, 1u8), (1, 2), (3, 3)] {
            write_bin(&mut buf, &k, &v).unwrap();
        }
        std::fs::write(&a, &buf).unwrap();
        buf.clear();
        for (k, v) in [(1i64, 4u8), (2, 5)] {
            write_bin(&mut buf, &k, &v).unwrap();
        }
        std::fs::write(&b, &buf).unwrap();
        let empty = dir.path().join("empty.bin");
        std::fs::write(&empty, b"").unwrap();

        let out = dir.path().join("sorted.bin");
        let outcome = external_sort_by_key(&[a, b, empty], &out).unwrap();
        assert_eq!(outcome.lines_in, 5);

        let bytes = std::fs::read(&out).unwrap();
        let mut keys = Vec::new();
        let mut off = 0;
        while let Some((k, v, next)) = read_bin_line(&bytes, off) {
            let (key, _): (i64, u8) = decode_bin(k, v).unwrap();
            keys.push(key);
            off = next;
        }
        let mut runs = keys.clone();
        runs.dedup();
        let mut distinct = runs.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(runs.len(), distinct.len(), "keys not grouped: {keys:?}");
        assert_eq!(keys.len(), 5);
    }
}
