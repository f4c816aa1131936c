use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

/// Removes `path` if present and recreates it empty.
pub fn reset_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| format!("remove_dir_all {}", path.display()))?;
    }
    ensure_dir(path)
}

/// Every regular file under `path` (or `path` itself), sorted for a stable task split.
pub fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path.as_ref()) {
        let entry = entry.with_context(|| format!("walk {}", path.as_ref().display()))?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_lines(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Result<String>>> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    let reader = BufReader::new(file);
    Ok(reader.lines().map(|l| l.map_err(anyhow::Error::from)))
}

/// Reads all lines of every file, failing on the first I/O error.
pub fn read_all_lines(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for file in files {
        for line in read_lines(file)? {
            lines.push(line.with_context(|| format!("read {}", file.display()))?);
        }
    }
    Ok(lines)
}

pub fn hash_to_partition<K: Hash>(key: &K, num_partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % num_partitions.max(1)
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Writes each displayable record on its own line.
pub fn write_lines<T: std::fmt::Display>(path: impl AsRef<Path>, records: impl IntoIterator<Item = T>) -> Result<u64> {
    let mut w = open_writer(path.as_ref())?;
    let mut n = 0u64;
    for r in records {
        writeln!(w, "{}", r)?;
        n += 1;
    }
    w.flush().with_context(|| format!("flush {}", path.as_ref().display()))?;
    Ok(n)
}

// Intermediate spill format: [klen u32 le][vlen u32 le][key bytes][value bytes]
pub const BIN_HEADER_LEN: usize = 8;

pub fn write_bin<K: Serialize, V: Serialize>(buf: &mut Vec<u8>, key: &K, value: &V) -> Result<()> {
    let key_bytes = bincode::serialize(key).context("bincode key")?;
    let val_bytes = bincode::serialize(value).context("bincode value")?;
    buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(val_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&key_bytes);
    buf.extend_from_slice(&val_bytes);
    Ok(())
}

/// Reads the record at `off`, returning (key bytes, value bytes, next offset).
/// `None` at end of input or on a truncated record.
pub fn read_bin_line(bytes: &[u8], off: usize) -> Option<(&[u8], &[u8], usize)> {
    let header = bytes.get(off..off + BIN_HEADER_LEN)?;
    let klen = u32::from_le_bytes(header[0..4].try_into().ok()?) as usize;
    let vlen = u32::from_le_bytes(header[4..8].try_into().ok()?) as usize;
    let key_start = off + BIN_HEADER_LEN;
    let val_start = key_start + klen;
    let end = val_start + vlen;
    if end > bytes.len() {
        return None;
    }
    Some((&bytes[key_start..val_start], &bytes[val_start..end], end))
}

pub fn decode_bin<K: DeserializeOwned, V: DeserializeOwned>(key: &[u8], value: &[u8]) -> Result<(K, V)> {
    let k = bincode::deserialize(key).context("bad key bin")?;
    let v = bincode::deserialize(value).context("bad value bin")?;
    Ok((k, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_records_read_back_in_sequence() {
        let mut buf = Vec::new();
        write_bin(&mut buf, &7i64, &"seven".to_string()).unwrap();
        write_bin(&mut buf, &-1i64, &"minus".to_string()).unwrap();

        let (k, v, next) = read_bin_line(&buf, 0).unwrap();
        assert_eq!(decode_bin::<i64, String>(k, v).unwrap(), (7, "seven".to_string()));
        let (k, v, end) = read_bin_line(&buf, next).unwrap();
        assert_eq!(decode_bin::<i64, String>(k, v).unwrap(), (-1, "minus".to_string()));
        assert_eq!(end, buf.len());
        assert!(read_bin_line(&buf, end).is_none());
    }

    #[test]
    fn truncated_record_is_not_returned() {
        let mut buf = Vec::new();
        write_bin(&mut buf, &1i64, &2i64).unwrap();
        buf.pop();
        assert!(read_bin_line(&buf, 0).is_none());
    }

    #[test]
    fn partition_is_stable_and_in_range() {
        for key in -50i64..50 {
            let p = hash_to_partition(&key, 7);
            assert!(p < 7);
            assert_eq!(p, hash_to_partition(&key, 7));
        }
        assert_eq!(hash_to_partition(&3i64, 0), 0);
    }

    #[test]
    fn lists_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/2.txt"), "x").unwrap();
        fs::write(dir.path().join("a.txt"), "y").unwrap();
        let files = list_files_recursive(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt"), dir.path().join("b/2.txt")]);
    }
}
