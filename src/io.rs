//! CSV loaders and writers at the harness boundary.
//!
//! Formats (UTF-8, LF):
//!
//! - prefix table: header `prefix,key`, rows `a.b.c.d/L,<128 hex chars>`;
//! - query addresses: header `ip,used_prefix`, second column ignored;
//! - match output: header `ip,key`, value hex or `-1` in check mode,
//!   `1` or `-1` in fast mode;
//! - results: append-only, header written only when the file is created.
//!
//! Malformed rows are dropped and counted, never fatal; a missing input
//! file is. Records come back deduplicated (last occurrence of a prefix
//! wins) and sorted by descending length, which is the order the
//! direct-index builders require.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::key_pool::{KeyId, KeyPool};
use crate::prefix::{parse_ipv4, Prefix, PrefixRecord};

/// Why a load failed outright (per-row problems only skip the row).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input file could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Reading from an opened file failed.
    #[error("read error in {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Result of loading a prefix table.
#[derive(Debug)]
pub struct PrefixLoad {
    /// Deduplicated records, sorted by descending prefix length.
    pub records: Vec<PrefixRecord>,
    /// Rows dropped as malformed.
    pub skipped: usize,
}

/// Load `prefix,key` rows, interning values into `pool`.
///
/// Rows with a missing comma, an unparseable prefix, a length above 32,
/// or a key that is not 128 hex characters are skipped. A prefix
/// appearing twice keeps its last value.
pub fn load_prefixes(path: &Path, pool: &mut KeyPool) -> Result<PrefixLoad, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut records: Vec<PrefixRecord> = Vec::new();
    let mut seen: HashMap<Prefix, usize> = HashMap::new();
    let mut skipped = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if line_no == 0 && line.starts_with("prefix") {
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let Some((prefix_str, key_hex)) = line.split_once(',') else {
            skipped += 1;
            continue;
        };
        let Ok(prefix) = prefix_str.parse::<Prefix>() else {
            skipped += 1;
            continue;
        };
        let Some(key) = pool.intern_hex(key_hex.trim_end()) else {
            skipped += 1;
            continue;
        };

        match seen.get(&prefix) {
            Some(&idx) => records[idx].key = key,
            None => {
                seen.insert(prefix, records.len());
                records.push(PrefixRecord { prefix, key });
            }
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "dropped malformed prefix rows");
    }

    records.sort_by_key(|r| std::cmp::Reverse(r.prefix.len()));
    Ok(PrefixLoad { records, skipped })
}

/// Result of loading query addresses.
pub struct IpLoad {
    /// Parsed addresses, host byte order, input order.
    pub addrs: Vec<u32>,
    /// The original dotted-quad strings, parallel to `addrs`.
    pub raw: Vec<String>,
    /// Rows dropped as malformed.
    pub skipped: usize,
}

/// Load `ip,used_prefix` rows; the second column is ignored.
pub fn load_ips(path: &Path) -> Result<IpLoad, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut addrs = Vec::new();
    let mut raw = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if line_no == 0 && line.starts_with("ip") {
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let ip_str = match line.split_once(',') {
            Some((ip, _)) => ip,
            None => line.as_str(),
        };
        match parse_ipv4(ip_str) {
            Some(addr) => {
                raw.push(ip_str.to_owned());
                addrs.push(addr);
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "dropped malformed ip rows");
    }

    Ok(IpLoad { addrs, raw, skipped })
}

/// How match rows render their second column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// `1` for a match, `-1` for none.
    Fast,
    /// The 128-char value hex, or `-1` for none.
    Check,
}

/// Write the match file: one row per queried address, input order.
pub fn write_matches(
    path: &Path,
    ips: &IpLoad,
    results: &[Option<KeyId>],
    pool: &KeyPool,
    mode: MatchMode,
) -> std::io::Result<()> {
    debug_assert_eq!(ips.raw.len(), results.len());

    ensure_parent(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(b"ip,key\n")?;
    for (ip_str, result) in ips.raw.iter().zip(results) {
        match (mode, result) {
            (MatchMode::Fast, Some(_)) => writeln!(out, "{ip_str},1")?,
            (MatchMode::Check, Some(id)) => writeln!(out, "{ip_str},{}", pool.hex(*id))?,
            (_, None) => writeln!(out, "{ip_str},-1")?,
        }
    }
    out.flush()
}

/// Append one row to an accumulating results CSV, writing `header` first
/// when the file does not exist yet.
pub fn append_csv_row(path: &Path, header: &str, row: &str) -> std::io::Result<()> {
    ensure_parent(path)?;
    let new_file = !path.exists();
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    if new_file {
        writeln!(out, "{header}")?;
    }
    writeln!(out, "{row}")
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_sorts_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let key_a = "aa".repeat(64);
        let key_b = "bb".repeat(64);
        let content = format!(
            "prefix,key\n\
             10.0.0.0/8,{key_a}\n\
             10.1.2.0/24,{key_b}\n\
             bad-row\n\
             10.9.0.0/33,{key_a}\n\
             10.9.0.0/16,deadbeef\n\
             10.1.0.0/16,{key_a}\n"
        );
        let path = write_file(&dir, "prefix_table.csv", &content);

        let mut pool = KeyPool::new();
        let load = load_prefixes(&path, &mut pool).unwrap();

        assert_eq!(load.skipped, 3);
        let lens: Vec<u8> = load.records.iter().map(|r| r.prefix.len()).collect();
        assert_eq!(lens, vec![24, 16, 8]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn duplicate_prefix_keeps_last_value() {
        let dir = tempfile::tempdir().unwrap();
        let key_a = "aa".repeat(64);
        let key_b = "bb".repeat(64);
        let content =
            format!("prefix,key\n10.0.0.0/8,{key_a}\n10.0.0.0/8,{key_b}\n");
        let path = write_file(&dir, "prefix_table.csv", &content);

        let mut pool = KeyPool::new();
        let load = load_prefixes(&path, &mut pool).unwrap();

        assert_eq!(load.records.len(), 1);
        assert_eq!(pool.get(load.records[0].key), &[0xBB; 64]);
    }

    #[test]
    fn unaligned_network_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let key = "cc".repeat(64);
        let path = write_file(
            &dir,
            "prefix_table.csv",
            &format!("prefix,key\n10.1.2.3/16,{key}\n"),
        );

        let mut pool = KeyPool::new();
        let load = load_prefixes(&path, &mut pool).unwrap();
        assert_eq!(load.records[0].prefix.to_string(), "10.1.0.0/16");
    }

    #[test]
    fn ip_loader_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "generated_ips.csv",
            "ip,used_prefix\n10.1.2.3,10.0.0.0/8\n8.8.8.8,\nnot-an-ip,x\n1.2.3.4,y\n",
        );

        let load = load_ips(&path).unwrap();
        assert_eq!(load.skipped, 1);
        assert_eq!(load.raw, vec!["10.1.2.3", "8.8.8.8", "1.2.3.4"]);
        assert_eq!(load.addrs[1], u32::from(std::net::Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn missing_input_is_an_open_error() {
        let mut pool = KeyPool::new();
        let err = load_prefixes(Path::new("/no/such/file.csv"), &mut pool).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn match_file_modes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = KeyPool::new();
        let k = pool.intern_bytes([0xAB; 64]);

        let ips = IpLoad {
            addrs: vec![1, 2],
            raw: vec!["0.0.0.1".into(), "0.0.0.2".into()],
            skipped: 0,
        };
        let results = vec![Some(k), None];

        let fast = dir.path().join("fast.csv");
        write_matches(&fast, &ips, &results, &pool, MatchMode::Fast).unwrap();
        let mut s = String::new();
        File::open(&fast).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "ip,key\n0.0.0.1,1\n0.0.0.2,-1\n");

        let check = dir.path().join("check.csv");
        write_matches(&check, &ips, &results, &pool, MatchMode::Check).unwrap();
        let mut s = String::new();
        File::open(&check).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, format!("ip,key\n0.0.0.1,{}\n0.0.0.2,-1\n", "ab".repeat(64)));
    }

    #[test]
    fn results_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        append_csv_row(&path, "a,b", "1,2").unwrap();
        append_csv_row(&path, "a,b", "3,4").unwrap();

        let mut s = String::new();
        File::open(&path).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "a,b\n1,2\n3,4\n");
    }
}
