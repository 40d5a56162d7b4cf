//! Shared driver for the benchmark binaries.
//!
//! Every static engine binary runs the same four phases — load prefixes,
//! build the structure, load query addresses, run the timed lookup loop —
//! then writes the match file and appends one row to its results CSV.
//! The phase protocol lives here once; binaries supply the engine type,
//! the paths, and the output mode.

use std::path::PathBuf;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{info, warn};

use crate::engine::{DynamicLpmEngine, LpmEngine};
use crate::io::{self, LoadError, MatchMode};
use crate::key_pool::{KeyId, KeyPool};
use crate::metrics::{self, PhaseTimer};
use crate::prefix::Prefix;

/// Rewritten process arguments: the legacy single-dash `-chk` spelling is
/// mapped to `--chk` so the clap-derived parsers accept both.
pub fn normalized_args() -> Vec<String> {
    std::env::args()
        .map(|a| if a == "-chk" { "--chk".to_owned() } else { a })
        .collect()
}

/// Install the stderr tracing subscriber (RUST_LOG overrides, default
/// `info`). Stdout stays reserved for the benchmark report.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Paths and mode for one static engine run.
pub struct StaticBenchConfig {
    /// Prefix table CSV.
    pub prefix_file: PathBuf,
    /// Query address CSV.
    pub ip_file: PathBuf,
    /// Match output CSV.
    pub match_file: PathBuf,
    /// Accumulating results CSV.
    pub results_file: PathBuf,
    /// Fast (`1`/`-1`) or check (hex) match rows.
    pub mode: MatchMode,
}

/// Header of the per-engine results CSV.
pub const RESULTS_HEADER: &str = "algorithm,prefix_file,ip_file,num_prefixes,num_ips,\
prefix_load_s,build_ds_s,ip_load_s,lookup_s,lookups_per_s,ns_per_lookup,\
mem_prefix_array_mb,mem_ds_mb,mem_ip_array_mb,mem_total_mb";

/// Measurements of one static engine run.
pub struct StaticRunStats {
    /// Algorithm name written to the CSV.
    pub algorithm: &'static str,
    /// Records loaded (after dedup).
    pub num_prefixes: usize,
    /// Addresses queried.
    pub num_ips: usize,
    /// Phase A seconds.
    pub prefix_load_s: f64,
    /// Phase B seconds.
    pub build_ds_s: f64,
    /// Phase C seconds.
    pub ip_load_s: f64,
    /// Phase D seconds.
    pub lookup_s: f64,
    /// Queries per second over phase D.
    pub lookups_per_s: f64,
    /// Mean nanoseconds per query.
    pub ns_per_lookup: f64,
    /// Allocation growth while loading prefixes (MB).
    pub mem_prefix_array_mb: f64,
    /// Allocation growth while building the structure (MB).
    pub mem_ds_mb: f64,
    /// Allocation growth while loading addresses (MB).
    pub mem_ip_array_mb: f64,
    /// End-of-run resident set size (MB).
    pub mem_total_mb: f64,
    /// The structure's own accounting of its heap usage (MB).
    pub ds_reported_mb: f64,
}

impl StaticRunStats {
    /// The CSV row matching [`RESULTS_HEADER`].
    pub fn row(&self, cfg: &StaticBenchConfig) -> String {
        format!(
            "{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
            self.algorithm,
            cfg.prefix_file.display(),
            cfg.ip_file.display(),
            self.num_prefixes,
            self.num_ips,
            self.prefix_load_s,
            self.build_ds_s,
            self.ip_load_s,
            self.lookup_s,
            self.lookups_per_s,
            self.ns_per_lookup,
            self.mem_prefix_array_mb,
            self.mem_ds_mb,
            self.mem_ip_array_mb,
            self.mem_total_mb,
        )
    }

    /// Human-readable run summary on stdout.
    pub fn print_report(&self) {
        println!("=== {} ===", self.algorithm);
        println!(
            "  prefixes: {} ({:.3}s load, {:.2} MB)",
            self.num_prefixes, self.prefix_load_s, self.mem_prefix_array_mb
        );
        println!(
            "  build:    {:.3}s, {:.2} MB allocated ({:.2} MB self-reported)",
            self.build_ds_s, self.mem_ds_mb, self.ds_reported_mb
        );
        println!(
            "  lookups:  {} in {:.3}s ({:.0}/s, {:.2} ns each)",
            self.num_ips, self.lookup_s, self.lookups_per_s, self.ns_per_lookup
        );
        println!("  rss:      {:.2} MB", self.mem_total_mb);
    }
}

/// Run the four-phase protocol for engine `E` and append its results row.
///
/// Unwriteable outputs are logged and do not fail the run; missing inputs
/// do.
pub fn run_static<E: LpmEngine>(cfg: &StaticBenchConfig) -> Result<StaticRunStats, LoadError> {
    let mut pool = KeyPool::new();

    let timer = PhaseTimer::start();
    let prefixes = io::load_prefixes(&cfg.prefix_file, &mut pool)?;
    let phase_load = timer.finish();
    let num_prefixes = prefixes.records.len();
    info!(
        num_prefixes,
        skipped = prefixes.skipped,
        secs = phase_load.secs,
        "prefix table loaded"
    );

    let timer = PhaseTimer::start();
    let engine = E::build(&prefixes.records);
    let phase_build = timer.finish();
    info!(secs = phase_build.secs, "{} built", E::NAME);
    // Release the record batch so it stops counting against the run; the
    // values themselves stay in the pool.
    drop(prefixes);

    let timer = PhaseTimer::start();
    let ips = io::load_ips(&cfg.ip_file)?;
    let phase_ips = timer.finish();
    let num_ips = ips.addrs.len();
    info!(num_ips, skipped = ips.skipped, "query addresses loaded");

    let t0 = Instant::now();
    let mut results = Vec::with_capacity(num_ips);
    for &ip in &ips.addrs {
        results.push(engine.lookup(ip));
    }
    let lookup_s = t0.elapsed().as_secs_f64();

    let ns_per_lookup = if num_ips == 0 {
        0.0
    } else {
        lookup_s * 1e9 / num_ips as f64
    };
    let lookups_per_s = if lookup_s > 0.0 {
        num_ips as f64 / lookup_s
    } else {
        0.0
    };

    if let Err(e) = io::write_matches(&cfg.match_file, &ips, &results, &pool, cfg.mode) {
        warn!(path = %cfg.match_file.display(), error = %e, "cannot write match file");
    }

    let stats = StaticRunStats {
        algorithm: E::NAME,
        num_prefixes,
        num_ips,
        prefix_load_s: phase_load.secs,
        build_ds_s: phase_build.secs,
        ip_load_s: phase_ips.secs,
        lookup_s,
        lookups_per_s,
        ns_per_lookup,
        mem_prefix_array_mb: phase_load.allocated_mb(),
        mem_ds_mb: phase_build.allocated_mb(),
        mem_ip_array_mb: phase_ips.allocated_mb(),
        mem_total_mb: metrics::to_mb(metrics::rss_bytes()),
        ds_reported_mb: metrics::to_mb(engine.memory_usage()),
    };

    if let Err(e) = io::append_csv_row(&cfg.results_file, RESULTS_HEADER, &stats.row(cfg)) {
        warn!(path = %cfg.results_file.display(), error = %e, "cannot append results row");
    }

    Ok(stats)
}

/// Header of the mixed-workload simulator CSV.
pub const SIM_HEADER: &str =
    "write_per_read_ratio,num_ops,num_lookups,num_writes,avg_lookup_ns,avg_write_ns,avg_total_ns";

/// Parameters of a mixed insert/delete/lookup workload.
pub struct SimConfig {
    /// Lookups between consecutive writes (`1:n` ratio).
    pub lookups_per_write: u32,
    /// Total operations.
    pub num_ops: u64,
}

/// Measurements of a mixed workload run.
pub struct SimStats {
    /// Total operations executed.
    pub num_ops: u64,
    /// Lookup operations.
    pub num_lookups: u64,
    /// Write (insert or delete) operations.
    pub num_writes: u64,
    /// Mean lookup latency.
    pub avg_lookup_ns: f64,
    /// Mean write latency.
    pub avg_write_ns: f64,
    /// Mean latency across all operations.
    pub avg_total_ns: f64,
}

impl SimStats {
    /// The CSV row matching [`SIM_HEADER`].
    pub fn row(&self, lookups_per_write: u32) -> String {
        format!(
            "1:{},{},{},{},{:.2},{:.2},{:.2}",
            lookups_per_write,
            self.num_ops,
            self.num_lookups,
            self.num_writes,
            self.avg_lookup_ns,
            self.avg_write_ns,
            self.avg_total_ns,
        )
    }

    /// Human-readable summary on stdout.
    pub fn print_report(&self, lookups_per_write: u32) {
        println!(
            "Ratio 1:{}  Lookups={}  Writes={}",
            lookups_per_write, self.num_lookups, self.num_writes
        );
        println!(
            "Avg lookup = {:.2} ns, Avg write = {:.2} ns, Overall = {:.2} ns/op",
            self.avg_lookup_ns, self.avg_write_ns, self.avg_total_ns
        );
    }
}

/// A random aligned prefix with length drawn from `min_len..=max_len`.
pub fn random_prefix(rng: &mut StdRng, min_len: u8, max_len: u8) -> Prefix {
    let len = rng.gen_range(min_len..=max_len);
    Prefix::new(rng.gen::<u32>(), len)
}

/// A fresh random 64-byte value interned into `pool`.
pub fn random_key(rng: &mut StdRng, pool: &mut KeyPool) -> KeyId {
    let mut bytes = [0u8; 64];
    rng.fill(&mut bytes[..]);
    pool.intern_bytes(bytes)
}

/// Drive `engine` through an interleaved workload: every `(n+1)`-th
/// operation is a write, alternating insert and delete of the same
/// random prefix pair; the rest are lookups of addresses sampled from
/// `ips`. Per-operation latency is measured inside the loop.
pub fn run_sim<E: DynamicLpmEngine>(
    engine: &mut E,
    ips: &[u32],
    cfg: &SimConfig,
    pool: &mut KeyPool,
    rng: &mut StdRng,
) -> SimStats {
    assert!(!ips.is_empty(), "no query addresses loaded");
    let n = cfg.lookups_per_write as u64;

    // Pre-sample the lookup sequence so rng cost stays out of the timing.
    let lookup_seq: Vec<u32> = (0..cfg.num_ops)
        .map(|_| ips[rng.gen_range(0..ips.len())])
        .collect();

    let expected_writes = (cfg.num_ops / (n + 1)).max(1);
    struct DynPrefix {
        prefix: Prefix,
        key: Option<KeyId>,
    }
    let mut dyn_prefixes: Vec<DynPrefix> = (0..expected_writes / 2 + 8)
        .map(|_| DynPrefix {
            prefix: random_prefix(rng, 8, 32),
            key: None,
        })
        .collect();

    let mut total_lookup_ns = 0u64;
    let mut total_write_ns = 0u64;
    let mut num_lookups = 0u64;
    let mut num_writes = 0u64;
    let mut pair_idx = 0usize;

    let t_all = Instant::now();
    for i in 0..cfg.num_ops {
        if i % (n + 1) == 0 {
            if pair_idx >= dyn_prefixes.len() {
                warn!("write workload exhausted early");
                break;
            }
            let t0 = Instant::now();
            if num_writes % 2 == 0 {
                let pair = &mut dyn_prefixes[pair_idx];
                let key = *pair
                    .key
                    .get_or_insert_with(|| random_key(rng, pool));
                engine.insert(pair.prefix, key);
            } else {
                engine.remove(dyn_prefixes[pair_idx].prefix);
                pair_idx += 1;
            }
            total_write_ns += t0.elapsed().as_nanos() as u64;
            num_writes += 1;
        } else {
            let ip = lookup_seq[i as usize];
            let t0 = Instant::now();
            std::hint::black_box(engine.lookup(ip));
            total_lookup_ns += t0.elapsed().as_nanos() as u64;
            num_lookups += 1;
        }
    }
    let elapsed_ns = t_all.elapsed().as_nanos() as u64;

    SimStats {
        num_ops: num_lookups + num_writes,
        num_lookups,
        num_writes,
        avg_lookup_ns: if num_lookups > 0 {
            total_lookup_ns as f64 / num_lookups as f64
        } else {
            0.0
        },
        avg_write_ns: if num_writes > 0 {
            total_write_ns as f64 / num_writes as f64
        } else {
            0.0
        },
        avg_total_ns: elapsed_ns as f64 / cfg.num_ops.max(1) as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicDir24_8;
    use crate::radix::RadixTrie;
    use rand::SeedableRng;

    #[test]
    fn sim_counts_add_up() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = KeyPool::new();
        let mut trie = RadixTrie::new();
        let ips: Vec<u32> = (0..64).map(|i| i * 0x0101_0101).collect();

        let cfg = SimConfig {
            lookups_per_write: 3,
            num_ops: 1000,
        };
        let stats = run_sim(&mut trie, &ips, &cfg, &mut pool, &mut rng);

        assert_eq!(stats.num_ops, 1000);
        assert_eq!(stats.num_writes, 250);
        assert_eq!(stats.num_lookups, 750);
    }

    #[test]
    fn sim_leaves_dynamic_table_consistent() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut pool = KeyPool::new();
        let mut engine = DynamicDir24_8::new();
        let base = pool.intern_bytes([1; 64]);
        engine.insert("10.0.0.0/8".parse().unwrap(), base);

        let ips: Vec<u32> = (0..32).map(|i| 0x0A00_0000 | i).collect();
        let cfg = SimConfig {
            lookups_per_write: 2,
            num_ops: 300,
        };
        let stats = run_sim(&mut engine, &ips, &cfg, &mut pool, &mut rng);
        assert_eq!(stats.num_ops, 300);

        // Every workload pair is inserted then deleted, so after the run
        // the table still answers through whatever baseline remains.
        engine.insert("10.0.0.0/8".parse().unwrap(), base);
        assert_eq!(engine.lookup(0x0A00_0000), Some(base));
    }

    #[test]
    fn sim_row_format() {
        let stats = SimStats {
            num_ops: 10,
            num_lookups: 8,
            num_writes: 2,
            avg_lookup_ns: 100.0,
            avg_write_ns: 2000.0,
            avg_total_ns: 480.0,
        };
        assert_eq!(stats.row(4), "1:4,10,8,2,100.00,2000.00,480.00");
    }
}
