//! Standalone operation benchmark for the binary radix trie.
//!
//! Times separate insert, lookup and delete loops, then a mixed loop with
//! per-operation clocks, and reports both batch ratios (from the
//! standalone loops) and streaming ratios (measured inside the mixed
//! loop).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use lpm_bench::bench::{self, random_key, random_prefix};
use lpm_bench::io::{self, LoadError};
use lpm_bench::key_pool::{KeyId, KeyPool};
use lpm_bench::prefix::Prefix;
use lpm_bench::radix::RadixTrie;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const RESULTS_HEADER: &str = "algorithm,num_prefixes,num_ops,num_ips,\
insert_time,lookup_time,delete_time,mixed_time,\
insert_ops_per_s,lookup_ops_per_s,delete_ops_per_s,mixed_ops_per_s,\
insert_ns_per_op,lookup_ns_per_op,delete_ns_per_op,mixed_ns_per_op,\
batch_ratio_insert,batch_ratio_lookup,batch_ratio_delete,\
stream_ratio_insert,stream_ratio_lookup,stream_ratio_delete";

#[derive(Parser, Debug)]
#[command(name = "ops_radix", about = "Radix trie insert/lookup/delete throughput")]
struct Args {
    /// Random prefixes per operation loop.
    #[arg(default_value_t = 100_000)]
    num_ops: usize,

    /// Prefix table CSV for the baseline FIB.
    #[arg(long, default_value = "data/prefix_table.csv")]
    prefix_file: PathBuf,

    /// Query address CSV.
    #[arg(long, default_value = "data/generated_ips.csv")]
    ip_file: PathBuf,

    /// Results CSV, appended to across runs.
    #[arg(long, default_value = "benchmarks/ops_results_radix.csv")]
    results_file: PathBuf,

    /// Seed for the workload generator (default: entropy).
    #[arg(long)]
    seed: Option<u64>,
}

fn run(args: &Args) -> Result<(), LoadError> {
    let mut pool = KeyPool::new();
    let prefixes = io::load_prefixes(&args.prefix_file, &mut pool)?;
    let num_prefixes = prefixes.records.len();

    let mut trie = RadixTrie::new();
    for rec in &prefixes.records {
        trie.insert(rec.prefix, rec.key);
    }
    info!(num_prefixes, "baseline trie built");
    drop(prefixes);

    let ips = io::load_ips(&args.ip_file)?;
    let num_ips = ips.addrs.len();
    if num_ips == 0 {
        error!("no query addresses loaded");
        std::process::exit(1);
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let n = args.num_ops;
    let workload: Vec<(Prefix, KeyId)> = (0..n)
        .map(|_| {
            let prefix = random_prefix(&mut rng, 0, 32);
            (prefix, random_key(&mut rng, &mut pool))
        })
        .collect();

    // Standalone loops.
    let t0 = Instant::now();
    for &(prefix, key) in &workload {
        trie.insert(prefix, key);
    }
    let insert_time = t0.elapsed().as_secs_f64();

    let t0 = Instant::now();
    for &ip in &ips.addrs {
        std::hint::black_box(trie.lookup(ip));
    }
    let lookup_time = t0.elapsed().as_secs_f64();

    let t0 = Instant::now();
    for &(prefix, _) in &workload {
        trie.remove(prefix);
    }
    let delete_time = t0.elapsed().as_secs_f64();

    // Mixed loop with per-operation clocks.
    let mut mix_insert_ns = 0u64;
    let mut mix_lookup_ns = 0u64;
    let mut mix_delete_ns = 0u64;
    let t_mix = Instant::now();
    for (i, &(prefix, key)) in workload.iter().enumerate() {
        let t0 = Instant::now();
        trie.insert(prefix, key);
        mix_insert_ns += t0.elapsed().as_nanos() as u64;

        let t0 = Instant::now();
        std::hint::black_box(trie.lookup(ips.addrs[i % num_ips]));
        mix_lookup_ns += t0.elapsed().as_nanos() as u64;

        let t0 = Instant::now();
        trie.remove(prefix);
        mix_delete_ns += t0.elapsed().as_nanos() as u64;
    }
    let mixed_time = t_mix.elapsed().as_secs_f64();
    let mix_total_ns = (mix_insert_ns + mix_lookup_ns + mix_delete_ns).max(1);

    // Batch ratios from standalone per-op costs, streaming ratios from
    // the clocks inside the mixed loop.
    let insert_per_op = insert_time / n as f64;
    let lookup_per_op = lookup_time / num_ips as f64;
    let delete_per_op = delete_time / n as f64;
    let total_batch = insert_per_op + lookup_per_op + delete_per_op;

    let row = format!(
        "BinaryRadixTrie,{},{},{},\
         {:.9},{:.9},{:.9},{:.9},\
         {:.2},{:.2},{:.2},{:.2},\
         {:.2},{:.2},{:.2},{:.2},\
         {:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
        num_prefixes,
        n,
        num_ips,
        insert_time,
        lookup_time,
        delete_time,
        mixed_time,
        n as f64 / insert_time,
        num_ips as f64 / lookup_time,
        n as f64 / delete_time,
        (3 * n) as f64 / mixed_time,
        insert_per_op * 1e9,
        lookup_per_op * 1e9,
        delete_per_op * 1e9,
        mixed_time / n as f64 * 1e9,
        insert_per_op / total_batch,
        lookup_per_op / total_batch,
        delete_per_op / total_batch,
        mix_insert_ns as f64 / mix_total_ns as f64,
        mix_lookup_ns as f64 / mix_total_ns as f64,
        mix_delete_ns as f64 / mix_total_ns as f64,
    );
    if let Err(e) = io::append_csv_row(&args.results_file, RESULTS_HEADER, &row) {
        warn!(path = %args.results_file.display(), error = %e, "cannot append results row");
    }

    println!(
        "Insert: {insert_time:.6}s, Lookup: {lookup_time:.6}s, \
         Delete: {delete_time:.6}s, Mixed: {mixed_time:.6}s"
    );
    println!(
        "Batch ratios:     insert={:.3} lookup={:.3} delete={:.3}",
        insert_per_op / total_batch,
        lookup_per_op / total_batch,
        delete_per_op / total_batch,
    );
    println!(
        "Streaming ratios: insert={:.3} lookup={:.3} delete={:.3}",
        mix_insert_ns as f64 / mix_total_ns as f64,
        mix_lookup_ns as f64 / mix_total_ns as f64,
        mix_delete_ns as f64 / mix_total_ns as f64,
    );
    Ok(())
}

fn main() -> ExitCode {
    bench::init_logging();
    let args = Args::parse_from(bench::normalized_args());
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "benchmark failed");
            ExitCode::FAILURE
        }
    }
}
