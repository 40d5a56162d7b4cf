//! DXR + Bloom benchmark.
//!
//! Same phase protocol as the plain DXR run, with one extra build phase
//! for the per-stride Bloom filters and extra results columns describing
//! their sizing (`k`, `m`, population per level).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use lpm_bench::bench;
use lpm_bench::bloom::{DxrBloom, DEFAULT_BITS_PER_ELEMENT};
use lpm_bench::dxr::Dxr;
use lpm_bench::io::{self, MatchMode};
use lpm_bench::key_pool::KeyPool;
use lpm_bench::metrics::{self, PhaseTimer};
use tracing::{error, info, warn};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const RESULTS_HEADER: &str = "algorithm,prefix_file,ip_file,num_prefixes,num_ips,\
prefix_load_s,build_ds_s,build_bloom_s,ip_load_s,lookup_s,lookups_per_s,ns_per_lookup,\
mem_prefix_array_mb,mem_ds_mb,mem_bloom_mb,mem_ip_array_mb,mem_total_mb,\
bf_bits_per_elem,k_l1,k_l2,k_l3,count_l1,count_l2,count_l3,m_bits_l1,m_bits_l2,m_bits_l3";

#[derive(Parser, Debug)]
#[command(name = "dxr_bloom", about = "DXR with Bloom-filter level skipping")]
struct Args {
    /// Write the matched 128-char value hex instead of 1/-1 (slower).
    #[arg(long)]
    chk: bool,

    /// Prefix table CSV.
    #[arg(long, default_value = "data/prefix_table.csv")]
    prefix_file: PathBuf,

    /// Query address CSV.
    #[arg(long, default_value = "data/generated_ips.csv")]
    ip_file: PathBuf,

    /// Match output CSV.
    #[arg(long, default_value = "benchmarks/match_dxr_bloom.csv")]
    match_file: PathBuf,

    /// Results CSV, appended to across runs.
    #[arg(long, default_value = "benchmarks/results_dxr_bloom.csv")]
    results_file: PathBuf,
}

fn run(args: &Args) -> Result<(), io::LoadError> {
    let mode = if args.chk {
        MatchMode::Check
    } else {
        MatchMode::Fast
    };
    let mut pool = KeyPool::new();

    let timer = PhaseTimer::start();
    let prefixes = io::load_prefixes(&args.prefix_file, &mut pool)?;
    let phase_load = timer.finish();
    let num_prefixes = prefixes.records.len();
    info!(num_prefixes, skipped = prefixes.skipped, "prefix table loaded");

    let timer = PhaseTimer::start();
    let dxr = Dxr::build(&prefixes.records);
    let phase_table = timer.finish();
    drop(prefixes);

    let timer = PhaseTimer::start();
    let engine = DxrBloom::overlay(dxr);
    let phase_bloom = timer.finish();
    let (count_l1, count_l2, count_l3) = engine.dxr().populated_counts();
    info!(count_l1, count_l2, count_l3, "bloom filters seeded");

    let timer = PhaseTimer::start();
    let ips = io::load_ips(&args.ip_file)?;
    let phase_ips = timer.finish();
    let num_ips = ips.addrs.len();

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

    if let Err(e) = io::write_matches(&args.match_file, &ips, &results, &pool, mode) {
        warn!(path = %args.match_file.display(), error = %e, "cannot write match file");
    }

    let [f1, f2, f3] = engine.filters();
    let row = format!(
        "DXR-16-8-8+Bloom,{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.2},{:.2},\
         {:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{},{},{},{},{},{},{},{},{}",
        args.prefix_file.display(),
        args.ip_file.display(),
        num_prefixes,
        num_ips,
        phase_load.secs,
        phase_table.secs,
        phase_bloom.secs,
        phase_ips.secs,
        lookup_s,
        lookups_per_s,
        ns_per_lookup,
        phase_load.allocated_mb(),
        phase_table.allocated_mb(),
        phase_bloom.allocated_mb(),
        phase_ips.allocated_mb(),
        metrics::to_mb(metrics::rss_bytes()),
        DEFAULT_BITS_PER_ELEMENT,
        f1.k(),
        f2.k(),
        f3.k(),
        count_l1,
        count_l2,
        count_l3,
        f1.m_bits(),
        f2.m_bits(),
        f3.m_bits(),
    );
    if let Err(e) = io::append_csv_row(&args.results_file, RESULTS_HEADER, &row) {
        warn!(path = %args.results_file.display(), error = %e, "cannot append results row");
    }

    println!("=== DXR-16-8-8+Bloom ===");
    println!(
        "  prefixes: {num_prefixes} ({:.3}s load), lookups: {num_ips} ({:.0}/s, {:.2} ns each)",
        phase_load.secs, lookups_per_s, ns_per_lookup
    );
    println!(
        "  table:    {:.3}s build; bloom: {:.3}s, {:.2} MB (k = {}/{}/{}, m = {}/{}/{} bits)",
        phase_table.secs,
        phase_bloom.secs,
        metrics::to_mb(engine.bloom_memory_usage()),
        f1.k(),
        f2.k(),
        f3.k(),
        f1.m_bits(),
        f2.m_bits(),
        f3.m_bits(),
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
