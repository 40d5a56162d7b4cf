//! Mixed-workload simulator for the binary radix trie: the same
//! interleaved insert/delete/lookup protocol as the DIR-24-8 simulator,
//! against the trie directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lpm_bench::bench::{self, SimConfig, SIM_HEADER};
use lpm_bench::io::{self, LoadError};
use lpm_bench::key_pool::KeyPool;
use lpm_bench::radix::RadixTrie;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "sim_radix",
    about = "Binary radix trie mixed insert/delete/lookup workload"
)]
struct Args {
    /// Lookups per write (the `1:n` ratio).
    lookups_per_write: u32,

    /// Total operations.
    #[arg(default_value_t = 1_000_000)]
    num_ops: u64,

    /// Prefix table CSV for the baseline FIB.
    #[arg(long, default_value = "data/prefix_table.csv")]
    prefix_file: PathBuf,

    /// Query address CSV.
    #[arg(long, default_value = "data/generated_ips.csv")]
    ip_file: PathBuf,

    /// Simulation results CSV, appended to across runs.
    #[arg(long, default_value = "benchmarks/sim_radix.csv")]
    sim_file: PathBuf,

    /// Seed for the workload generator (default: entropy).
    #[arg(long)]
    seed: Option<u64>,
}

fn run(args: &Args) -> Result<(), LoadError> {
    if args.lookups_per_write == 0 {
        error!("lookups-per-write must be > 0");
        std::process::exit(1);
    }

    let mut pool = KeyPool::new();
    let prefixes = io::load_prefixes(&args.prefix_file, &mut pool)?;
    let mut trie = RadixTrie::new();
    for rec in &prefixes.records {
        trie.insert(rec.prefix, rec.key);
    }
    info!(baseline = trie.len(), "baseline FIB installed");
    drop(prefixes);

    let ips = io::load_ips(&args.ip_file)?;
    if ips.addrs.is_empty() {
        error!("no query addresses loaded");
        std::process::exit(1);
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let cfg = SimConfig {
        lookups_per_write: args.lookups_per_write,
        num_ops: args.num_ops,
    };
    let stats = bench::run_sim(&mut trie, &ips.addrs, &cfg, &mut pool, &mut rng);

    stats.print_report(args.lookups_per_write);
    if let Err(e) = io::append_csv_row(&args.sim_file, SIM_HEADER, &stats.row(args.lookups_per_write))
    {
        warn!(path = %args.sim_file.display(), error = %e, "cannot append sim row");
    }
    Ok(())
}

fn main() -> ExitCode {
    bench::init_logging();
    let args = Args::parse_from(bench::normalized_args());
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
