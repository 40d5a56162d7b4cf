//! Binary radix trie benchmark: load the prefix table, build the trie,
//! time the lookup loop over the query addresses.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lpm_bench::bench::{self, StaticBenchConfig};
use lpm_bench::io::MatchMode;
use lpm_bench::radix::RadixTrie;

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "radix_trie", about = "Binary radix trie LPM benchmark")]
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
    #[arg(long, default_value = "benchmarks/match_radix.csv")]
    match_file: PathBuf,

    /// Results CSV, appended to across runs.
    #[arg(long, default_value = "benchmarks/results_radix.csv")]
    results_file: PathBuf,
}

fn main() -> ExitCode {
    bench::init_logging();
    let args = Args::parse_from(bench::normalized_args());

    let cfg = StaticBenchConfig {
        prefix_file: args.prefix_file,
        ip_file: args.ip_file,
        match_file: args.match_file,
        results_file: args.results_file,
        mode: if args.chk {
            MatchMode::Check
        } else {
            MatchMode::Fast
        },
    };

    match bench::run_static::<RadixTrie>(&cfg) {
        Ok(stats) => {
            stats.print_report();
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "benchmark failed");
            ExitCode::FAILURE
        }
    }
}
