//! DXR (DIR-16-8-8) benchmark: load the prefix table, expand it into the
//! three-stride direct-index table, time the lookup loop.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lpm_bench::bench::{self, StaticBenchConfig};
use lpm_bench::dxr::Dxr;
use lpm_bench::io::MatchMode;

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "dxr", about = "DIR-16-8-8 (DXR) direct-index LPM benchmark")]
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
    #[arg(long, default_value = "benchmarks/match_dxr.csv")]
    match_file: PathBuf,

    /// Results CSV, appended to across runs.
    #[arg(long, default_value = "benchmarks/results_dxr.csv")]
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

    match bench::run_static::<Dxr>(&cfg) {
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
