//! Synthesize query addresses: unique random addresses drawn from the
//! prefixes of an existing table, with the source prefix recorded in the
//! second column.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lpm_bench::bench;
use lpm_bench::io::{self, LoadError, PrefixLoad};
use lpm_bench::key_pool::KeyPool;
use lpm_bench::prefix::format_ipv4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, warn};

#[derive(Parser, Debug)]
#[command(name = "ip_gen", about = "Generate query addresses from a prefix table")]
struct Args {
    /// Number of unique addresses.
    count: usize,

    /// Prefix table CSV to draw from.
    #[arg(long, default_value = "data/prefix_table.csv")]
    prefix_file: PathBuf,

    /// Output CSV.
    #[arg(long, default_value = "data/generated_ips.csv")]
    output: PathBuf,

    /// Seed for the generator (default: entropy).
    #[arg(long)]
    seed: Option<u64>,
}

fn write_ips(args: &Args, prefixes: &PrefixLoad, rng: &mut StdRng) -> std::io::Result<()> {
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(&args.output)?);
    out.write_all(b"ip,used_prefix\n")?;

    let mut seen: HashSet<u32> = HashSet::with_capacity(args.count);
    let mut emitted = 0usize;
    let mut attempts = 0usize;
    // The table may cover fewer distinct addresses than requested; give
    // up after a generous number of collisions.
    let max_attempts = args.count.saturating_mul(64).max(1 << 20);

    while emitted < args.count && attempts < max_attempts {
        attempts += 1;
        let rec = prefixes.records[rng.gen_range(0..prefixes.records.len())];
        let host_bits = 32 - rec.prefix.len();
        let suffix = if host_bits == 0 {
            0
        } else {
            rng.gen_range(0..(1u64 << host_bits)) as u32
        };
        let ip = rec.prefix.net() | suffix;
        if seen.insert(ip) {
            writeln!(out, "{},{}", format_ipv4(ip), rec.prefix)?;
            emitted += 1;
        }
    }
    out.flush()?;

    if emitted < args.count {
        warn!(emitted, requested = args.count, "address space exhausted");
    }
    println!(
        "Generated {} unique addresses into {}",
        emitted,
        args.output.display()
    );
    Ok(())
}

fn run(args: &Args) -> Result<(), LoadError> {
    let mut pool = KeyPool::new();
    let prefixes = io::load_prefixes(&args.prefix_file, &mut pool)?;
    if prefixes.records.is_empty() {
        error!("prefix table is empty");
        std::process::exit(1);
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if let Err(e) = write_ips(args, &prefixes, &mut rng) {
        error!(error = %e, "cannot write {}", args.output.display());
        std::process::exit(1);
    }
    Ok(())
}

fn main() -> ExitCode {
    bench::init_logging();
    let args = Args::parse_from(bench::normalized_args());
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "generation failed");
            ExitCode::FAILURE
        }
    }
}
