//! Synthesize a prefix table: unique random aligned prefixes, each tagged
//! with a random 64-byte key, written sorted by descending length (the
//! order the direct-index builders expect).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lpm_bench::bench::{self, random_key, random_prefix};
use lpm_bench::key_pool::{KeyId, KeyPool};
use lpm_bench::prefix::Prefix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "prefix_gen", about = "Generate a random prefix table CSV")]
struct Args {
    /// Number of unique prefixes.
    #[arg(default_value_t = 10_000)]
    count: usize,

    /// Output CSV.
    #[arg(long, default_value = "data/prefix_table.csv")]
    output: PathBuf,

    /// Shortest prefix length generated.
    #[arg(long, default_value_t = 8)]
    min_len: u8,

    /// Longest prefix length generated.
    #[arg(long, default_value_t = 32)]
    max_len: u8,

    /// Seed for the generator (default: entropy).
    #[arg(long)]
    seed: Option<u64>,
}

fn run(args: &Args) -> std::io::Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut pool = KeyPool::new();

    let mut seen: HashSet<Prefix> = HashSet::with_capacity(args.count);
    let mut entries: Vec<(Prefix, KeyId)> = Vec::with_capacity(args.count);
    // Narrow length ranges can hold fewer distinct prefixes than asked
    // for; stop retrying after a generous number of collisions.
    let mut attempts = 0usize;
    let max_attempts = args.count.saturating_mul(64).max(1 << 20);
    while entries.len() < args.count && attempts < max_attempts {
        attempts += 1;
        let prefix = random_prefix(&mut rng, args.min_len, args.max_len);
        if !seen.insert(prefix) {
            continue;
        }
        entries.push((prefix, random_key(&mut rng, &mut pool)));
    }

    entries.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(&args.output)?);
    out.write_all(b"prefix,key\n")?;
    for (prefix, key) in &entries {
        writeln!(out, "{prefix},{}", pool.hex(*key))?;
    }
    out.flush()?;

    println!(
        "Generated {} unique aligned prefixes into {}",
        entries.len(),
        args.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    bench::init_logging();
    let args = Args::parse_from(bench::normalized_args());
    if args.min_len > args.max_len || args.max_len > 32 {
        error!("invalid length range {}..={}", args.min_len, args.max_len);
        return ExitCode::FAILURE;
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "generation failed");
            ExitCode::FAILURE
        }
    }
}
