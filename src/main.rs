use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use ferrous_seedcache::cache_opt::CacheArgs;
use ferrous_seedcache::index::SuffixArrayIndex;
use ferrous_seedcache::io::fastq_reader::FastqReader;
use ferrous_seedcache::replay::Replay;

#[derive(Parser)]
#[command(name = "ferrous-seedcache")]
#[command(about = "Seed-alignment result cache for short-read aligners", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed reads against a reference through the cache hierarchy
    Replay {
        /// Reference FASTA file
        #[arg(value_name = "REF.FA")]
        reference: PathBuf,

        /// Input FASTQ file
        #[arg(value_name = "READS.FQ")]
        reads: PathBuf,

        #[command(flatten)]
        cache: CacheArgs,

        /// Write seed hits to FILE (tab-separated) instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Only print the summary
        #[arg(long)]
        no_hits: bool,

        /// Number of threads (default: all available cores)
        #[arg(short = 't', long, value_name = "INT")]
        threads: Option<usize>,

        /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
        #[arg(short = 'v', long, value_name = "INT", default_value_t = 3)]
        verbosity: i32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            reference,
            reads,
            cache,
            output,
            no_hits,
            threads,
            verbosity,
        } => {
            // Map verbosity (1=error, 2=warning, 3=message, 4=debug, 5+=trace)
            // to Rust log levels
            let log_level = match verbosity {
                v if v <= 1 => log::LevelFilter::Error,
                2 => log::LevelFilter::Warn,
                3 => log::LevelFilter::Info,
                4 => log::LevelFilter::Debug,
                _ => log::LevelFilter::Trace,
            };
            env_logger::Builder::from_default_env()
                .filter_level(log_level)
                .format_timestamp(None)
                .format_target(false)
                .init();

            let n_threads = threads.unwrap_or_else(num_cpus::get).max(1);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .context("failed to configure thread pool")?;
            let opt = cache.to_opt(n_threads);

            let start = Instant::now();
            log::info!("Indexing reference: {}", reference.display());
            let index = SuffixArrayIndex::from_fasta(&reference)
                .with_context(|| format!("failed to index {}", reference.display()))?;
            log::info!(
                "Indexed {} contigs ({} suffixes) in {:.2}s",
                index.contigs().len(),
                index.len(),
                start.elapsed().as_secs_f64()
            );

            let mut reader = FastqReader::new(&reads)
                .with_context(|| format!("failed to open {}", reads.display()))?;
            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };

            let mut replay = Replay::new(&opt, &index);
            let mut n_reads = 0usize;
            loop {
                let batch = reader
                    .read_batch(opt.batch_size)
                    .with_context(|| format!("failed to read {}", reads.display()))?;
                if batch.is_empty() {
                    break;
                }
                n_reads += batch.len();
                let results = replay.process_batch(&batch);
                if no_hits {
                    continue;
                }
                for (name, res) in batch.names.iter().zip(&results) {
                    for hit in &res.hits {
                        let Some((contig, pos)) = index.locate(hit.ref_pos) else {
                            continue;
                        };
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}\t{}",
                            name,
                            hit.query_pos,
                            if hit.is_rev { '-' } else { '+' },
                            contig.name,
                            pos
                        )?;
                    }
                }
            }
            out.flush()?;

            let stats = replay.stats();
            let cached = stats.hits + stats.misses;
            log::info!(
                "Processed {} reads, {} seeds in {:.2}s",
                n_reads,
                stats.seeds,
                start.elapsed().as_secs_f64()
            );
            log::info!(
                "Cache hits {} / {} ({:.1}%), uncacheable {}, out of memory {}, rows {}",
                stats.hits,
                cached,
                if cached > 0 {
                    100.0 * stats.hits as f64 / cached as f64
                } else {
                    0.0
                },
                stats.uncacheable,
                stats.ooms,
                stats.rows
            );
            if let Some(shared) = replay.shared() {
                log::debug!(
                    "Shared cache: {} keys, version {}",
                    shared.q_num_keys(),
                    shared.version()
                );
            }
        }
    }

    Ok(())
}
