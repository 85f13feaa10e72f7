use clap::Parser;
use primegen::cancel::{CancelFlag, CancelLike};
use primegen::config::{CacheBudget, GeneratorConfig, StoreConfig};
use primegen::engine::GenerationEngine;
use primegen::events::{CheckpointWritten, ProgressListenerLike};
use primegen::primality::PrimalityTester;
use primegen::PrimeError;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::UNIX_EPOCH;

#[derive(Parser)]
#[command(name = "primegen")]
#[command(about = "Incremental prime generator with durable checkpoint files", long_about = None)]
struct Cli {
    /// Directory holding the checkpoint files
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Primes per checkpoint file
    #[arg(long)]
    capacity: Option<usize>,
    /// Checkpoint file name prefix
    #[arg(long)]
    prefix: Option<String>,
    /// Checkpoint file extension (without the dot)
    #[arg(long)]
    extension: Option<String>,
    /// Maximum primes held in memory; derived from system RAM when omitted
    #[arg(long)]
    max_cached: Option<usize>,
    /// Worker threads for trial division
    #[arg(long)]
    workers: Option<usize>,
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Presentation layer over the engine's event surface.
struct ConsoleListener;

impl ProgressListenerLike for ConsoleListener {
    fn load_started(&mut self, total_files: usize) {
        if total_files == 0 {
            println!("[primegen] No checkpoint files found, starting from scratch");
        } else {
            println!("[primegen] Loading {} checkpoint file(s)...", total_files);
        }
    }

    fn load_progress(&mut self, file_ordinal: usize, total_files: usize) {
        println!("[primegen] Loading file {}/{}...", file_ordinal, total_files);
    }

    fn load_finished(&mut self, primes_loaded: usize, files_loaded: usize) {
        println!(
            "[primegen] Loaded {} prime(s) from {} file(s)",
            primes_loaded, files_loaded
        );
    }

    fn generation_started(&mut self) {
        println!("[primegen] Generation started (press Enter to stop)");
    }

    fn checkpoint_written(&mut self, event: &CheckpointWritten) {
        let timestamp = event
            .completed_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        println!(
            "[primegen] Checkpoint file {}: primes {}..{} at timestamp {} (+{:.1}s)",
            event.file_index,
            event.start_ordinal,
            event.end_ordinal,
            timestamp,
            event.elapsed.as_secs_f64()
        );
    }
}

fn build_config(cli: &Cli) -> Result<GeneratorConfig, PrimeError> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_json_file(path)?,
        None => GeneratorConfig {
            store: StoreConfig::default(),
            cache: CacheBudget::calculate(),
            workers: 4,
        },
    };

    if let Some(dir) = &cli.dir {
        config.store.dir = dir.clone();
    }
    if let Some(capacity) = cli.capacity {
        config.store.capacity_per_file = capacity;
    }
    if let Some(prefix) = &cli.prefix {
        config.store.file_prefix = prefix.clone();
    }
    if let Some(extension) = &cli.extension {
        config.store.file_extension = extension.trim_start_matches('.').to_string();
    }
    if let Some(max_cached) = cli.max_cached {
        config.cache = CacheBudget::with_max_primes(max_cached);
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    if config.store.capacity_per_file == 0 {
        return Err(PrimeError::InvalidInput(
            "capacity per file must be at least 1".to_string(),
        ));
    }

    Ok(config)
}

/// Watch stdin for a keypress and turn it into the cooperative cancel
/// signal. The thread is detached; it dies with the process.
fn watch_for_keypress(cancel: CancelFlag) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_ok() {
            cancel.request();
        }
    });
}

fn main() -> Result<(), PrimeError> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    println!("[primegen] Storage directory: {}", config.store.dir.display());
    println!(
        "[primegen] {} primes per file, cache budget {} primes, {} worker(s)",
        config.store.capacity_per_file, config.cache.max_primes, config.workers
    );

    let cancel = CancelFlag::new();
    watch_for_keypress(cancel.clone());

    let mut engine = GenerationEngine::new(
        config.store,
        config.cache,
        PrimalityTester::new(config.workers),
        cancel.clone(),
        ConsoleListener,
    );

    match engine.run() {
        Ok(summary) => {
            if cancel.cancel_requested() {
                println!("[primegen] Cancelled by user");
            }
            println!(
                "[primegen] Stopped with {} prime(s) in memory ({} new), next candidate {}",
                summary.primes_in_memory, summary.primes_discovered, summary.next_candidate
            );
            Ok(())
        }
        Err(err) => {
            // The fatal wrapper carries the candidate that was in flight;
            // this is the diagnostic log the core itself never writes.
            eprintln!("[primegen] {}", err);
            Err(err)
        }
    }
}
