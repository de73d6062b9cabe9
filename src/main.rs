use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use record_file_sort::sort::{Sort, DEFAULT_CHUNK_SIZE_BYTES};

/// Sort a tab separated record file by id and then by timestamp.
///
/// Every input line must be `id<TAB>timestamp[<TAB>payload...]` where the timestamp is a signed
/// 64 bit integer.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input file
    input: PathBuf,

    /// Output file
    #[arg(required_unless_present = "check")]
    output: Option<PathBuf>,

    /// Chunk size threshold, in bytes of line content, for the in-memory sort
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE_BYTES)]
    chunk_size_bytes: u64,

    /// Number of chunk sorting threads, 0 uses all cores
    #[arg(long, default_value_t = 0)]
    tasks: usize,

    /// Directory for intermediate files, defaults to the system temp dir
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Only check whether the input is sorted, exit with 1 when it is not
    #[arg(long)]
    check: bool,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    level
        .parse()
        .map_err(|_| format!("invalid log level: {level}"))
}

fn run(args: &Args) -> Result<ExitCode, anyhow::Error> {
    let output = args.output.clone().unwrap_or_default();
    let mut sort = Sort::new(vec![args.input.clone()], output.clone());
    sort.with_chunk_size_bytes(args.chunk_size_bytes);
    sort.with_tasks(args.tasks);
    if let Some(tmp_dir) = &args.tmp_dir {
        sort.with_tmp_dir(tmp_dir.clone());
    }

    if args.check {
        let sorted = sort.check()?;
        log::info!("{} is {}sorted", args.input.display(), if sorted { "" } else { "not " });
        return Ok(if sorted { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    log::info!("Starting sort of {}", args.input.display());
    let stats = sort.sort()?;
    log::info!(
        "Sorting completed. Output file: {}, records: {}, chunks: {}",
        output.display(),
        stats.records(),
        stats.chunks()
    );
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = SimpleLogger::new().with_level(args.log_level).init() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let start = Instant::now();
    let exit_code = match run(&args) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    };
    log::info!("Elapsed time: {:.3} seconds", start.elapsed().as_secs_f64());
    exit_code
}
