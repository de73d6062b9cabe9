use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Error};
use benchmark_rs::benchmarks::Benchmarks;
use benchmark_rs::stopwatch::StopWatch;
use data_encoding::HEXLOWER;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simple_logger::SimpleLogger;

use record_file_sort::sort::Sort;

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone)]
pub struct BenchmarkConfig {
    files: BTreeMap<usize, PathBuf>,
    bench_results_dir: PathBuf,
    bench_tmp_dir: PathBuf,
    tasks: usize,
    chunk_size_bytes: u64,
    description: String,
}

impl BenchmarkConfig {
    pub fn new(
        files: BTreeMap<usize, PathBuf>,
        bench_results_dir: PathBuf,
        bench_tmp_dir: PathBuf,
        tasks: usize,
        chunk_size_bytes: u64,
        description: &str,
    ) -> BenchmarkConfig {
        BenchmarkConfig {
            files,
            bench_results_dir,
            bench_tmp_dir,
            tasks,
            chunk_size_bytes,
            description: description.to_string(),
        }
    }

    pub fn get_input_path(&self, key: usize) -> Result<PathBuf, Error> {
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("no input file with {} records", key))
    }
}

impl Display for BenchmarkConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "tasks: {}, chunk size: {}, description: {}",
            self.tasks, self.chunk_size_bytes, self.description,
        )
    }
}

fn temp_file_name(dir: &Path) -> PathBuf {
    dir.join(HEXLOWER.encode(&rand::random::<[u8; 16]>()))
}

fn setup(bench_input_dir: &Path, bench_results_dir: &Path, bench_tmp_dir: &Path) -> Result<(), Error> {
    if bench_results_dir.exists() {
        fs::remove_dir_all(bench_results_dir).with_context(|| anyhow!("{}", bench_results_dir.display()))?;
    }
    for dir in [bench_input_dir, bench_results_dir, bench_tmp_dir] {
        fs::create_dir_all(dir).with_context(|| anyhow!("{}", dir.display()))?;
    }
    Ok(())
}

/// Input files of `i * step` random records for i in 1..=count, reused across runs.
fn create_input_files(count: usize, step: usize, base_path: &Path) -> Result<BTreeMap<usize, PathBuf>, Error> {
    let mut files = BTreeMap::new();
    for i in 1..=count {
        let records = i * step;
        let path = base_path.join(format!("records-{}.tsv", records));
        if !path.exists() {
            let mut rng = StdRng::seed_from_u64(records as u64);
            let mut writer = BufWriter::new(
                File::create(&path).with_context(|| anyhow!("path: {}", path.display()))?,
            );
            for _ in 0..records {
                writeln!(
                    writer,
                    "user-{:05}\t{}\t{}",
                    rng.gen_range(0..10_000),
                    rng.gen_range(1_600_000_000_000i64..1_700_000_000_000),
                    HEXLOWER.encode(&rng.gen::<[u8; 24]>()),
                )?;
            }
            writer.flush()?;
        }
        files.insert(records, path);
    }
    Ok(files)
}

fn sort(stop_watch: &mut StopWatch, config: BenchmarkConfig, work: usize) -> Result<(), Error> {
    stop_watch.pause();
    let input_path = config.get_input_path(work)?;
    let output_path = temp_file_name(&config.bench_results_dir);
    log::info!("Start sorting {}", input_path.display());
    stop_watch.resume();
    let mut record_file_sort = Sort::new(vec![input_path.clone()], output_path.clone());
    record_file_sort.with_tmp_dir(config.bench_tmp_dir.clone());
    record_file_sort.with_tasks(config.tasks);
    record_file_sort.with_chunk_size_bytes(config.chunk_size_bytes);
    record_file_sort.sort()?;
    stop_watch.pause();
    log::info!("Finish sorting {}", input_path.display());
    fs::remove_file(&output_path).with_context(|| anyhow!("{}", output_path.display()))?;
    Ok(())
}

#[test]
fn record_file_sort_bench() -> Result<(), Error> {
    SimpleLogger::new().init()?;
    log::info!("Started record_file_sort_bench.");

    let bench_input_dir = PathBuf::from("./target/benchmarks/input");
    let bench_results_dir = PathBuf::from("./target/benchmarks/results");
    let bench_tmp_dir = PathBuf::from("./target/benchmarks/results/tmp");
    setup(&bench_input_dir, &bench_results_dir, &bench_tmp_dir)?;

    let small_files = create_input_files(10, 100_000, &bench_input_dir)?;
    let large_files = create_input_files(5, 2_000_000, &bench_input_dir)?;

    let mut benchmarks = Benchmarks::new("record-file-sort");
    for (name, files, chunk_size_bytes) in [
        ("small-files", &small_files, 4 * 1024 * 1024),
        ("large-files", &large_files, 32 * 1024 * 1024),
    ] {
        for tasks in [1, 2, 4, 8] {
            benchmarks.add(
                &format!("{}-{}-tasks", name, tasks),
                sort,
                BenchmarkConfig::new(
                    files.clone(),
                    bench_results_dir.clone(),
                    bench_tmp_dir.clone(),
                    tasks,
                    chunk_size_bytes,
                    name,
                ),
                files.keys().cloned().collect(),
                3,
                0,
            )?;
        }
    }

    benchmarks.run()?;
    benchmarks.save_to_csv(PathBuf::from("./target/benchmarks/"), true, true)?;
    benchmarks.save_to_json(PathBuf::from("./target/benchmarks/"))?;

    log::info!("Finished record_file_sort_bench.");
    Ok(())
}
