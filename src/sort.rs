use std::cmp::{max, min};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use regex::bytes::Regex;
use rlimit::{getrlimit, setrlimit, Resource};
use tempfile::{Builder, NamedTempFile};

use crate::config::Config;
use crate::error::SortError;
use crate::line_reader::LineReader;
use crate::merge::{copy_sorted_file, merge_sorted_files};
use crate::partition::Partitioner;
use crate::record::LineRecord;
use crate::sort_command::{SortCommand, SortOutcomes};
use crate::sorted_chunk_file::SortedChunkFile;

/// Default chunk size, 100 MiB of line content.
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 100 * 1024 * 1024;

const TMP_PREFIX: &str = "record-file-sort-";

/// Summary of a completed sort or merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortStats {
    records: usize,
    chunks: usize,
}

impl SortStats {
    pub fn new(records: usize, chunks: usize) -> SortStats {
        SortStats { records, chunks }
    }

    /// Number of records written to the output.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Number of sorted chunks, or input files for a merge.
    pub fn chunks(&self) -> usize {
        self.chunks
    }
}

/// Raise the soft NOFILE limit to at least `required`, capped at the hard limit.
///
/// The limit is process wide and is never lowered, so sorts running at the same time in one
/// process only ever raise it for each other.
fn raise_open_files_limit(required: u64) -> Result<(), anyhow::Error> {
    let (soft, hard) = getrlimit(Resource::NOFILE).with_context(|| "getrlimit")?;
    log::info!("Current rlimit NOFILE, soft: {}, hard: {}", soft, hard);
    let new_soft = min(max(required, soft), hard);
    if new_soft <= soft {
        return Ok(());
    }
    log::info!("Set new rlimit NOFILE, soft: {}, hard: {}", new_soft, hard);
    setrlimit(Resource::NOFILE, new_soft, hard)
        .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", new_soft, hard))?;
    Ok(())
}

fn is_cancellation(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<SortError>(), Some(SortError::Cancelled))
}

/// Sort a tab separated record file by id and then by timestamp
///
/// Each line is a record of at least two tab separated fields, an id and a signed 64 bit
/// timestamp, followed by an optional payload. The input is split into chunks of bounded size,
/// each chunk is sorted in memory on a pool of worker threads and the sorted chunks are merged
/// into the output.
///
/// Intermediate files live in a private directory under the tmp dir and are removed when the
/// sort completes or fails. The output is written next to its final path and renamed into place
/// only after the merge succeeds.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use record_file_sort::sort::Sort;
///
/// fn sort_records(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut sort = Sort::new(vec![input], output);
///     // number of threads sorting chunks, the default of zero uses all cores
///     sort.with_tasks(2);
///     // for large files prefer a tmp dir on the same file system as the output
///     sort.with_tmp_dir(tmp);
///     sort.with_chunk_size_mib(64);
///     let stats = sort.sort()?;
///     println!("sorted {} records in {} chunks", stats.records(), stats.chunks());
///     Ok(())
/// }
/// ```
pub struct Sort {
    input_files: Vec<PathBuf>,
    output: PathBuf,
    tmp: PathBuf,
    tasks: usize,
    chunk_size_bytes: u64,
    ignore_empty: bool,
    ignore_lines: Option<Regex>,
    endl: char,
    cancel: Arc<AtomicBool>,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * intermediate files are created under std::env::temp_dir()
    /// * all system cores are used for chunk sorting
    /// * input is read in chunks of 100 MiB
    /// * every line is a record, empty lines are parse errors
    /// * default end of line is '\n'
    pub fn new(input_files: Vec<PathBuf>, output: PathBuf) -> Sort {
        Sort {
            input_files,
            output,
            tmp: std::env::temp_dir(),
            tasks: 0,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            ignore_empty: false,
            ignore_lines: None,
            endl: '\n',
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set directory for intermediate files. By default use std::env::temp_dir()
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the number of tasks. The default is zero which will result in using all system cores
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// The input will be split in chunks of at least 'chunk_size_bytes' of line content,
    /// respecting line boundaries
    pub fn with_chunk_size_bytes(&mut self, chunk_size_bytes: u64) {
        self.chunk_size_bytes = chunk_size_bytes;
    }

    /// Same as [Sort::with_chunk_size_bytes] in MiB
    pub fn with_chunk_size_mib(&mut self, chunk_size_mib: u64) {
        self.chunk_size_bytes = chunk_size_mib.saturating_mul(1024 * 1024);
    }

    /// Drop empty and blank lines instead of failing on them.
    pub fn with_ignore_empty(&mut self) {
        self.ignore_empty = true;
    }

    /// Drop lines matching the regex. They will not appear in the output.
    pub fn with_ignore_lines(&mut self, r: Regex) {
        self.ignore_lines = Some(r)
    }

    /// Set line ending char - a '\r' before a '\n' ending is removed on input. The line ending
    /// must be an ASCII char, any other char fails the run.
    pub fn with_endl(&mut self, endl: char) {
        self.endl = endl
    }

    /// Share a flag that cancels the sort when set. Cancellation is observed between chunks and
    /// between merged records, and fails the run with [SortError::Cancelled].
    pub fn with_cancel_flag(&mut self, cancel: Arc<AtomicBool>) {
        self.cancel = cancel
    }

    fn create_config(&self) -> Result<Config, anyhow::Error> {
        let tasks = if self.tasks == 0 {
            num_cpus::get()
        } else {
            self.tasks
        };
        let endl = u8::try_from(self.endl)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| anyhow!("line ending must be an ASCII char: {:?}", self.endl))?;

        Ok(Config::new(
            self.tmp.clone(),
            TMP_PREFIX.to_string(),
            tasks,
            self.chunk_size_bytes,
            self.ignore_empty,
            self.ignore_lines.clone(),
            endl,
            self.cancel.clone(),
        ))
    }

    fn check_inputs(&self) -> Result<(), anyhow::Error> {
        for path in &self.input_files {
            if !path.is_file() {
                return Err(SortError::InputNotFound { path: path.clone() }.into());
            }
        }
        Ok(())
    }

    /// Sort the input files into the output file
    pub fn sort(&self) -> Result<SortStats, anyhow::Error> {
        self.check_inputs()?;
        let config = self.create_config()?;
        log::info!(
            "Start sort of {} input files, chunk size: {} bytes, tasks: {}",
            self.input_files.len(),
            config.chunk_size_bytes(),
            config.tasks()
        );
        let run_dir = Builder::new()
            .prefix(config.tmp_prefix())
            .tempdir_in(config.tmp())
            .with_context(|| anyhow!("Failed to create temp dir in {}", config.tmp().display()))?;

        let sorted_files = Self::sort_chunks(&self.input_files, run_dir.path(), &config)?;
        let records = Self::write_output(&self.output, sorted_files.len(), |writer| {
            Self::merge_chunks(&sorted_files, writer, &config)
        })?;

        run_dir
            .close()
            .with_context(|| anyhow!("Failed to remove temp dir"))?;
        log::info!("Finish sort, records: {}, chunks: {}", records, sorted_files.len());
        Ok(SortStats::new(records, sorted_files.len()))
    }

    /// Merge input files, each already sorted, into the output file. The input files are kept.
    ///
    /// Every line of the inputs must be a record.
    pub fn merge(&self) -> Result<SortStats, anyhow::Error> {
        self.check_inputs()?;
        let config = self.create_config()?;
        let records = Self::write_output(&self.output, self.input_files.len(), |writer| {
            merge_sorted_files(&self.input_files, writer, &config, false)
        })?;
        Ok(SortStats::new(records, self.input_files.len()))
    }

    /// Check that each input file is sorted
    pub fn check(&self) -> Result<bool, anyhow::Error> {
        self.check_inputs()?;
        let config = self.create_config()?;

        for path in &self.input_files {
            if !Self::internal_check(path, &config)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn internal_check(path: &Path, config: &Config) -> Result<bool, anyhow::Error> {
        let file = File::open(path).with_context(|| anyhow!("path: {}", path.display()))?;
        let mut reader = LineReader::new(BufReader::new(file), config.endl());
        let mut previous: Option<LineRecord> = None;
        while let Some(line) = reader
            .next_line()
            .with_context(|| anyhow!("path: {}", path.display()))?
        {
            if config.is_ignored(&line) {
                continue;
            }
            let current = LineRecord::parse(line).map_err(|e| SortError::Parse {
                path: path.to_path_buf(),
                line: reader.line_number(),
                source: e,
            })?;
            if let Some(previous) = &previous {
                if previous > &current {
                    log::info!("{} is not sorted at line {}", path.display(), reader.line_number());
                    return Ok(false);
                }
            }
            previous = Some(current);
        }
        Ok(true)
    }

    /// Partition the inputs and sort every chunk on the sorting pool.
    ///
    /// Returns the sorted chunks in input order. The first failure, from partitioning or from
    /// any chunk, aborts the remaining work and is returned.
    fn sort_chunks(input_files: &[PathBuf], dir: &Path, config: &Config) -> Result<Vec<SortedChunkFile>, anyhow::Error> {
        log::info!("Start parallel sort");
        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut sorting_pool = thread_pool_builder
            .with_name("sorting".to_string())
            .with_tasks(config.tasks())
            .with_queue_size(config.queue_size())
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .map_err(|e| anyhow!("Failed to create sorting pool: {}", e))?;

        let outcomes: SortOutcomes = Arc::new(Mutex::new(Vec::new()));
        let mut chunks = 0;
        let mut partition_error = None;
        for chunk in Partitioner::new(input_files, dir, config) {
            match chunk {
                Ok(chunk) => {
                    chunks += 1;
                    let sort_command = SortCommand::new(chunk, dir.to_path_buf(), config.clone(), outcomes.clone());
                    sorting_pool.submit(Box::new(sort_command));
                }
                Err(e) => {
                    config.abort();
                    partition_error = Some(e);
                    break;
                }
            }
        }

        log::info!("Shutting down sorting pool, submitted chunks: {}", chunks);
        sorting_pool.shutdown();
        sorting_pool.join()?;

        let outcomes = std::mem::take(
            &mut *outcomes
                .lock()
                .map_err(|_| anyhow!("sort outcomes lock poisoned"))?,
        );
        let mut sorted_files = Vec::with_capacity(outcomes.len());
        let mut failure: Option<anyhow::Error> = partition_error;
        for outcome in outcomes {
            match outcome {
                Ok(sorted_file) => sorted_files.push(sorted_file),
                Err(e) => match &failure {
                    // prefer the failure that caused the abort over the cancellations it caused
                    Some(f) if is_cancellation(f) && !is_cancellation(&e) => failure = Some(e),
                    Some(_) => {}
                    None => failure = Some(e),
                },
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        config.check_cancelled()?;
        if sorted_files.len() != chunks {
            return Err(anyhow!("Sorted {} chunks out of {}", sorted_files.len(), chunks));
        }

        sorted_files.sort_by_key(|sorted_file| sorted_file.index());
        log::info!("Finish parallel sort, chunks: {}", chunks);
        Ok(sorted_files)
    }

    fn merge_chunks(
        sorted_files: &[SortedChunkFile],
        writer: &mut BufWriter<NamedTempFile>,
        config: &Config,
    ) -> Result<usize, anyhow::Error> {
        if let [sorted_file] = sorted_files {
            copy_sorted_file(sorted_file.path(), writer)?;
            return Ok(sorted_file.lines());
        }
        let paths: Vec<PathBuf> = sorted_files
            .iter()
            .map(|sorted_file| sorted_file.path().clone())
            .collect();
        merge_sorted_files(&paths, writer, config, true)
    }

    /// Write the output through a temp file in the output directory and rename it into place
    /// once `write` succeeds. On failure the temp file is removed and the output is untouched.
    fn write_output<F>(output: &Path, open_files: usize, write: F) -> Result<usize, anyhow::Error>
    where
        F: FnOnce(&mut BufWriter<NamedTempFile>) -> Result<usize, anyhow::Error>,
    {
        raise_open_files_limit(open_files as u64 + 256)?;
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let partial = Builder::new()
            .prefix(&format!(".{}", TMP_PREFIX))
            .suffix(".partial")
            .tempfile_in(&dir)
            .with_context(|| anyhow!("Failed to create temp file in {}", dir.display()))?;

        let mut writer = BufWriter::new(partial);
        let lines = write(&mut writer).with_context(|| anyhow!("output: {}", output.display()))?;
        let partial = writer
            .into_inner()
            .map_err(|e| anyhow!("output: {}, flush: {}", output.display(), e.error()))?;
        partial
            .persist(output)
            .with_context(|| anyhow!("Rename to {}", output.display()))?;
        Ok(lines)
    }
}
