use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::command::Command;

use crate::config::Config;
use crate::error::SortError;
use crate::line_reader::LineReader;
use crate::partition::{chunk_path, UnsortedChunk};
use crate::record::LineRecord;
use crate::sorted_chunk_file::SortedChunkFile;

pub(crate) type SortOutcomes = Arc<Mutex<Vec<Result<SortedChunkFile, anyhow::Error>>>>;

fn read_records(chunk: &UnsortedChunk, config: &Config) -> Result<Vec<LineRecord>, anyhow::Error> {
    let file = File::open(chunk.path())
        .with_context(|| anyhow!("path: {}", chunk.path().display()))?;
    let mut reader = LineReader::new(BufReader::new(file), config.endl());
    let mut records = Vec::with_capacity(chunk.lines());
    while let Some(line) = reader
        .next_line()
        .with_context(|| anyhow!("path: {}", chunk.path().display()))?
    {
        let record = LineRecord::parse(line)
            .map_err(|e| {
                let (path, line) = match chunk.origin(reader.line_number()) {
                    Some((path, line)) => (path.clone(), line),
                    None => (chunk.path().clone(), reader.line_number()),
                };
                SortError::Parse { path, line, source: e }
            })
            .with_context(|| format!("chunk: {}", chunk.index()))?;
        records.push(record);
    }
    Ok(records)
}

/// Sort one chunk in memory and persist it next to the unsorted chunk, which is then removed.
///
/// Records with equal keys keep their chunk order.
pub(crate) fn sort_chunk(chunk: &UnsortedChunk, dir: &Path, config: &Config) -> Result<SortedChunkFile, anyhow::Error> {
    config.check_cancelled()?;
    let mut records = read_records(chunk, config)?;
    records.sort();

    let path = chunk_path(dir, chunk.index(), "sorted");
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| anyhow!("path: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in &records {
        writer
            .write_all(record.render())
            .and_then(|_| writer.write_all(&[config.endl()]))
            .with_context(|| anyhow!("path: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| anyhow!("path: {}", path.display()))?;

    std::fs::remove_file(chunk.path())
        .with_context(|| anyhow!("remove: {}", chunk.path().display()))?;
    log::debug!("Sorted chunk {}, lines: {}", chunk.index(), records.len());
    Ok(SortedChunkFile::new(chunk.index(), path, records.len()))
}

/// Chunk sort task for the sorting pool.
///
/// Failures are not returned from [Command::execute]. They are pushed to the shared outcomes and
/// abort the run, so that pending tasks skip their chunks.
pub(crate) struct SortCommand {
    chunk: UnsortedChunk,
    dir: PathBuf,
    config: Config,
    outcomes: SortOutcomes,
}

impl SortCommand {
    pub(crate) fn new(chunk: UnsortedChunk, dir: PathBuf, config: Config, outcomes: SortOutcomes) -> SortCommand {
        SortCommand {
            chunk,
            dir,
            config,
            outcomes,
        }
    }
}

impl Command for SortCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let outcome = sort_chunk(&self.chunk, &self.dir, &self.config);
        if let Err(e) = &outcome {
            log::error!("Failed to sort chunk {}: {:#}", self.chunk.index(), e);
            self.config.abort();
        }
        self.outcomes
            .lock()
            .map_err(|_| anyhow!("sort outcomes lock poisoned"))?
            .push(outcome);
        Ok(())
    }
}
