use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::config::Config;
use crate::line_reader::LineReader;

pub(crate) fn chunk_path(dir: &Path, index: usize, suffix: &str) -> PathBuf {
    dir.join(format!("chunk-{:06}.{}", index, suffix))
}

/// A run of consecutive chunk lines taken from consecutive lines of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OriginRun {
    chunk_line: usize,
    input: usize,
    input_line: usize,
}

/// Maps the 1-based line numbers of a chunk back to input files and input line numbers.
///
/// Lines are recorded in runs: a new run starts only at the first line of a chunk, after an
/// ignored line or at the start of another input.
#[derive(Debug, Clone)]
pub(crate) struct LineOrigins {
    inputs: Arc<[PathBuf]>,
    runs: Vec<OriginRun>,
}

impl LineOrigins {
    pub(crate) fn new(inputs: Arc<[PathBuf]>) -> LineOrigins {
        LineOrigins {
            inputs,
            runs: Vec::new(),
        }
    }

    /// Record that `chunk_line` is line `input_line` of input number `input`.
    pub(crate) fn push(&mut self, chunk_line: usize, input: usize, input_line: usize) {
        if let Some(run) = self.runs.last() {
            if run.input == input && run.input_line + (chunk_line - run.chunk_line) == input_line {
                return;
            }
        }
        self.runs.push(OriginRun { chunk_line, input, input_line });
    }

    /// Input path and input line number of a chunk line.
    pub(crate) fn origin(&self, chunk_line: usize) -> Option<(&PathBuf, usize)> {
        let after = self.runs.partition_point(|run| run.chunk_line <= chunk_line);
        let run = self.runs.get(after.checked_sub(1)?)?;
        let path = self.inputs.get(run.input)?;
        Some((path, run.input_line + (chunk_line - run.chunk_line)))
    }
}

/// A run of input lines, in input order, persisted to the run directory.
#[derive(Debug)]
pub(crate) struct UnsortedChunk {
    index: usize,
    path: PathBuf,
    origins: LineOrigins,
    lines: usize,
    bytes: u64,
}

impl UnsortedChunk {
    pub(crate) fn new(index: usize, path: PathBuf, origins: LineOrigins, lines: usize, bytes: u64) -> UnsortedChunk {
        UnsortedChunk {
            index,
            path,
            origins,
            lines,
            bytes,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Input path and 1-based input line number of the 1-based `chunk_line`.
    pub(crate) fn origin(&self, chunk_line: usize) -> Option<(&PathBuf, usize)> {
        self.origins.origin(chunk_line)
    }

    pub(crate) fn lines(&self) -> usize {
        self.lines
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Splits the inputs into chunks of roughly `chunk_size_bytes` of line content.
///
/// The threshold is checked after a line is appended, so a chunk exceeds it by at most one line.
/// Chunk files are only created once they receive a line: empty input produces no chunks.
/// The iterator stops after the first error.
pub(crate) struct Partitioner {
    inputs: Arc<[PathBuf]>,
    next_input: usize,
    reader: Option<(usize, LineReader<BufReader<File>>)>,
    dir: PathBuf,
    config: Config,
    next_index: usize,
    done: bool,
}

impl Partitioner {
    pub(crate) fn new(inputs: &[PathBuf], dir: &Path, config: &Config) -> Partitioner {
        Partitioner {
            inputs: inputs.into(),
            next_input: 0,
            reader: None,
            dir: dir.to_path_buf(),
            config: config.clone(),
            next_index: 0,
            done: false,
        }
    }

    /// Next line with the index of its input and its line number in that input.
    fn read_line(&mut self) -> Result<Option<(Vec<u8>, usize, usize)>, anyhow::Error> {
        loop {
            if let Some((input, reader)) = self.reader.as_mut() {
                let path = &self.inputs[*input];
                let line = reader
                    .next_line()
                    .with_context(|| anyhow!("path: {}", path.display()))?;
                if let Some(line) = line {
                    return Ok(Some((line, *input, reader.line_number())));
                }
                log::debug!("Finished reading {}, lines: {}", path.display(), reader.line_number());
            }
            self.reader = None;

            let input = self.next_input;
            match self.inputs.get(input) {
                None => return Ok(None),
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| anyhow!("path: {}", path.display()))?;
                    let reader = LineReader::new(BufReader::new(file), self.config.endl());
                    self.reader = Some((input, reader));
                    self.next_input += 1;
                }
            }
        }
    }

    fn next_chunk(&mut self) -> Result<Option<UnsortedChunk>, anyhow::Error> {
        self.config.check_cancelled()?;
        let mut writer: Option<(PathBuf, BufWriter<File>)> = None;
        let mut origins = LineOrigins::new(self.inputs.clone());
        let mut lines = 0;
        let mut bytes: u64 = 0;

        while let Some((line, input, input_line)) = self.read_line()? {
            if self.config.is_ignored(&line) {
                continue;
            }

            if writer.is_none() {
                let path = chunk_path(&self.dir, self.next_index, "unsorted");
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .with_context(|| anyhow!("path: {}", path.display()))?;
                writer = Some((path, BufWriter::new(file)));
            }
            if let Some((path, chunk_writer)) = writer.as_mut() {
                chunk_writer
                    .write_all(&line)
                    .and_then(|_| chunk_writer.write_all(&[self.config.endl()]))
                    .with_context(|| anyhow!("path: {}", path.display()))?;
            }
            lines += 1;
            origins.push(lines, input, input_line);
            bytes += line.len() as u64;
            if bytes > self.config.chunk_size_bytes() {
                break;
            }
        }

        match writer {
            None => Ok(None),
            Some((path, mut chunk_writer)) => {
                chunk_writer
                    .flush()
                    .with_context(|| anyhow!("path: {}", path.display()))?;
                let chunk = UnsortedChunk::new(self.next_index, path, origins, lines, bytes);
                log::debug!("Created chunk {}, lines: {}, bytes: {}", chunk.index(), lines, bytes);
                self.next_index += 1;
                Ok(Some(chunk))
            }
        }
    }
}

impl Iterator for Partitioner {
    type Item = Result<UnsortedChunk, anyhow::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
