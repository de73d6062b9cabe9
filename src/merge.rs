use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::Config;
use crate::error::SortError;
use crate::line_reader::LineReader;
use crate::record::LineRecord;

/// Streaming reader over one sorted file.
pub(crate) struct MergeCursor {
    path: PathBuf,
    reader: LineReader<BufReader<File>>,
}

impl MergeCursor {
    pub(crate) fn open(path: &Path, endl: u8) -> Result<MergeCursor, anyhow::Error> {
        let file = File::open(path).with_context(|| anyhow!("path: {}", path.display()))?;
        Ok(
            MergeCursor {
                path: path.to_path_buf(),
                reader: LineReader::new(BufReader::new(file), endl),
            }
        )
    }

    pub(crate) fn next_record(&mut self) -> Result<Option<LineRecord>, anyhow::Error> {
        let line = self
            .reader
            .next_line()
            .with_context(|| anyhow!("path: {}", self.path.display()))?;
        match line {
            None => Ok(None),
            Some(line) => {
                let record = LineRecord::parse(line).map_err(|e| SortError::Parse {
                    path: self.path.clone(),
                    line: self.reader.line_number(),
                    source: e,
                })?;
                Ok(Some(record))
            }
        }
    }

    /// Close the reader and optionally remove the file.
    pub(crate) fn finish(self, remove: bool) -> Result<(), anyhow::Error> {
        let MergeCursor { path, reader } = self;
        drop(reader);
        if remove {
            std::fs::remove_file(&path).with_context(|| anyhow!("remove: {}", path.display()))?;
        }
        Ok(())
    }
}

/// Head record of a cursor on the merge frontier, tagged with the cursor index.
///
/// Equal keys are ordered by cursor index, so records from earlier files are merged first.
#[derive(Debug)]
struct HeapEntry {
    record: LineRecord,
    cursor: usize,
}

impl Eq for HeapEntry {}

impl PartialEq<Self> for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .cmp(&other.record)
            .then_with(|| self.cursor.cmp(&other.cursor))
    }
}

/// K-way merge of files that are each sorted by key into `writer`.
///
/// Holds one open cursor and one record per file. A file is closed, and removed when
/// `remove_merged` is set, as soon as it is exhausted. Returns the number of merged lines.
pub(crate) fn merge_sorted_files<W: Write>(
    files: &[PathBuf],
    writer: &mut W,
    config: &Config,
    remove_merged: bool,
) -> Result<usize, anyhow::Error> {
    log::info!("Merging {} sorted files", files.len());
    let endl = config.endl();
    let mut cursors: Vec<Option<MergeCursor>> = Vec::with_capacity(files.len());
    let mut frontier: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(files.len());

    for (index, path) in files.iter().enumerate() {
        let mut cursor = MergeCursor::open(path, endl)?;
        match cursor.next_record()? {
            Some(record) => {
                frontier.push(Reverse(HeapEntry { record, cursor: index }));
                cursors.push(Some(cursor));
            }
            None => {
                cursor.finish(remove_merged)?;
                cursors.push(None);
            }
        }
    }

    let mut merged: usize = 0;
    while let Some(Reverse(entry)) = frontier.pop() {
        config.check_cancelled()?;
        writer.write_all(entry.record.render())?;
        writer.write_all(&[endl])?;
        merged += 1;

        let index = entry.cursor;
        let next = match cursors[index].as_mut() {
            Some(cursor) => cursor.next_record()?,
            None => None,
        };
        match next {
            Some(record) => {
                if record < entry.record {
                    return Err(anyhow!(
                        "path: {}, input is not sorted: {:?} follows {:?}",
                        files[index].display(),
                        String::from_utf8_lossy(record.render()),
                        String::from_utf8_lossy(entry.record.render())
                    ));
                }
                frontier.push(Reverse(HeapEntry { record, cursor: index }));
            }
            None => {
                if let Some(cursor) = cursors[index].take() {
                    cursor.finish(remove_merged)?;
                }
            }
        }
    }

    log::info!("Finished merging sorted files, merged length: {} lines", merged);
    Ok(merged)
}

/// Append a single sorted chunk to `writer` as is and remove it.
pub(crate) fn copy_sorted_file<W: Write>(path: &Path, writer: &mut W) -> Result<u64, anyhow::Error> {
    let mut file = File::open(path).with_context(|| anyhow!("path: {}", path.display()))?;
    let copied = std::io::copy(&mut file, writer).with_context(|| anyhow!("path: {}", path.display()))?;
    drop(file);
    std::fs::remove_file(path).with_context(|| anyhow!("remove: {}", path.display()))?;
    Ok(copied)
}
