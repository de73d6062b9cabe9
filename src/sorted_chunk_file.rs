use std::path::PathBuf;

/// A chunk whose lines are ordered by key, ready to be merged.
#[derive(Debug, Clone)]
pub(crate) struct SortedChunkFile {
    index: usize,
    path: PathBuf,
    lines: usize,
}

impl SortedChunkFile {
    pub(crate) fn new(index: usize, path: PathBuf, lines: usize) -> SortedChunkFile {
        SortedChunkFile {
            index,
            path,
            lines,
        }
    }

    /// Position of the chunk in input order.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn path(&self) -> &PathBuf {
        &self.path
    }

    pub(crate) fn lines(&self) -> usize {
        self.lines
    }
}
