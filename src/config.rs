use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::bytes::Regex;

use crate::error::SortError;

#[derive(Clone, Debug)]
pub(crate) struct Config {
    tmp: PathBuf,
    tmp_prefix: String,
    tasks: usize,
    queue_size: usize,
    chunk_size_bytes: u64,
    ignore_empty: bool,
    ignore_lines: Option<Regex>,
    endl: u8,
    cancel: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
}

impl Config {
    pub(crate) fn new(
        tmp: PathBuf,
        tmp_prefix: String,
        tasks: usize,
        chunk_size_bytes: u64,
        ignore_empty: bool,
        ignore_lines: Option<Regex>,
        endl: u8,
        cancel: Arc<AtomicBool>,
    ) -> Config {
        let queue_size = 4096;
        Config {
            tmp,
            tmp_prefix,
            tasks,
            queue_size,
            chunk_size_bytes,
            ignore_empty,
            ignore_lines,
            endl,
            cancel,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub(crate) fn tmp_prefix(&self) -> &String {
        &self.tmp_prefix
    }

    pub(crate) fn tasks(&self) -> usize {
        self.tasks
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub(crate) fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_bytes
    }

    pub(crate) fn endl(&self) -> u8 {
        self.endl
    }

    /// True when the line, terminator already removed, is not a record and must be dropped.
    pub(crate) fn is_ignored(&self, line: &[u8]) -> bool {
        if self.ignore_empty && line.iter().all(u8::is_ascii_whitespace) {
            return true;
        }
        match &self.ignore_lines {
            Some(r) => r.is_match(line),
            None => false,
        }
    }

    /// Stop the remaining work of this run after a failure. Unlike the caller's cancel flag the
    /// abort flag is private to the run.
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || self.aborted.load(Ordering::Relaxed)
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), anyhow::Error> {
        if self.is_cancelled() {
            Err(SortError::Cancelled.into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config(tmp: PathBuf, chunk_size_bytes: u64) -> Config {
    Config::new(
        tmp,
        "record-file-sort-".to_string(),
        2,
        chunk_size_bytes,
        false,
        None,
        b'\n',
        Arc::new(AtomicBool::new(false)),
    )
}
