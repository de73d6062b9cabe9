//! This crate implements an external sort for tab separated record files, ordering the records
//! by an id and then by a numeric timestamp.
//!
//! Each line of the input is a record: an id, a signed 64 bit timestamp and an optional payload,
//! separated by TABs. Files that do not fit in memory are sorted in three phases:
//!
//! 1. the input is split into chunks of bounded size, kept in input order
//! 2. every chunk is sorted in memory, chunks are sorted in parallel on a thread pool
//! 3. the sorted chunks are merged with a k-way merge into the output
//!
//! Records with equal keys keep their input order. Intermediate files are removed on success
//! and on failure, and a failed sort never leaves a partially written output behind.
//!
//! # Examples
//! ```
//! use std::path::PathBuf;
//! use record_file_sort::sort::Sort;
//!
//! fn sort_records(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut sort = Sort::new(vec![input], output);
//!
//!     // set number of CPU cores used to sort chunks. The default is to use all available cores.
//!     sort.with_tasks(2);
//!
//!     // set the directory for intermediate results. The default is the system temp dir -
//!     // std::env::temp_dir(), however, for large files it is recommended to provide a dedicated
//!     // directory for intermediate files, preferably on the same file system as the output result.
//!     sort.with_tmp_dir(tmp);
//!
//!     // upper bound, give or take one record, of the line content held in memory per task
//!     sort.with_chunk_size_bytes(10_000_000);
//!
//!     sort.sort()?;
//!     Ok(())
//! }
//! ```
//!

pub(crate) mod config;
pub(crate) mod line_reader;
pub(crate) mod merge;
pub(crate) mod partition;
pub(crate) mod sort_command;
pub(crate) mod sorted_chunk_file;

pub mod error;
pub mod record;
pub mod sort;
