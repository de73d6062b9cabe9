use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to extract the composite key from a line.
///
/// `line` holds the offending line, bytes that are not UTF-8 shown as replacement chars.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The line has fewer than two tab separated fields.
    #[error("missing timestamp field, line: {line:?}")]
    MissingTimestamp { line: String },
    /// The second field is not a base-10 signed 64 bit integer.
    #[error("invalid timestamp {value:?}: {source}, line: {line:?}")]
    InvalidTimestamp {
        line: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Fatal conditions reported by [crate::sort::Sort].
///
/// Lower level I/O failures are carried as [anyhow::Error] with path context. The variants here
/// are the ones a caller may want to match on, recovered with
/// `error.downcast_ref::<SortError>()`.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("input file does not exist or is not a regular file: {}", path.display())]
    InputNotFound { path: PathBuf },
    /// A record of `path` failed to parse. `line` is the 1-based line number within that file.
    #[error("file: {}, line: {line}, error: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },
    #[error("sort cancelled")]
    Cancelled,
}
