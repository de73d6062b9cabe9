//! Line records keyed by `(id, timestamp)`.
//!
//! A record is a line of tab separated fields. The first field is the id, the second field is a
//! signed 64 bit timestamp and everything after the second tab is an opaque payload that is
//! carried through the sort untouched. Lines are raw bytes: only the timestamp field has to be
//! text, the id and the payload may hold any byte except the separator and the line terminator.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::ParseError;

/// The field separator of a line record.
pub const FIELD_SEPARATOR: u8 = b'\t';

/// Composite sort key.
///
/// Ids compare byte-wise, ties are broken by the numeric timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key<'a> {
    id: &'a [u8],
    timestamp: i64,
}

impl<'a> Key<'a> {
    pub fn new(id: &'a [u8], timestamp: i64) -> Key<'a> {
        Key { id, timestamp }
    }

    pub fn id(&self) -> &'a [u8] {
        self.id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

fn find_separator(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|b| *b == FIELD_SEPARATOR)
}

/// A parsed line together with its composite key.
///
/// The line is stored without its terminator and is never modified, so
/// [LineRecord::render] returns exactly the bytes given to [LineRecord::parse].
///
/// # Examples
/// ```
/// use record_file_sort::record::LineRecord;
///
/// let record = LineRecord::parse(b"A\t100\tfoo\tbar".to_vec()).unwrap();
/// assert_eq!(record.id(), b"A");
/// assert_eq!(record.timestamp(), 100);
/// assert_eq!(record.payload(), Some(&b"foo\tbar"[..]));
/// assert_eq!(record.render(), b"A\t100\tfoo\tbar");
/// ```
#[derive(Debug, Clone)]
pub struct LineRecord {
    line: Vec<u8>,
    id_end: usize,
    timestamp: i64,
}

impl LineRecord {
    /// Parse a line, without its terminator, into a record.
    pub fn parse(line: Vec<u8>) -> Result<LineRecord, ParseError> {
        let id_end = match find_separator(&line) {
            Some(id_end) => id_end,
            None => return Err(ParseError::MissingTimestamp { line: lossy(&line) }),
        };
        let rest = &line[id_end + 1..];
        let timestamp_field = match find_separator(rest) {
            Some(end) => &rest[..end],
            None => rest,
        };
        // invalid UTF-8 turns into replacement chars, which never parse as a number
        let value = String::from_utf8_lossy(timestamp_field);
        let timestamp = match i64::from_str(&value) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                return Err(ParseError::InvalidTimestamp {
                    line: lossy(&line),
                    value: value.into_owned(),
                    source: e,
                });
            }
        };

        Ok(
            LineRecord {
                line,
                id_end,
                timestamp,
            }
        )
    }

    /// The line this record was parsed from.
    pub fn render(&self) -> &[u8] {
        &self.line
    }

    pub fn into_line(self) -> Vec<u8> {
        self.line
    }

    pub fn id(&self) -> &[u8] {
        &self.line[..self.id_end]
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Fields after the timestamp, tab joined, or None when the line has only two fields.
    pub fn payload(&self) -> Option<&[u8]> {
        let rest = &self.line[self.id_end + 1..];
        find_separator(rest).map(|end| &rest[end + 1..])
    }

    pub fn key(&self) -> Key<'_> {
        Key::new(self.id(), self.timestamp)
    }

    /// Size of the rendered line in bytes, terminator excluded.
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

impl Eq for LineRecord {}

impl PartialEq<Self> for LineRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl PartialOrd<Self> for LineRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LineRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
