use std::io::BufRead;

/// Reads terminator-delimited lines as raw bytes, stripping the terminator and a `'\r'` right
/// before a `'\n'` terminator.
pub(crate) struct LineReader<R> {
    reader: R,
    endl: u8,
    line_number: usize,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(reader: R, endl: u8) -> LineReader<R> {
        LineReader {
            reader,
            endl,
            line_number: 0,
        }
    }

    /// 1-based number of the last line returned by [LineReader::next_line].
    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    pub(crate) fn next_line(&mut self) -> Result<Option<Vec<u8>>, anyhow::Error> {
        let mut line = Vec::new();
        if self.reader.read_until(self.endl, &mut line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        if line.last() == Some(&self.endl) {
            line.pop();
            if self.endl == b'\n' && line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}
