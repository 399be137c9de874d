//! Streaming reader for mbox files.
//!
//! A record starts at every line beginning with `From `. Lines quoted the
//! mboxrd way (`>From `, `>>From `, ...) lose one level of quoting. Only the
//! current record is held in memory.

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt};

const SEPARATOR: &[u8] = b"From ";

/// One message cut out of an mbox stream
#[derive(Debug, Clone, PartialEq)]
pub struct MboxRecord {
    /// Zero-based position of the record in the file
    pub index: u64,
    /// The `From ` separator line, without line ending
    pub separator: String,
    /// Message bytes with the separator and trailing blank line removed
    pub raw: Vec<u8>,
}

pub struct MboxReader<R> {
    reader: R,
    line: Vec<u8>,
    current: Option<(String, Vec<u8>)>,
    next_index: u64,
}

fn is_separator(line: &[u8]) -> bool {
    line.starts_with(SEPARATOR)
}

fn is_quoted_separator(line: &[u8]) -> bool {
    let quotes = line.iter().take_while(|b| **b == b'>').count();
    quotes > 0 && line[quotes..].starts_with(SEPARATOR)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

impl<R: AsyncBufRead + Unpin> MboxReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(1024),
            current: None,
            next_index: 0,
        }
    }

    /// Read the next record; `None` once the stream is exhausted.
    pub async fn next_record(&mut self) -> io::Result<Option<MboxRecord>> {
        loop {
            self.line.clear();
            let read = self.reader.read_until(b'\n', &mut self.line).await?;
            if read == 0 {
                return Ok(self.current.take().map(|(separator, raw)| self.finish(separator, raw)));
            }

            if is_separator(&self.line) {
                let separator = String::from_utf8_lossy(trim_line_ending(&self.line)).into_owned();
                match self.current.replace((separator, Vec::new())) {
                    Some((previous, raw)) => return Ok(Some(self.finish(previous, raw))),
                    None => continue,
                }
            }

            // Anything before the first separator is not part of a message
            let Some((_, raw)) = self.current.as_mut() else {
                continue;
            };
            if is_quoted_separator(&self.line) {
                raw.extend_from_slice(&self.line[1..]);
            } else {
                raw.extend_from_slice(&self.line);
            }
        }
    }

    fn finish(&mut self, separator: String, mut raw: Vec<u8>) -> MboxRecord {
        // The blank line written before the next separator belongs to the format
        if raw.ends_with(b"\r\n\r\n") {
            raw.truncate(raw.len() - 2);
        } else if raw.ends_with(b"\n\n") {
            raw.truncate(raw.len() - 1);
        }
        let index = self.next_index;
        self.next_index += 1;
        MboxRecord {
            index,
            separator,
            raw,
        }
    }
}

/// Count separator lines without keeping any message content around.
pub async fn count_boundaries<R: AsyncBufRead + Unpin>(mut reader: R) -> io::Result<u64> {
    let mut line = Vec::with_capacity(1024);
    let mut count = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(count);
        }
        if is_separator(&line) {
            count += 1;
        }
    }
}
