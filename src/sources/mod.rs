//! A source from which raw trace lines are read. Lines are handed to
//! the ingestion loop undecoded; see [`crate::protocol`].
use crate::diag;
use crate::protocol::MAX_LINE_LENGTH;

use std::io::{self, BufRead, Read};

use thiserror::Error;

/// A single line as received from the target, without its terminator.
pub type RawLine = Vec<u8>;

#[derive(Debug)]
pub enum BufferStatus {
    /// The given amount of bytes are waiting in the input buffer.
    Pending(u32),
    /// Pending byte count could not be found.
    Unknown,
    /// Input buffer size is not a concern for this source.
    NotApplicable,
}

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open serial device {0}: {1}")]
    SetupSerialError(String, #[source] serialport::Error),
    #[error("Failed to setup source during I/O: {0}")]
    SetupIOError(#[source] std::io::Error),
    #[error("Failed to read trace data from serial device: {0}")]
    IterSerialError(#[source] std::io::Error),
    #[error("Failed to read trace data from file: {0}")]
    IterIOError(#[source] std::io::Error),
}

impl diag::DiagnosableError for SourceError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::SetupSerialError(_, e) if e.kind() == serialport::ErrorKind::NoDevice => vec![
                "Is the target connected? Available serial devices are listed by `sched-scope list-ports`.".to_string(),
            ],
            Self::SetupSerialError(..) => vec![
                "The device may be opened by another program, or you may lack permissions to open it.".to_string(),
            ],
            Self::IterSerialError(_) => vec![
                "The target was likely disconnected. Already received data is kept.".to_string(),
            ],
            _ => vec![],
        }
    }
}

pub trait Source: Iterator<Item = Result<RawLine, SourceError>> + std::marker::Send {
    /// Reports the bytes waiting in the input buffer, if able.
    fn avail_buffer(&self) -> BufferStatus {
        BufferStatus::Unknown
    }

    fn describe(&self) -> String;
}

/// Bytes of a line read so far. A line longer than
/// [`MAX_LINE_LENGTH`] is handed out cut off after one byte too many, so
/// that the parser reports it as malformed, and the rest of it up to the
/// next newline is discarded.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
    overlong: bool,
}

impl LineBuffer {
    /// Reads until a newline. Returns the completed line without its
    /// terminator, or `None` on end of stream with nothing pending. A
    /// final line without terminator is still returned.
    ///
    /// On error, bytes read so far are kept so that a read can be
    /// resumed after e.g. a timeout.
    pub fn read_line<R: BufRead>(&mut self, reader: &mut R) -> io::Result<Option<RawLine>> {
        loop {
            let room = (MAX_LINE_LENGTH + 1).saturating_sub(self.pending.len());
            let n = reader
                .by_ref()
                .take(room as u64)
                .read_until(b'\n', &mut self.pending)?;
            let terminated = self.pending.last() == Some(&b'\n');

            if self.overlong {
                // tail of a line that was already handed out
                self.pending.clear();
                if terminated {
                    self.overlong = false;
                } else if n == 0 {
                    return Ok(None);
                }
                continue;
            }

            if n == 0 && self.pending.is_empty() {
                return Ok(None);
            }
            if terminated {
                self.pending.pop();
            } else if self.pending.len() > MAX_LINE_LENGTH {
                self.overlong = true;
            }
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
    }
}

mod file;
pub use file::FileSource;

pub mod tty;
pub use tty::TTYSource;

#[cfg(test)]
mod test {
    use super::*;

    fn lines_of(input: &[u8]) -> Vec<RawLine> {
        let mut reader = io::Cursor::new(input.to_vec());
        let mut buffer = LineBuffer::default();

        let mut lines = vec![];
        while let Some(line) = buffer.read_line(&mut reader).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn lines_are_split_on_newline() {
        assert_eq!(
            lines_of(b"A,X,1,0\r\nB,S,2,0,3\nno-newline"),
            vec![
                b"A,X,1,0\r".to_vec(),
                b"B,S,2,0,3".to_vec(),
                b"no-newline".to_vec()
            ]
        );
    }

    #[test]
    fn overlong_line_is_cut_off() {
        let mut input = vec![b'x'; 3 * MAX_LINE_LENGTH];
        input.extend_from_slice(b"\nA,X,1,0\n");
        input.extend(vec![b'y'; MAX_LINE_LENGTH]);
        input.extend_from_slice(b"\nA,Y,2,0");

        let lines = lines_of(&input);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH + 1);
        assert_eq!(lines[1], b"A,X,1,0".to_vec());
        assert_eq!(lines[2].len(), MAX_LINE_LENGTH);
        assert_eq!(lines[3], b"A,Y,2,0".to_vec());
    }

    #[test]
    fn unterminated_stream_stays_bounded() {
        let lines = lines_of(&vec![b'x'; 10 * MAX_LINE_LENGTH]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH + 1);
    }
}
