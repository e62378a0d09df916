//! Source which replays a recorded trace file.
use crate::sources::{BufferStatus, LineBuffer, RawLine, Source, SourceError};

use std::fs;
use std::io::BufReader;
use std::path::Path;

/// Something trace lines are replayed from. Always a file.
pub struct FileSource {
    name: String,
    reader: BufReader<fs::File>,
    buffer: LineBuffer,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = fs::OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(SourceError::SetupIOError)?;

        Ok(Self {
            name: path.display().to_string(),
            reader: BufReader::new(file),
            buffer: LineBuffer::default(),
        })
    }
}

impl Iterator for FileSource {
    type Item = Result<RawLine, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer
            .read_line(&mut self.reader)
            .map_err(SourceError::IterIOError)
            .transpose()
    }
}

impl Source for FileSource {
    fn avail_buffer(&self) -> BufferStatus {
        BufferStatus::NotApplicable
    }

    fn describe(&self) -> String {
        format!("file ({})", self.name)
    }
}
