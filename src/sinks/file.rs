//! A simple file sink which records every raw line received from the
//! target. Used for replay functionality.
use crate::sinks::SinkError;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::prelude::*;

const TRACE_FILE_EXT: &str = ".trace";

pub struct FileSink {
    path: PathBuf,
    file: fs::File,
}

impl FileSink {
    /// Creates a new trace file in `trace_dir`, named after the serial
    /// `device` and the current local time.
    pub fn generate_trace_file(
        device: &str,
        trace_dir: &Path,
        remove_prev_traces: bool,
    ) -> Result<Self, SinkError> {
        if remove_prev_traces {
            if let Ok(traces) = find_trace_files(trace_dir.to_path_buf()) {
                for trace in traces {
                    fs::remove_file(trace).map_err(|e| {
                        SinkError::SetupIOError(
                            Some("Failed to remove previous trace file".to_string()),
                            e,
                        )
                    })?;
                }
            }
        }

        // generate a short description on the format
        // "ttyACM0-2021-06-16T17:13:16.trace"
        let device = Path::new(device)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| device.to_string());
        let date = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let path = trace_dir.join(format!("{}-{}{}", device, date, TRACE_FILE_EXT));

        fs::create_dir_all(trace_dir).map_err(|e| {
            SinkError::SetupIOError(
                Some(format!(
                    "Failed to create output trace directory {}",
                    trace_dir.display()
                )),
                e,
            )
        })?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                SinkError::SetupIOError(
                    Some(format!(
                        "Failed to create output trace file {}",
                        path.display()
                    )),
                    e,
                )
            })?;

        Ok(Self { path, file })
    }

    /// Appends a raw line, terminated by a newline.
    pub fn record(&mut self, line: &[u8]) -> Result<(), SinkError> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line);
        buf.push(b'\n');
        self.file
            .write_all(&buf)
            .map_err(SinkError::DrainIOError)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn describe(&self) -> String {
        format!("trace file {}", self.path.display())
    }
}

/// ls `*.trace` in given path, sorted by file name (and thus by
/// creation time for files of the same device).
pub fn find_trace_files(path: PathBuf) -> Result<impl Iterator<Item = PathBuf>, SinkError> {
    let mut traces: Vec<PathBuf> = fs::read_dir(path)
        .map_err(|e| {
            SinkError::SetupIOError(Some("Failed to read trace directory".to_string()), e)
        })?
        // we only care about files we can access
        .filter_map(|entry| entry.ok())
        // grep *.trace
        .filter(|entry| {
            entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                && entry.file_name().to_string_lossy().ends_with(TRACE_FILE_EXT)
        })
        .map(|entry| entry.path())
        .collect();
    traces.sort();

    Ok(traces.into_iter())
}
