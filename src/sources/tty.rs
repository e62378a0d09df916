//! Source which reads trace lines from a serial device after properly
//! configuring it.
use crate::ingest::CancelToken;
use crate::sources::{BufferStatus, LineBuffer, RawLine, Source, SourceError};

use std::io::{self, BufReader, Read};
use std::time::Duration;

use serialport::SerialPort;

/// Opens and configures the given `device` at `baud_rate`, 8N1 without
/// flow control. Reads return after at most `timeout` without data.
pub fn configure(
    device: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, SourceError> {
    serialport::new(device, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| SourceError::SetupSerialError(device.to_string(), e))
}

pub struct TTYSource<P = Box<dyn SerialPort>> {
    device: String,
    reader: BufReader<P>,
    buffer: LineBuffer,
    cancel: CancelToken,
}

impl TTYSource {
    pub fn new(port: Box<dyn SerialPort>, cancel: CancelToken) -> Self {
        let device = port.name().unwrap_or_else(|| "<unnamed>".to_string());
        Self::with_port(device, port, cancel)
    }
}

impl<P: Read> TTYSource<P> {
    fn with_port(device: String, port: P, cancel: CancelToken) -> Self {
        Self {
            device,
            reader: BufReader::new(port),
            buffer: LineBuffer::default(),
            cancel,
        }
    }
}

impl<P: Read> Iterator for TTYSource<P> {
    type Item = Result<RawLine, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        // A timed out read is where cancellation is observed; the
        // partial line read so far is kept for the next attempt.
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            match self.buffer.read_line(&mut self.reader) {
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => return None,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => return Some(Err(SourceError::IterSerialError(e))),
            }
        }
    }
}

impl Source for TTYSource {
    fn avail_buffer(&self) -> BufferStatus {
        match self.reader.get_ref().bytes_to_read() {
            Ok(n) => BufferStatus::Pending(n),
            Err(_) => BufferStatus::Unknown,
        }
    }

    fn describe(&self) -> String {
        format!("TTY ({})", self.device)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    /// A serial port replaying scripted reads. Once the script runs out
    /// every read times out, after setting `on_idle` if given.
    struct ScriptedPort {
        script: VecDeque<Result<Vec<u8>, io::ErrorKind>>,
        on_idle: Option<CancelToken>,
    }

    impl ScriptedPort {
        fn new(script: &[Result<&str, io::ErrorKind>], on_idle: Option<CancelToken>) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|step| step.map(|s| s.as_bytes().to_vec()))
                    .collect(),
                on_idle,
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.script.push_front(Ok(bytes.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Err(kind)) => Err(kind.into()),
                None => {
                    if let Some(cancel) = &self.on_idle {
                        cancel.cancel();
                    }
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }
    }

    #[test]
    fn partial_line_survives_timeouts() {
        let port = ScriptedPort::new(
            &[
                Ok("A,Ta"),
                Err(io::ErrorKind::TimedOut),
                Ok("skX,100,0\nB,"),
                Err(io::ErrorKind::WouldBlock),
                Ok("S1,150,0,50\n"),
                Err(io::ErrorKind::BrokenPipe),
            ],
            None,
        );
        let mut source = TTYSource::with_port("test".to_string(), port, CancelToken::new());

        assert_eq!(source.next().unwrap().unwrap(), b"A,TaskX,100,0".to_vec());
        assert_eq!(source.next().unwrap().unwrap(), b"B,S1,150,0,50".to_vec());
        assert!(matches!(
            source.next(),
            Some(Err(SourceError::IterSerialError(e))) if e.kind() == io::ErrorKind::BrokenPipe
        ));
    }

    #[test]
    fn cancellation_is_observed_on_timeout() {
        let cancel = CancelToken::new();
        let port = ScriptedPort::new(&[Ok("A,TaskX,100,0\nA,Ta")], Some(cancel.clone()));
        let mut source = TTYSource::with_port("test".to_string(), port, cancel.clone());

        assert_eq!(source.next().unwrap().unwrap(), b"A,TaskX,100,0".to_vec());
        assert!(source.next().is_none());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn cancelled_source_reads_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let port = ScriptedPort::new(&[Ok("A,TaskX,100,0\n")], None);
        let mut source = TTYSource::with_port("test".to_string(), port, cancel);

        assert!(source.next().is_none());
    }
}
