//! Sub-proccess sink which receives JSON-serialized
//! [`api::Snapshot`]s, one per line.
use crate::sinks::{Sink, SinkError};

use sched_scope_api as api;
use std::io::Write;

pub struct FrontendSink<W: Write = std::os::unix::net::UnixStream> {
    socket: W,
}

impl<W: Write + std::fmt::Debug> FrontendSink<W> {
    pub fn new(socket: W) -> Self {
        Self { socket }
    }
}

impl<W: Write + std::fmt::Debug> Sink for FrontendSink<W> {
    fn drain(&mut self, snapshot: &api::Snapshot) -> Result<(), SinkError> {
        let json = serde_json::to_string(snapshot)?
        // frontends read line by line
        + "\n";

        self.socket
            .write_all(json.as_bytes())
            .map_err(SinkError::DrainIOError)
    }

    fn describe(&self) -> String {
        format!("frontend using socket {:?}", self.socket)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_snapshot_per_line() {
        let mut sink = FrontendSink::new(Vec::<u8>::new());
        sink.drain(&api::Snapshot::empty(100, 50)).unwrap();
        sink.drain(&api::Snapshot::empty(200, 50)).unwrap();

        let out = String::from_utf8(sink.socket).unwrap();
        let snapshots: Vec<api::Snapshot> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].window.start, 150);
    }
}
