use anyhow::{Context, Result};
use sched_scope_api as api;
use serde_json::Deserializer;

fn main() -> Result<()> {
    // Create frontend socket in a temporary directory, print it for the parent backend.
    let socket_dir = tempfile::TempDir::new()
        .context("Failed to create temporary directory for frontend socket")?;
    let socket_path = socket_dir.path().join("sched-scope-frontend.socket");
    let listener = std::os::unix::net::UnixListener::bind(&socket_path)
        .context("Failed to bind frontend socket")?;
    println!("{}", socket_path.display());

    // Deserialize api::Snapshots from socket and print a summary of
    // each to stderr. Identical consecutive snapshots are skipped.
    let (socket, _addr) = listener.accept().context("Failed to accept()")?;
    let stream = Deserializer::from_reader(socket).into_iter::<api::Snapshot>();
    let mut prev: Option<String> = None;
    for snapshot in stream {
        let snapshot = snapshot.context("Failed to deserialize snapshot")?;
        let summary = summarize(&snapshot);
        if prev.as_ref() != Some(&summary) {
            eprintln!("@{} ms: {}", snapshot.now, summary);
            prev = Some(summary);
        }
    }

    Ok(())
}

fn summarize(snapshot: &api::Snapshot) -> String {
    let mut parts = vec![];
    for lane in &snapshot.cores {
        let running = lane
            .tasks
            .iter()
            .find(|t| t.intervals.iter().any(|s| s.open))
            .map(|t| t.task.as_str())
            .unwrap_or("-");
        parts.push(format!(
            "core {}: {} task(s), running {}",
            lane.core,
            lane.tasks.len(),
            running
        ));
    }
    for series in &snapshot.servers {
        if let Some(hold) = series.hold {
            parts.push(format!(
                "{}: budget {}",
                series.server,
                hold.value.saturating_sub(series.offset)
            ));
        }
    }

    parts.join("; ")
}
