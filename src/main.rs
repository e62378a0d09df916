use std::path::PathBuf;

use anyhow::Context;
use async_std::{prelude::*, process};
use crossbeam_channel as channel;
use futures::executor::block_on;
use structopt::StructOpt;
use thiserror::Error;

use sched_scope::config::{self, ScopeConfig, SerialOptions, ViewOptions};
use sched_scope::ingest::{self, CancelToken, IngestEvent};
use sched_scope::sinks::{self, Sink};
use sched_scope::sources::{self, Source};
use sched_scope::state::{IngestionState, SharedState, Stats};
use sched_scope::view::{ViewFilter, WindowedView};
use sched_scope::{clock, diag, log};

#[derive(Debug, StructOpt)]
struct Opts {
    /// PATH, relative, or absolute path to the frontend(s) to forward
    /// snapshots to. Tested in that order.
    #[structopt(long = "frontend", short = "-F", default_value = "dummy")]
    frontends: Vec<String>,

    /// JSON file with default options. Command-line options take
    /// precedence.
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

/// Trace a target over a serial device, forward snapshots to frontends
/// and record the trace stream to file.
#[derive(StructOpt, Debug)]
struct TraceOptions {
    #[structopt(flatten)]
    serial: SerialOptions,

    /// Output directory for recorded trace streams. By default,
    /// ./sched-traces is used.
    #[structopt(long = "trace-dir", parse(from_os_str))]
    trace_dir: Option<PathBuf>,

    /// Remove all previous traces from <trace-dir>.
    #[structopt(name = "clear-traces", long = "clear-traces")]
    remove_prev_traces: bool,

    /// Do not record the trace stream.
    #[structopt(long = "dont-record", conflicts_with("clear-traces"))]
    dont_record: bool,

    #[structopt(flatten)]
    view: ViewOptions,
}

/// Replay a previously recorded trace stream for post-mortem analysis.
#[derive(StructOpt, Debug)]
struct ReplayOptions {
    #[structopt(name = "list", long = "list", short = "l")]
    list: bool,

    /// Relative path to trace file to replay.
    #[structopt(name = "trace-file", long = "trace-file", parse(from_os_str))]
    trace_file: Option<PathBuf>,

    #[structopt(required_unless_one(&["list", "trace-file"]))]
    index: Option<usize>,

    /// Directory where previously recorded trace streams are. By
    /// default, ./sched-traces is used.
    #[structopt(name = "trace-dir", long = "trace-dir", parse(from_os_str))]
    trace_dir: Option<PathBuf>,

    #[structopt(flatten)]
    view: ViewOptions,
}

#[derive(StructOpt, Debug)]
enum Command {
    Trace(TraceOptions),
    Replay(ReplayOptions),
    /// List the serial devices available on this host.
    ListPorts,
}

#[derive(Debug, Error)]
pub enum SchedScopeError {
    // adhoc errors
    #[error("I/O operation failed: {0}")]
    IOError(#[from] std::io::Error),

    // transparent errors
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error(transparent)]
    SourceError(#[from] sources::SourceError),
    #[error(transparent)]
    SinkError(#[from] sinks::SinkError),

    // everything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl diag::DiagnosableError for SchedScopeError {}

impl SchedScopeError {
    pub fn render(&self) {
        log::err(format!("{:#}", self));

        // print eventual hints
        use sched_scope::diag::DiagnosableError;
        type DE = dyn DiagnosableError;
        for hint in self.diagnose().iter().chain(
            match self {
                Self::ConfigError(e) => Some(e as &DE),
                Self::SourceError(e) => Some(e as &DE),
                Self::SinkError(e) => Some(e as &DE),
                _ => None,
            }
            .map(|e| e.diagnose())
            .unwrap_or_default()
            .iter(),
        ) {
            log::hint(hint.to_owned());
        }
    }
}

fn main() {
    if let Err(e) = block_on(main_try()) {
        e.render();
        std::process::exit(1);
    }
}

async fn main_try() -> Result<(), SchedScopeError> {
    let opts = Opts::from_args();
    let cancel = CancelToken::new();

    // Resolve the configuration and open the source. We want to fail
    // fast on any I/O issues, before any frontend is started.
    let (config, source, recorder) = match &opts.cmd {
        Command::ListPorts => {
            list_ports()?;
            return Ok(());
        }
        Command::Trace(topts) => trace(&opts, topts, &cancel)?,
        Command::Replay(ropts) => match replay(&opts, ropts).with_context(|| {
            format!(
                "Failed to {}",
                if ropts.list {
                    "index traces"
                } else {
                    "replay trace"
                }
            )
        })? {
            Some(tup) => tup,
            None => return Ok(()), // NOTE --list was passed
        },
    };
    let description = source.describe();

    // Spawn frontend children and get path to sockets. Create and push sinks.
    let mut sinks: Vec<Box<dyn Sink>> = vec![];
    let mut children = vec![];
    for frontend in &opts.frontends {
        // Try to spawn the frontend from PATH. If that fails, try a relative path instead.
        let executables = [
            format!("sched-scope-frontend-{}", frontend), // PATH
            format!("./{}", frontend),                    // relative
            format!("/{}", frontend),                     // absolute
        ];
        let mut child = executables
            .iter()
            .find_map(|e| {
                process::Command::new(e)
                    .stdout(process::Stdio::piped())
                    .stderr(process::Stdio::piped())
                    .spawn()
                    .ok()
            })
            .with_context(|| {
                format!(
                    "Failed to spawn a frontend child process from tested paths (PATH, relative, absolute): {:#?}",
                    executables
                )
            })?;
        {
            let socket_path = {
                async_std::io::BufReader::new(
                    child
                        .stdout
                        .take()
                        .context("Failed to pipe frontend stdout")?,
                )
                .lines()
                .next()
                .await
                .context("Frontend closed stdout before reporting its socket")?
            }
            .context("Failed to read socket path from frontend child process")?;
            let socket = std::os::unix::net::UnixStream::connect(&socket_path)
                .context("Failed to connect to frontend socket")?;
            sinks.push(Box::new(sinks::FrontendSink::new(socket)));
        }

        let stderr = child
            .stderr
            .take()
            .context("Failed to take frontend stderr")?;
        children.push((child, stderr));
    }

    // Wrap frontend stderrs in a poll_next wrapper such that
    // Stream::next polls the stderrs of all spawned frontends.
    let stderrs = StderrLines {
        stderrs: children
            .iter_mut()
            .map(|(_c, stderr)| async_std::io::BufReader::new(stderr).lines())
            .collect(),
        frontends: opts.frontends.clone(),
    };

    let state = SharedState::new(IngestionState::new(Box::new(clock::SystemClock)));
    let view = WindowedView::new(
        config.window_ms,
        config.budget_offset,
        config.cores,
        ViewFilter::new(config.hidden.iter().cloned()),
    );

    // Record the run-time duration of the below run_loop.
    let instant = std::time::Instant::now();

    // All preparatory I/O done. Ingest on a separate thread and send
    // snapshots to all sinks on every tick.
    let ingestion = ingest::spawn(source, state.clone(), recorder, cancel.clone())
        .context("Failed to spawn ingestion thread")?;
    let run = RunContext {
        description: &description,
        verb: match opts.cmd {
            Command::Trace(_) => "Tracing",
            _ => "Replaying",
        },
        tick: config.tick,
    };
    let stats = run_loop(&run, ingestion, state, view, sinks, stderrs).await;

    // Wait for frontends to proccess all snapshots and flush any
    // remaining stderr lines.
    for (i, (child, stderr)) in children.iter_mut().enumerate() {
        let status = child.status().await;
        let mut errors = async_std::io::BufReader::new(stderr).lines();
        while let Some(err) = errors.next().await {
            log::frontend(format!(
                "{}: {}",
                opts.frontends[i],
                err.context("Failed to read frontend stderr")?
            ));
        }
        if let Err(err) = status {
            log::err(format!(
                "frontend {} exited non-zero: {}",
                opts.frontends[i], err
            ));
        }
    }

    let (stats, sinks) = stats?;
    let duration = instant.elapsed();
    log::status(
        match opts.cmd {
            Command::Trace(_) => "Traced",
            _ => "Replayed",
        },
        format!(
            "{}.",
            format_status_message(&description, &stats, sinks, &duration)
        ),
    );

    Ok(())
}

type SourceTuple = (ScopeConfig, Box<dyn Source>, Option<sinks::FileSink>);

fn trace(
    opts: &Opts,
    topts: &TraceOptions,
    cancel: &CancelToken,
) -> Result<SourceTuple, SchedScopeError> {
    let config = ScopeConfig::new(
        opts.config.as_deref(),
        Some(&topts.serial),
        &topts.view,
        topts.trace_dir.as_deref(),
    )?;
    let device = config.require_serial()?.to_string();

    let port = sources::tty::configure(&device, config.baud, config.read_timeout)?;
    let source = sources::TTYSource::new(port, cancel.clone());

    let recorder = if topts.dont_record {
        None
    } else {
        let sink = sinks::FileSink::generate_trace_file(
            &device,
            &config.trace_dir,
            topts.remove_prev_traces,
        )?;
        log::status("Recording", format!("to {}", sink.path().display()));
        Some(sink)
    };

    log::status(
        "Opened",
        format!(
            "{} at {} baud; {} core(s), hiding {:?}",
            source.describe(),
            config.baud,
            config.cores,
            config.hidden
        ),
    );

    Ok((config, Box::new(source), recorder))
}

fn replay(opts: &Opts, ropts: &ReplayOptions) -> Result<Option<SourceTuple>, SchedScopeError> {
    let config = ScopeConfig::new(
        opts.config.as_deref(),
        None,
        &ropts.view,
        ropts.trace_dir.as_deref(),
    )?;

    match ropts {
        ReplayOptions { list: true, .. } => {
            let traces = sinks::file::find_trace_files(config.trace_dir.clone())?;
            for (i, trace) in traces.enumerate() {
                println!("{}\t{}", i, trace.display());
            }

            Ok(None)
        }
        ReplayOptions {
            trace_file: Some(file),
            ..
        } => {
            let src = sources::FileSource::open(file)?;
            Ok(Some((config, Box::new(src), None)))
        }
        ReplayOptions {
            index: Some(idx), ..
        } => {
            let trace = sinks::file::find_trace_files(config.trace_dir.clone())?
                .nth(*idx)
                .with_context(|| format!("No trace with index {}", *idx))?;

            let src = sources::FileSource::open(&trace)?;
            Ok(Some((config, Box::new(src), None)))
        }
        _ => unreachable!(),
    }
}

fn list_ports() -> Result<(), SchedScopeError> {
    let ports = serialport::available_ports().context("Failed to enumerate serial devices")?;
    if ports.is_empty() {
        log::warn("no serial devices found".to_string());
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }

    Ok(())
}

fn format_status_message(
    description: &str,
    stats: &Stats,
    sinks: (usize, usize),
    duration: &std::time::Duration,
) -> String {
    fn format_duration(duration: &std::time::Duration) -> String {
        match duration.as_secs() {
            duration if duration >= 60 * 60 => {
                let secs = duration % 60;
                let mins = (duration / 60) % 60;
                let hours = duration / 60 / 60;

                format!("{}h {}min {}s", hours, mins, secs)
            }
            duration if duration >= 60 => {
                let secs = duration % 60;
                let mins = (duration / 60) % 60;

                format!("{}min {}s", mins, secs)
            }
            duration => {
                let secs = duration % 60;

                format!("{}s", secs)
            }
        }
    }

    format!(
        "{}: {} lines processed in {time} (~{lines_per_sec:.1} lines/s; {} task switches, {} budget samples, {} malformed, {} ignored); {sinks}",
        description,
        stats.lines,
        stats.activity,
        stats.budget,
        stats.malformed,
        stats.ignored,
        time = format_duration(duration),
        lines_per_sec = stats.lines as f32 / duration.as_secs_f32().max(1.0),
        sinks = format!("{}/{} sinks operational", sinks.0, sinks.1),
    )
}

struct StderrLines<R>
where
    R: async_std::io::BufRead + std::marker::Unpin,
{
    pub(crate) stderrs: Vec<async_std::io::Lines<R>>,
    pub(crate) frontends: Vec<String>,
}

use async_std::pin::Pin;
use async_std::task::{self, Poll};

impl<R> async_std::stream::Stream for StderrLines<R>
where
    R: async_std::io::BufRead + std::marker::Unpin,
{
    type Item = async_std::io::Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Option<Self::Item>> {
        for (i, stderr) in self.stderrs.iter_mut().enumerate() {
            match Pin::new(stderr).poll_next(cx) {
                Poll::Ready(Some(Ok(line))) => {
                    return Poll::Ready(Some(Ok(format!("{}: {}", self.frontends[i], line))))
                }
                item @ Poll::Ready(_) => return item,
                Poll::Pending => continue,
            }
        }

        task::Poll::Pending
    }
}

struct RunContext<'a> {
    description: &'a str,
    verb: &'static str,
    tick: std::time::Duration,
}

async fn run_loop<R>(
    run: &RunContext<'_>,
    ingestion: ingest::Ingestion,
    state: SharedState,
    view: WindowedView,
    mut sinks: Vec<Box<dyn Sink>>,
    mut stderrs: StderrLines<R>,
) -> Result<(Stats, (usize, usize)), SchedScopeError>
where
    R: async_std::io::BufRead + std::marker::Unpin,
{
    // Any early return drops `ingestion`, which stops the loop and
    // releases the source.

    // Setup SIGINT handler.
    let (tx, halt) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("Failed to install SIGINT handler")?;

    let nsinks = sinks.len();
    let instant = std::time::Instant::now();
    let ticker = channel::tick(run.tick);
    let never = channel::never();
    let mut frozen = false;

    let result = loop {
        let events = if frozen { &never } else { ingestion.events() };
        channel::select! {
            recv(ticker) -> _ => {
                // The lock is held for the duration of the snapshot
                // only; sinks are drained without it.
                let snapshot = view.snapshot(&state.lock());

                sinks.retain_mut(|sink| match sink.drain(&snapshot) {
                    Ok(()) => true,
                    Err(e) => {
                        log::err(format!(
                            "failed to drain snapshot to {}: {}",
                            sink.describe(),
                            e
                        ));
                        false
                    }
                });
                if nsinks > 0 && sinks.is_empty() {
                    break Err(anyhow::anyhow!("All sinks are broken. Cannot continue.").into());
                }
            },
            recv(halt) -> _ => break Ok(()),
            recv(events) -> event => {
                match event {
                    Ok(IngestEvent::Finished) => log::status(
                        "Finished",
                        format!("reading {}; showing collected data until interrupted", run.description),
                    ),
                    Ok(IngestEvent::Failed(e)) => {
                        SchedScopeError::from(e).render();
                    }
                    Err(_) => (),
                }

                // Reported once; the view is frozen from here on.
                frozen = true;
            },
        }

        if let Poll::Ready(Some(line)) = futures::poll!(stderrs.next()) {
            match line {
                Ok(line) => log::frontend(line),
                Err(e) => break Err(anyhow::Error::new(e)
                    .context("Failed to read frontend stderr")
                    .into()),
            }
        }

        let stats = state.lock().stats();
        log::cont_status(
            if frozen { "Frozen" } else { run.verb },
            format!(
                "{}...",
                format_status_message(
                    run.description,
                    &stats,
                    (sinks.len(), nsinks),
                    &instant.elapsed()
                )
            ),
        );
    };

    // Stop the ingestion loop and release the source. A TTY source
    // notices the cancellation within its read timeout.
    ingestion.shutdown();

    let stats = state.lock().stats();
    result.map(|()| (stats, (sinks.len(), nsinks)))
}
