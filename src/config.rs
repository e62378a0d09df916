use crate::diag;

use std::convert::TryInto;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use structopt::StructOpt;
use thiserror::Error;

/// Task names the stock firmware uses for housekeeping.
pub const DEFAULT_HIDDEN: [&str; 5] = ["Logger", "Tmr Svc", "IDLE0", "IDLE1", "HIDE"];

/// Options concerning the serial device. Only used when tracing.
#[derive(StructOpt, Debug, Default, Clone)]
pub struct SerialOptions {
    /// Serial device over which the trace stream is expected, e.g.
    /// /dev/ttyACM0 or COM5.
    #[structopt(name = "serial", long = "serial")]
    pub serial: Option<String>,

    /// Baud rate of the serial device.
    #[structopt(long = "baud")]
    pub baud: Option<u32>,

    /// Maximum time in milliseconds a single read blocks. Bounds how
    /// long a stop request waits for the ingestion loop.
    #[structopt(long = "read-timeout-ms")]
    pub read_timeout_ms: Option<u64>,
}

/// Options concerning what is sent to frontends.
#[derive(StructOpt, Debug, Default, Clone)]
pub struct ViewOptions {
    /// Interval in milliseconds between snapshots sent to frontends.
    #[structopt(long = "tick-ms")]
    pub tick_ms: Option<u64>,

    /// Length in milliseconds of device time to show.
    #[structopt(long = "window-ms")]
    pub window_ms: Option<i64>,

    /// Number of cores on the target.
    #[structopt(long = "cores")]
    pub cores: Option<usize>,

    /// Hide a task or server. May be repeated.
    #[structopt(long = "hide", number_of_values = 1)]
    pub hide: Vec<String>,

    /// Show a task or server that is hidden by default. May be repeated.
    #[structopt(long = "show", number_of_values = 1)]
    pub show: Vec<String>,

    /// Display offset between consecutive budget series.
    #[structopt(long = "budget-offset")]
    pub budget_offset: Option<i64>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
struct ScopeConfigIntermediate {
    pub serial: Option<String>,
    pub baud: Option<u32>,
    pub read_timeout_ms: Option<u64>,
    pub tick_ms: Option<u64>,
    pub window_ms: Option<i64>,
    pub cores: Option<usize>,
    pub hide: Option<Vec<String>>,
    pub budget_offset: Option<i64>,
    pub trace_dir: Option<PathBuf>,
}

impl ScopeConfigIntermediate {
    fn defaults() -> Self {
        Self {
            serial: None,
            baud: Some(115_200),
            read_timeout_ms: Some(1000),
            tick_ms: Some(50),
            window_ms: Some(10_000),
            cores: Some(2),
            hide: Some(DEFAULT_HIDDEN.iter().map(|s| s.to_string()).collect()),
            budget_offset: Some(500),
            trace_dir: Some(PathBuf::from("sched-traces")),
        }
    }

    pub fn complete_with(&mut self, other: Self) {
        macro_rules! complete {
            ($($f:ident),+) => {{
                $(
                    if self.$f.is_none() {
                        self.$f = other.$f;
                    }
                )+
            }}
        }
        complete!(
            serial,
            baud,
            read_timeout_ms,
            tick_ms,
            window_ms,
            cores,
            hide,
            budget_offset,
            trace_dir
        );
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeConfig {
    pub serial: Option<String>,
    pub baud: u32,
    pub read_timeout: Duration,
    pub tick: Duration,
    pub window_ms: i64,
    pub cores: usize,
    pub hidden: Vec<String>,
    pub budget_offset: i64,
    pub trace_dir: PathBuf,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file {} could not be read: {1}", .0.display())]
    ReadFailed(PathBuf, #[source] std::io::Error),
    #[error("Configuration file could not be parsed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("No serial device given")]
    MissingSerial,
    #[error("Baud rate must be non-zero")]
    ZeroBaud,
    #[error("Read timeout must be non-zero")]
    ZeroReadTimeout,
    #[error("Render tick interval must be non-zero")]
    ZeroTick,
    #[error("Window length must be positive, got {0} ms")]
    InvalidWindow(i64),
    #[error("Core count must be non-zero")]
    ZeroCores,
}

impl diag::DiagnosableError for ConfigError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::MissingSerial => vec!["Add `\"serial\": \"<your serial device>\"` to the configuration file or specify --serial".into()],
            Self::DeserializationFailed(_) => vec![
                "The configuration file is a JSON object with any of the keys serial, baud, read_timeout_ms, tick_ms, window_ms, cores, hide, budget_offset, trace_dir".into(),
            ],
            Self::ZeroBaud => vec!["Common baud rates are 9600 and 115200".into()],
            Self::ZeroTick => vec!["Frontends are commonly updated every 30 to 50 ms".into()],
            _ => vec![],
        }
    }
}

impl TryInto<ScopeConfig> for ScopeConfigIntermediate {
    type Error = ConfigError;

    fn try_into(self) -> Result<ScopeConfig, Self::Error> {
        let millis = |v: Option<u64>, err: ConfigError| match v {
            Some(0) | None => Err(err),
            Some(v) => Ok(Duration::from_millis(v)),
        };

        Ok(ScopeConfig {
            serial: self.serial,
            baud: match self.baud {
                Some(0) | None => return Err(Self::Error::ZeroBaud),
                Some(b) => b,
            },
            read_timeout: millis(self.read_timeout_ms, Self::Error::ZeroReadTimeout)?,
            tick: millis(self.tick_ms, Self::Error::ZeroTick)?,
            window_ms: match self.window_ms {
                Some(w) if w > 0 => w,
                w => return Err(Self::Error::InvalidWindow(w.unwrap_or_default())),
            },
            cores: match self.cores {
                Some(0) | None => return Err(Self::Error::ZeroCores),
                Some(c) => c,
            },
            hidden: self.hide.unwrap_or_default(),
            budget_offset: self.budget_offset.unwrap_or_default(),
            trace_dir: self.trace_dir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

impl ScopeConfig {
    /// Resolves the configuration from, in order of precedence,
    /// command-line options, the configuration `file`, and built-in
    /// defaults.
    pub fn new(
        file: Option<&Path>,
        serial: Option<&SerialOptions>,
        view: &ViewOptions,
        trace_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut int = ScopeConfigIntermediate::default();

        if let Some(opts) = serial {
            macro_rules! maybe_override {
                ($($f:ident),+) => {{
                    $(
                        if let Some($f) = &opts.$f {
                            int.$f = Some($f.to_owned());
                        }
                    )+
                }}
            }
            maybe_override!(serial, baud, read_timeout_ms);
        }
        {
            let opts = view;
            macro_rules! maybe_override {
                ($($f:ident),+) => {{
                    $(
                        if let Some($f) = &opts.$f {
                            int.$f = Some($f.to_owned());
                        }
                    )+
                }}
            }
            maybe_override!(tick_ms, window_ms, cores, budget_offset);
        }
        int.trace_dir = trace_dir.map(Path::to_path_buf);

        if let Some(file) = file {
            int.complete_with(ScopeConfigIntermediate::from_file(file)?);
        }
        int.complete_with(ScopeConfigIntermediate::defaults());

        // --hide and --show adjust whatever hide set is in effect.
        let mut hide = int.hide.take().unwrap_or_default();
        hide.retain(|h| !view.show.contains(h));
        for h in &view.hide {
            if !hide.contains(h) {
                hide.push(h.clone());
            }
        }
        int.hide = Some(hide);

        int.try_into()
    }

    /// The serial device to trace, which must have been given.
    pub fn require_serial(&self) -> Result<&str, ConfigError> {
        self.serial.as_deref().ok_or(ConfigError::MissingSerial)
    }
}
