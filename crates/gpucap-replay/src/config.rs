use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use gpucap::{EventId, ReplayMode, ResourceId};

#[derive(Debug, Clone, Parser)]
#[command(name = "gpucap-replay", version, about = "Replays a gpucap capture on the in-memory device")]
pub struct Args {
    /// Capture log to replay.
    pub capture: PathBuf,

    /// Which part of the capture to replay.
    ///
    /// Environment variable: `GPUCAP_REPLAY_MODE`.
    #[arg(long, value_enum, default_value_t = ModeArg::Full, env = "GPUCAP_REPLAY_MODE")]
    pub mode: ModeArg,

    /// Event the replay stops at (`prefix`) or replays alone (`single`).
    ///
    /// Environment variable: `GPUCAP_REPLAY_EVENT`.
    #[arg(long, env = "GPUCAP_REPLAY_EVENT")]
    pub event: Option<EventId>,

    /// Seeds an application buffer from a file, as `<id>=<path>`. Repeatable.
    #[arg(long = "buffer", value_name = "ID=PATH")]
    pub buffers: Vec<BufferSeed>,

    /// Seeds a zero-filled application buffer, as `<id>=<bytes>`. Repeatable.
    #[arg(long = "zero-buffer", value_name = "ID=BYTES")]
    pub zero_buffers: Vec<ZeroBuffer>,

    /// Include the draw tree in the summary.
    #[arg(long)]
    pub tree: bool,

    /// Write the JSON summary here instead of stdout.
    ///
    /// Environment variable: `GPUCAP_REPLAY_OUTPUT`.
    #[arg(long, env = "GPUCAP_REPLAY_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `GPUCAP_LOG`.
    #[arg(long, env = "GPUCAP_LOG", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Full,
    Prefix,
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSeed {
    pub id: ResourceId,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroBuffer {
    pub id: ResourceId,
    pub size: u64,
}

fn split_assignment(s: &str) -> anyhow::Result<(ResourceId, &str)> {
    let (id, value) = s
        .split_once('=')
        .with_context(|| format!("expected <id>=<value>, got {s:?}"))?;
    let id: u64 = id
        .trim()
        .parse()
        .with_context(|| format!("invalid resource id {id:?}"))?;
    if id == 0 {
        bail!("resource id 0 is the null resource");
    }
    Ok((ResourceId(id), value))
}

impl FromStr for BufferSeed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, path) = split_assignment(s)?;
        if path.is_empty() {
            bail!("missing path for buffer {}", id.0);
        }
        Ok(Self {
            id,
            path: PathBuf::from(path),
        })
    }
}

impl FromStr for ZeroBuffer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, size) = split_assignment(s)?;
        let size = size
            .trim()
            .parse()
            .with_context(|| format!("invalid size {size:?} for buffer {}", id.0))?;
        Ok(Self { id, size })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub capture: PathBuf,
    pub mode: ReplayMode,
    pub buffers: Vec<BufferSeed>,
    pub zero_buffers: Vec<ZeroBuffer>,
    pub include_tree: bool,
    pub output: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let mode = match (args.mode, args.event) {
            (ModeArg::Full, None) => ReplayMode::Full,
            (ModeArg::Full, Some(event)) => bail!("--event {event} has no effect on a full replay"),
            (ModeArg::Prefix, Some(last_event)) => ReplayMode::Prefix { last_event },
            (ModeArg::Single, Some(event)) => ReplayMode::Single { event },
            (ModeArg::Prefix | ModeArg::Single, None) => {
                bail!("--event is required for {:?} replays", args.mode)
            }
        };

        Ok(Self {
            capture: args.capture,
            mode,
            buffers: args.buffers,
            zero_buffers: args.zero_buffers,
            include_tree: args.tree,
            output: args.output,
            log_level: args.log_level,
            log_json: args.log_json,
        })
    }
}
