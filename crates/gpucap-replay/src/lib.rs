//! Headless replay of a gpucap capture.
//!
//! The capture is loaded onto a [`MemoryDevice`] seeded with the application buffers given on
//! the command line, replayed in the requested mode, and summarized as JSON.

pub mod config;

use std::fs::{self, File};
use std::io::BufReader;
use std::sync::Arc;

use anyhow::Context;
use gpucap::memory_device::ExecutedDraw;
use gpucap::{EventId, MemoryDevice, ReplayReport, Replayer, Timeline};
use serde::Serialize;
use tracing::info;

pub use config::Config;

#[derive(Debug, Serialize)]
pub struct CaptureSummary {
    pub chunks: usize,
    pub sections: usize,
    pub last_event: EventId,
    pub drawcalls: usize,
    pub scratch_size: u64,
}

impl CaptureSummary {
    fn of(timeline: &Timeline) -> Self {
        Self {
            chunks: timeline.log().len(),
            sections: timeline.sections().len(),
            last_event: timeline.last_event(),
            // The root node is not a drawcall.
            drawcalls: timeline.tree().len().saturating_sub(1),
            scratch_size: timeline.scratch_size(),
        }
    }
}

/// One line of the draw tree as printed by `--tree`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    pub event_id: EventId,
    pub name: String,
    pub flags: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub capture: CaptureSummary,
    pub report: ReplayReport,
    pub executed: Vec<ExecutedDraw>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<Vec<TreeLine>>,
}

pub fn tree_lines(timeline: &Timeline) -> Vec<TreeLine> {
    let tree = timeline.tree();
    tree.walk()
        .into_iter()
        .map(|(depth, id)| {
            let draw = &tree.node(id).draw;
            TreeLine {
                depth,
                event_id: draw.event_id,
                name: draw.name.clone(),
                flags: draw.flags.names(),
            }
        })
        .collect()
}

/// Builds the device the capture is replayed on.
pub fn seeded_device(config: &Config) -> anyhow::Result<Arc<MemoryDevice>> {
    let device = Arc::new(MemoryDevice::new());
    for seed in &config.buffers {
        let data = fs::read(&seed.path)
            .with_context(|| format!("failed to read buffer {} from {}", seed.id.0, seed.path.display()))?;
        info!(buffer = seed.id.0, bytes = data.len(), "seeded buffer");
        device.insert_buffer(seed.id, data);
    }
    for zero in &config.zero_buffers {
        let len = usize::try_from(zero.size).context("zero buffer size does not fit in memory")?;
        device.insert_buffer(zero.id, vec![0; len]);
    }
    Ok(device)
}

pub fn run(config: &Config) -> anyhow::Result<ReplaySummary> {
    let device = seeded_device(config)?;
    let file = File::open(&config.capture)
        .with_context(|| format!("failed to open capture {}", config.capture.display()))?;
    let mut replayer = Replayer::open(Arc::clone(&device), BufReader::new(file))
        .with_context(|| format!("failed to load capture {}", config.capture.display()))?;

    let capture = CaptureSummary::of(replayer.timeline());
    info!(
        last_event = capture.last_event,
        sections = capture.sections,
        "capture loaded"
    );

    // Only what the requested replay executes goes into the summary.
    device.clear_history();
    let report = replayer
        .replay(config.mode)
        .with_context(|| format!("{:?} replay failed", config.mode))?;

    Ok(ReplaySummary {
        capture,
        report,
        executed: device.executed_draws(),
        tree: config.include_tree.then(|| tree_lines(replayer.timeline())),
    })
}

/// Runs the replay and writes the summary where the config says.
pub fn run_and_write(config: &Config) -> anyhow::Result<()> {
    let summary = run(config)?;
    let json = serde_json::to_string_pretty(&summary)?;
    match &config.output {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("failed to write summary to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
