//! Replay of a captured chunk log.
//!
//! [`Replayer::load`] runs the initial pass: every command buffer in the log is re-executed on the
//! device as recorded, submitted, and baked exactly as capture did, so the replay timeline has the
//! same event ids, draw tree and `DrawcallUse` index as the capture. [`Replayer::replay`] then
//! replays the whole capture or a part of it.

mod executor;
mod patch;

use std::io::{Read, Seek};
use std::sync::Arc;

use gpucap_chunklog::{ChunkLog, ChunkReadError, ChunkReader};
use serde::Serialize;
use tracing::{debug, info};

use crate::bake::BakeError;
use crate::callback::DrawcallCallback;
use crate::command::{Command, DecodeError};
use crate::context::{CommandBufferContext, CommandBufferLevel};
use crate::device::{CommandTarget, Device, DeviceError};
use crate::ids::{CommandBufferId, EventId, ResourceId};
use crate::recorder::{execute_command, RecordedCommandBuffer};
use crate::timeline::Timeline;

use executor::ReplayPass;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Read(#[from] ChunkReadError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Bake(#[from] BakeError),
    #[error("event {event} is outside the capture (last event is {last})")]
    EventOutOfRange { event: EventId, last: EventId },
    #[error("indirect scratch buffer needs {needed} bytes but only {capacity} were reserved")]
    ScratchOverflow { needed: u64, capacity: u64 },
    #[error("{0} is never ended")]
    UnterminatedSection(CommandBufferId),
    #[error("chunk at offset {offset} is outside a command buffer or interleaved with another")]
    InterleavedSection { offset: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReplayMode {
    /// Everything, from the first event to the last.
    Full,
    /// From the start of the capture up to and including `last_event`.
    Prefix { last_event: EventId },
    /// Only the chunk that owns `event`, recorded into a caller-owned command buffer after the
    /// render pass state it needs.
    Single { event: EventId },
}

/// What a replay pass did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub mode: ReplayMode,
    pub first_event: EventId,
    pub last_event: EventId,
    /// Targets submitted to the device, in order.
    pub submitted: Vec<CommandTarget>,
    pub rerecorded: Vec<CommandBufferId>,
    /// Chunks left out because they come after the last event.
    pub truncated_chunks: usize,
    /// Multi-draw chunks skipped because no event matched their log offset.
    pub unresolved_offsets: Vec<u64>,
}

impl ReplayReport {
    fn new(mode: ReplayMode, first_event: EventId, last_event: EventId) -> Self {
        Self {
            mode,
            first_event,
            last_event,
            submitted: Vec::new(),
            rerecorded: Vec::new(),
            truncated_chunks: 0,
            unresolved_offsets: Vec::new(),
        }
    }
}

/// Device buffer the patcher rewrites indirect arguments into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ScratchBuffer {
    pub buffer: ResourceId,
    pub capacity: u64,
}

pub struct Replayer<D: Device + ?Sized> {
    device: Arc<D>,
    timeline: Timeline,
    callback: Option<Box<dyn DrawcallCallback>>,
    scratch: Option<ScratchBuffer>,
}

/// A command buffer being re-executed by the initial pass.
struct OpenSection {
    ctx: CommandBufferContext,
    rec: RecordedCommandBuffer,
}

impl<D: Device + ?Sized> Replayer<D> {
    /// Runs the initial pass over `log`.
    pub fn load(device: Arc<D>, log: &ChunkLog) -> Result<Self, ReplayError> {
        let mut timeline = Timeline::new();
        let mut open: Option<OpenSection> = None;

        for chunk in log.real_chunks() {
            let (cb, cmd) = Command::from_chunk(chunk)?;
            if let Command::BeginCommandBuffer { level, usage } = cmd {
                if open.is_some() {
                    return Err(ReplayError::InterleavedSection {
                        offset: chunk.offset,
                    });
                }
                open = Some(OpenSection {
                    ctx: CommandBufferContext::new(cb, level, usage),
                    rec: RecordedCommandBuffer {
                        id: cb,
                        level,
                        usage,
                        chunks: Vec::new(),
                        patches: Vec::new(),
                    },
                });
            }

            let Some(section) = open.as_mut().filter(|s| s.ctx.id == cb) else {
                return Err(ReplayError::InterleavedSection {
                    offset: chunk.offset,
                });
            };
            let patch = execute_command(&*device, &mut section.ctx, CommandTarget::Original(cb), &cmd)?;
            section.rec.chunks.push(chunk.clone());
            section.rec.patches.push(patch);

            if cmd == Command::EndCommandBuffer {
                if let Some(section) = open.take() {
                    Self::finish_section(&*device, &mut timeline, section.rec)?;
                }
            }
        }

        if let Some(section) = open {
            return Err(ReplayError::UnterminatedSection(section.ctx.id));
        }

        info!(
            sections = timeline.sections().len(),
            chunks = timeline.log().len(),
            last_event = timeline.last_event(),
            "loaded capture"
        );
        Ok(Self {
            device,
            timeline,
            callback: None,
            scratch: None,
        })
    }

    /// Reads a serialized log and runs the initial pass over it.
    pub fn open<R: Read + Seek>(device: Arc<D>, reader: R) -> Result<Self, ReplayError> {
        let log = ChunkReader::open(reader)?.read_log()?;
        Self::load(device, &log)
    }

    fn finish_section(
        device: &D,
        timeline: &mut Timeline,
        rec: RecordedCommandBuffer,
    ) -> Result<(), ReplayError> {
        match rec.level {
            CommandBufferLevel::Secondary => {
                timeline.add_secondary(rec);
            }
            CommandBufferLevel::Primary => {
                device.submit(CommandTarget::Original(rec.id))?;
                timeline.bake_primary(device, rec)?;
            }
        }
        Ok(())
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Installs per-action hooks for every later replay.
    pub fn set_callback(&mut self, callback: Box<dyn DrawcallCallback>) {
        self.callback = Some(callback);
    }

    pub fn take_callback(&mut self) -> Option<Box<dyn DrawcallCallback>> {
        self.callback.take()
    }

    pub fn replay(&mut self, mode: ReplayMode) -> Result<ReplayReport, ReplayError> {
        let last = self.timeline.last_event();
        let (first_event, last_event) = match mode {
            ReplayMode::Full => (1, last),
            ReplayMode::Prefix { last_event } => (1, last_event),
            ReplayMode::Single { event } => (event, event),
        };
        if mode == ReplayMode::Full && last == 0 {
            debug!("nothing to replay");
            return Ok(ReplayReport::new(mode, 0, 0));
        }

        let ranges = self
            .timeline
            .partial_ranges(first_event, last_event)
            .ok_or(ReplayError::EventOutOfRange {
                event: last_event,
                last,
            })?;

        let mut pass = ReplayPass {
            device: &*self.device,
            timeline: &self.timeline,
            callback: self.callback.as_deref_mut(),
            scratch: &mut self.scratch,
            report: ReplayReport::new(mode, first_event, last_event),
        };
        match mode {
            ReplayMode::Single { .. } => pass.run_single(ranges)?,
            ReplayMode::Full | ReplayMode::Prefix { .. } => pass.run_prefix(ranges)?,
        }
        let report = pass.report;

        info!(
            ?mode,
            first_event,
            last_event,
            submitted = report.submitted.len(),
            truncated = report.truncated_chunks,
            "replay finished"
        );
        Ok(report)
    }
}
