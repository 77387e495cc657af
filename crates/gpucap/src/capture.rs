//! Capture-side entry point.
//!
//! Command buffers are recorded concurrently, one [`CommandRecorder`] per thread. Only
//! registration and submission touch shared state: they serialize on the timeline lock so the
//! global event order is the order submissions happened in.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gpucap_chunklog::{ChunkWriteError, ChunkWriter, LogHeader};
use tracing::{debug, info};

use crate::bake::BakeError;
use crate::command::{CommandKind, DecodeError};
use crate::context::{CommandBufferLevel, CommandBufferUsage};
use crate::device::{CommandTarget, Device, DeviceError};
use crate::ids::{CommandBufferId, EventId};
use crate::recorder::{CommandRecorder, RecordedCommandBuffer};
use crate::timeline::{executed_secondaries, Timeline};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Bake(#[from] BakeError),
    #[error(transparent)]
    InvalidCommand(#[from] DecodeError),
    #[error("{0:?} is recorded by the capture layer itself")]
    NotRecordable(CommandKind),
    #[error("{0} is not a primary command buffer")]
    NotPrimary(CommandBufferId),
    #[error("{0} is not a secondary command buffer")]
    NotSecondary(CommandBufferId),
    #[error("{0} is executed but was never registered")]
    UnknownSecondary(CommandBufferId),
    #[error("failed to write capture: {0}")]
    Write(#[from] ChunkWriteError),
}

pub struct Capture<D: Device + ?Sized> {
    device: Arc<D>,
    timeline: Mutex<Timeline>,
}

impl<D: Device + ?Sized> Capture<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            timeline: Mutex::new(Timeline::new()),
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Starts recording a command buffer. The recorder can be moved to another thread.
    pub fn begin_command_buffer(
        &self,
        id: CommandBufferId,
        level: CommandBufferLevel,
        usage: CommandBufferUsage,
    ) -> Result<CommandRecorder<D>, CaptureError> {
        CommandRecorder::begin(Arc::clone(&self.device), id, level, usage)
    }

    /// Makes a finished secondary command buffer available to later submissions. Registering the
    /// same id again replaces the previous recording.
    pub fn register_secondary(&self, rec: RecordedCommandBuffer) -> Result<(), CaptureError> {
        if rec.level != CommandBufferLevel::Secondary {
            return Err(CaptureError::NotSecondary(rec.id));
        }
        let mut timeline = self.lock();
        let section = timeline.add_secondary(rec);
        debug!(section, "registered secondary command buffer");
        Ok(())
    }

    /// Submits primary command buffers in order, then bakes each onto the timeline.
    pub fn submit(&self, cbs: Vec<RecordedCommandBuffer>) -> Result<(), CaptureError> {
        let mut timeline = self.lock();
        for rec in &cbs {
            if rec.level != CommandBufferLevel::Primary {
                return Err(CaptureError::NotPrimary(rec.id));
            }
            for sec in executed_secondaries(rec)? {
                if !timeline.has_secondary(sec) {
                    return Err(CaptureError::UnknownSecondary(sec));
                }
            }
        }

        for rec in cbs {
            self.device.submit(CommandTarget::Original(rec.id))?;
            let cb = rec.id;
            let section = timeline.bake_primary(&*self.device, rec)?;
            info!(
                cb = cb.0,
                section,
                last_event = timeline.last_event(),
                "submitted command buffer"
            );
        }
        Ok(())
    }

    pub fn last_event(&self) -> EventId {
        self.lock().last_event()
    }

    /// Locks the timeline for inspection. Submissions block while the guard is held.
    pub fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.lock()
    }

    /// Serializes every real chunk recorded so far.
    pub fn write_log<W: Write>(&self, writer: W) -> Result<W, CaptureError> {
        let timeline = self.lock();
        let mut out = ChunkWriter::new(writer, LogHeader::default())?;
        out.write_log(timeline.log())?;
        Ok(out.finish()?)
    }

    fn lock(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
