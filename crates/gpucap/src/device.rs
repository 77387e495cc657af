//! The device seam: everything the engine asks of the underlying graphics API.

use bitflags::bitflags;
use serde::Serialize;

use crate::command::{BufferCopy, Command};
use crate::ids::{CommandBufferId, ResourceId};

/// Size value meaning "to the end of the buffer".
pub const WHOLE_SIZE: u64 = u64::MAX;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const SHADER_READ = 1 << 4;
        const SHADER_WRITE = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 7;
        const TRANSFER_READ = 1 << 8;
        const TRANSFER_WRITE = 1 << 9;
        const HOST_READ = 1 << 10;
        const HOST_WRITE = 1 << 11;
        const MEMORY_READ = 1 << 12;
        const MEMORY_WRITE = 1 << 13;
        const TRANSFORM_FEEDBACK_WRITE = 1 << 14;
        const TRANSFORM_FEEDBACK_COUNTER_READ = 1 << 15;
        const TRANSFORM_FEEDBACK_COUNTER_WRITE = 1 << 16;

        const ALL_WRITES = Self::SHADER_WRITE.bits()
            | Self::COLOR_ATTACHMENT_WRITE.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_WRITE.bits()
            | Self::TRANSFER_WRITE.bits()
            | Self::HOST_WRITE.bits()
            | Self::MEMORY_WRITE.bits()
            | Self::TRANSFORM_FEEDBACK_WRITE.bits()
            | Self::TRANSFORM_FEEDBACK_COUNTER_WRITE.bits();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: ResourceId,
    pub offset: u64,
    pub size: u64,
    pub src_access: Access,
    pub dst_access: Access,
}

/// Where an operation is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CommandTarget {
    /// The command buffer as the application recorded it.
    Original(CommandBufferId),
    /// A truncated re-recording of a command buffer, used by partial replay.
    Rerecord(CommandBufferId),
    /// A command buffer supplied by the caller of a single-event replay.
    Outside,
    /// One-shot context used to prepare the indirect scratch buffer. Its work is ordered before
    /// whatever is recorded into the other targets after it ends.
    Scratch,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceOp<'a> {
    Command(&'a Command),
    Barrier(BufferBarrier),
    CopyBuffer {
        src: ResourceId,
        dst: ResourceId,
        region: BufferCopy,
    },
    FillBuffer {
        buffer: ResourceId,
        offset: u64,
        size: u64,
        data: u32,
    },
    /// Runs a secondary command buffer from the target being recorded.
    Execute(CommandTarget),
    BeginMarker(&'a str),
    EndMarker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Host-readable snapshot of indirect arguments.
    Readback,
    /// Device-local buffer the patcher rewrites indirect arguments into.
    IndirectScratch,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("unknown buffer {0}")]
    UnknownBuffer(ResourceId),
    #[error("access to {buffer} at {offset}+{size} is out of bounds")]
    OutOfBounds {
        buffer: ResourceId,
        offset: u64,
        size: u64,
    },
    #[error("scratch context is {0}")]
    ScratchState(&'static str),
    #[error("device failure: {0}")]
    Backend(String),
}

/// The underlying graphics API, as seen by capture and replay.
///
/// Methods take `&self`: recorders on different threads share one device.
pub trait Device {
    fn record(&self, target: CommandTarget, op: DeviceOp<'_>) -> Result<(), DeviceError>;

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<ResourceId, DeviceError>;

    fn begin_scratch(&self) -> Result<(), DeviceError>;

    fn end_scratch(&self) -> Result<(), DeviceError>;

    fn submit(&self, target: CommandTarget) -> Result<(), DeviceError>;

    /// Reads buffer memory. Only valid once the work that wrote it has been submitted.
    fn read_buffer(&self, buffer: ResourceId, offset: u64, size: u64)
        -> Result<Vec<u8>, DeviceError>;
}
