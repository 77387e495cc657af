//! `gpucap` records command buffers into a chunk log and replays them, fully or in part.
//!
//! Capture side:
//! - [`Capture`] hands out a [`CommandRecorder`] per command buffer. Recorders run on any
//!   thread; [`Capture::submit`] orders them into one global event timeline.
//! - Indirect draws and dispatches have their argument buffers read back at submit time and
//!   expanded into per-sub-draw chunks (see [`indirect`] and [`snapshot`]), so the draw tree
//!   shows every sub-draw as its own event.
//!
//! Replay side:
//! - [`Replayer::load`] re-executes the log and rebuilds the same [`Timeline`].
//! - [`Replayer::replay`] replays everything, a prefix ending at an event, or a single event.
//!   Multi-draws cut inside the range have their indirect arguments patched so the replay stops
//!   at exactly the requested sub-draw.
//!
//! The graphics API is abstracted behind [`Device`]; [`MemoryDevice`] implements it in memory.

mod bake;
mod callback;
mod capture;
mod context;
mod recorder;
mod timeline;

pub mod command;
pub mod device;
pub mod draw;
pub mod ids;
pub mod indirect;
pub mod memory_device;
pub mod replay;
pub mod snapshot;
pub mod tree;
pub mod usage;

pub use bake::{BakeError, BakedSection, ChunkSink, SecondaryExecution};
pub use callback::DrawcallCallback;
pub use capture::{Capture, CaptureError};
pub use command::{Command, CommandCategory, CommandKind, DecodeError};
pub use context::{
    CommandBufferContext, CommandBufferLevel, CommandBufferUsage, RenderPassState, MAX_VERTEX_BINDINGS,
};
pub use device::{CommandTarget, Device, DeviceError, DeviceOp};
pub use draw::{ApiEvent, DrawFlags, DrawcallDescription};
pub use ids::{CommandBufferId, EventId, ResourceId};
pub use memory_device::MemoryDevice;
pub use recorder::{CommandRecorder, RecordedCommandBuffer};
pub use replay::{ReplayError, ReplayMode, ReplayReport, Replayer};
pub use timeline::{PartialRanges, PartialReplayRange, SectionInfo, Timeline};
pub use tree::{DrawTree, DrawTreeNode, NodeId};
pub use usage::{EventUsage, ResourceUsage, ResourceUsageLedger};
