//! A [`Device`] that executes command streams against host memory.
//!
//! Buffers are byte vectors; transfers and indirect argument reads are applied for real, and
//! every draw or dispatch that would reach the GPU is appended to [`MemoryDevice::executed_draws`]
//! with the arguments it consumed. Images and pipelines are not modelled. Headless replay and
//! the tests run on it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::trace;

use crate::command::{BufferCopy, Command, CommandKind};
use crate::device::{
    BufferBarrier, BufferUsage, CommandTarget, Device, DeviceError, DeviceOp, WHOLE_SIZE,
};
use crate::ids::ResourceId;
use crate::indirect::{DrawIndirectArgs, IndirectArgs, IndirectPatchKind};

/// Buffers created by the device itself are numbered from here, clear of application ids.
const FIRST_DEVICE_ID: u64 = 1 << 48;

/// Nested `Execute` depth at which submission gives up.
const MAX_EXECUTE_DEPTH: usize = 8;

/// Owned copy of a [`DeviceOp`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedOp {
    Command(Command),
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
    Execute(CommandTarget),
    BeginMarker(String),
    EndMarker,
}

impl From<DeviceOp<'_>> for RecordedOp {
    fn from(op: DeviceOp<'_>) -> Self {
        match op {
            DeviceOp::Command(cmd) => RecordedOp::Command(cmd.clone()),
            DeviceOp::Barrier(b) => RecordedOp::Barrier(b),
            DeviceOp::CopyBuffer { src, dst, region } => RecordedOp::CopyBuffer { src, dst, region },
            DeviceOp::FillBuffer {
                buffer,
                offset,
                size,
                data,
            } => RecordedOp::FillBuffer {
                buffer,
                offset,
                size,
                data,
            },
            DeviceOp::Execute(t) => RecordedOp::Execute(t),
            DeviceOp::BeginMarker(name) => RecordedOp::BeginMarker(name.to_owned()),
            DeviceOp::EndMarker => RecordedOp::EndMarker,
        }
    }
}

/// One draw or dispatch as the device ran it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutedDraw {
    /// The target that was submitted.
    pub target: CommandTarget,
    pub kind: CommandKind,
    /// Position inside a multi-draw; 0 for everything else.
    pub draw_index: u32,
    /// Buffer the arguments were read from, for indirect commands.
    pub source: Option<ResourceId>,
    /// `None` when indirect arguments could not be read.
    pub args: Option<IndirectArgs>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    buffers: HashMap<ResourceId, Vec<u8>>,
    streams: HashMap<CommandTarget, Vec<RecordedOp>>,
    scratch_open: bool,
    ops: Vec<(CommandTarget, RecordedOp)>,
    executed: Vec<ExecutedDraw>,
    submissions: Vec<CommandTarget>,
}

#[derive(Default)]
pub struct MemoryDevice {
    state: Mutex<State>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: FIRST_DEVICE_ID,
                ..State::default()
            }),
        }
    }

    /// Creates or replaces an application buffer with the given contents.
    pub fn insert_buffer(&self, id: ResourceId, data: Vec<u8>) {
        self.lock().buffers.insert(id, data);
    }

    /// Host write into an existing buffer.
    pub fn write_buffer(&self, id: ResourceId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let range = state.range(id, offset, bytes.len() as u64)?;
        if let Some(buf) = state.buffers.get_mut(&id) {
            buf[range].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Every op recorded so far, in recording order, across all targets.
    pub fn ops(&self) -> Vec<(CommandTarget, RecordedOp)> {
        self.lock().ops.clone()
    }

    /// Ops currently recorded into `target`.
    pub fn stream(&self, target: CommandTarget) -> Vec<RecordedOp> {
        self.lock().streams.get(&target).cloned().unwrap_or_default()
    }

    pub fn executed_draws(&self) -> Vec<ExecutedDraw> {
        self.lock().executed.clone()
    }

    pub fn submissions(&self) -> Vec<CommandTarget> {
        self.lock().submissions.clone()
    }

    /// Forgets executed draws and submissions; buffers and streams are kept.
    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.executed.clear();
        state.submissions.clear();
        state.ops.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Device for MemoryDevice {
    fn record(&self, target: CommandTarget, op: DeviceOp<'_>) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if target == CommandTarget::Scratch && !state.scratch_open {
            return Err(DeviceError::ScratchState("not open"));
        }
        let op = RecordedOp::from(op);
        if matches!(op, RecordedOp::Command(Command::BeginCommandBuffer { .. })) {
            state.streams.remove(&target);
        }
        state.streams.entry(target).or_default().push(op.clone());
        state.ops.push((target, op));
        Ok(())
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<ResourceId, DeviceError> {
        let len = usize::try_from(size)
            .map_err(|_| DeviceError::Backend(format!("buffer of {size} bytes")))?;
        let mut state = self.lock();
        let id = ResourceId(state.next_id);
        state.next_id += 1;
        state.buffers.insert(id, vec![0; len]);
        trace!(buffer = id.0, size, ?usage, "created buffer");
        Ok(id)
    }

    fn begin_scratch(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if state.scratch_open {
            return Err(DeviceError::ScratchState("already open"));
        }
        state.scratch_open = true;
        state.streams.remove(&CommandTarget::Scratch);
        Ok(())
    }

    fn end_scratch(&self) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if !state.scratch_open {
            return Err(DeviceError::ScratchState("not open"));
        }
        state.scratch_open = false;
        let ops = state.streams.remove(&CommandTarget::Scratch).unwrap_or_default();
        state.run(CommandTarget::Scratch, &ops, 0)
    }

    fn submit(&self, target: CommandTarget) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let ops = match target {
            // Caller-owned command buffers are consumed by submission.
            CommandTarget::Outside => state.streams.remove(&target).unwrap_or_default(),
            _ => state.streams.get(&target).cloned().unwrap_or_default(),
        };
        state.submissions.push(target);
        state.run(target, &ops, 0)
    }

    fn read_buffer(&self, buffer: ResourceId, offset: u64, size: u64) -> Result<Vec<u8>, DeviceError> {
        let state = self.lock();
        let range = state.range(buffer, offset, size)?;
        Ok(state
            .buffers
            .get(&buffer)
            .map(|b| b[range].to_vec())
            .unwrap_or_default())
    }
}

impl State {
    /// Byte range of `buffer` covered by `offset..offset+size`, with `WHOLE_SIZE` meaning the
    /// rest of the buffer.
    fn range(&self, buffer: ResourceId, offset: u64, size: u64) -> Result<std::ops::Range<usize>, DeviceError> {
        let buf = self
            .buffers
            .get(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        let len = buf.len() as u64;
        let size = if size == WHOLE_SIZE {
            len.saturating_sub(offset)
        } else {
            size
        };
        let end = offset.checked_add(size).filter(|&end| end <= len);
        match end {
            Some(end) => Ok(offset as usize..end as usize),
            None => Err(DeviceError::OutOfBounds {
                buffer,
                offset,
                size,
            }),
        }
    }

    fn read(&self, buffer: ResourceId, offset: u64, size: u64) -> Option<&[u8]> {
        let range = self.range(buffer, offset, size).ok()?;
        self.buffers.get(&buffer).map(|b| &b[range])
    }

    fn read_u32(&self, buffer: ResourceId, offset: u64) -> Option<u32> {
        let b = self.read(buffer, offset, 4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn copy(&mut self, src: ResourceId, dst: ResourceId, region: BufferCopy) -> Result<(), DeviceError> {
        let from = self.range(src, region.src_offset, region.size)?;
        let bytes = self.buffers.get(&src).map(|b| b[from].to_vec()).unwrap_or_default();
        let to = self.range(dst, region.dst_offset, bytes.len() as u64)?;
        if let Some(buf) = self.buffers.get_mut(&dst) {
            buf[to].copy_from_slice(&bytes);
        }
        Ok(())
    }

    fn fill(&mut self, buffer: ResourceId, offset: u64, size: u64, data: u32) -> Result<(), DeviceError> {
        let range = self.range(buffer, offset, size)?;
        let pattern = data.to_le_bytes();
        if let Some(buf) = self.buffers.get_mut(&buffer) {
            for (i, byte) in buf[range].iter_mut().enumerate() {
                *byte = pattern[i % 4];
            }
        }
        Ok(())
    }

    fn run(&mut self, target: CommandTarget, ops: &[RecordedOp], depth: usize) -> Result<(), DeviceError> {
        if depth > MAX_EXECUTE_DEPTH {
            return Err(DeviceError::Backend(format!(
                "nested execution deeper than {MAX_EXECUTE_DEPTH}"
            )));
        }
        for op in ops {
            match op {
                RecordedOp::Command(cmd) => self.run_command(target, cmd)?,
                RecordedOp::CopyBuffer { src, dst, region } => self.copy(*src, *dst, *region)?,
                RecordedOp::FillBuffer {
                    buffer,
                    offset,
                    size,
                    data,
                } => self.fill(*buffer, *offset, *size, *data)?,
                RecordedOp::Execute(nested) => {
                    let nested_ops = self.streams.get(nested).cloned().unwrap_or_default();
                    self.run(target, &nested_ops, depth + 1)?;
                }
                RecordedOp::Barrier(_) | RecordedOp::BeginMarker(_) | RecordedOp::EndMarker => {}
            }
        }
        Ok(())
    }

    fn run_command(&mut self, target: CommandTarget, cmd: &Command) -> Result<(), DeviceError> {
        let kind = cmd.kind();
        let patch = cmd.descriptor().patch;
        match *cmd {
            Command::CopyBuffer {
                src,
                dst,
                ref regions,
            } => {
                for region in regions {
                    self.copy(src, dst, *region)?;
                }
            }
            Command::FillBuffer {
                buffer,
                offset,
                size,
                data,
            } => self.fill(buffer, offset, size, data)?,
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => self.executed.push(ExecutedDraw {
                target,
                kind,
                draw_index: 0,
                source: None,
                args: Some(IndirectArgs::Draw(DrawIndirectArgs {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                })),
            }),
            Command::DrawIndexed { .. } | Command::Dispatch { .. } | Command::DispatchBase { .. } => {
                self.executed.push(ExecutedDraw {
                    target,
                    kind,
                    draw_index: 0,
                    source: None,
                    args: None,
                })
            }
            Command::DrawIndirect {
                buffer,
                offset,
                count,
                stride,
            }
            | Command::DrawIndexedIndirect {
                buffer,
                offset,
                count,
                stride,
            } => self.run_multi_draw(target, kind, patch, buffer, offset, count, stride),
            Command::DrawIndirectCount {
                buffer,
                offset,
                count_buffer,
                count_offset,
                max_draw_count,
                stride,
            }
            | Command::DrawIndexedIndirectCount {
                buffer,
                offset,
                count_buffer,
                count_offset,
                max_draw_count,
                stride,
            } => {
                let count = self
                    .read_u32(count_buffer, count_offset)
                    .map_or(max_draw_count, |c| c.min(max_draw_count));
                self.run_multi_draw(target, kind, patch, buffer, offset, count, stride)
            }
            Command::DrawIndirectByteCount {
                instance_count,
                first_instance,
                counter_buffer,
                counter_offset,
                counter_vertex_offset,
                vertex_stride,
            } => {
                let args = self.read_u32(counter_buffer, counter_offset).map(|c| {
                    IndirectArgs::Draw(DrawIndirectArgs {
                        vertex_count: c
                            .saturating_sub(counter_vertex_offset)
                            .checked_div(vertex_stride)
                            .unwrap_or(0),
                        instance_count,
                        first_vertex: 0,
                        first_instance,
                    })
                });
                self.executed.push(ExecutedDraw {
                    target,
                    kind,
                    draw_index: 0,
                    source: Some(counter_buffer),
                    args,
                });
            }
            Command::DispatchIndirect { buffer, offset } => {
                let args = self
                    .read(buffer, offset, patch.record_size())
                    .and_then(|b| patch.decode_args(b));
                self.executed.push(ExecutedDraw {
                    target,
                    kind,
                    draw_index: 0,
                    source: Some(buffer),
                    args,
                });
            }
            _ => {}
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_multi_draw(
        &mut self,
        target: CommandTarget,
        kind: CommandKind,
        patch: IndirectPatchKind,
        buffer: ResourceId,
        offset: u64,
        count: u32,
        stride: u32,
    ) {
        for i in 0..count {
            let at = offset + u64::from(i) * u64::from(stride);
            let args = self
                .read(buffer, at, patch.record_size())
                .and_then(|b| patch.decode_args(b));
            self.executed.push(ExecutedDraw {
                target,
                kind,
                draw_index: i,
                source: Some(buffer),
                args,
            });
        }
    }
}
