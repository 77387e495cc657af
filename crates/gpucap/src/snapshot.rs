//! Indirect argument snapshots.
//!
//! When an indirect command is recorded, its argument range (and the count value, for count
//! variants) is copied into a host-readable allocation so the arguments the device actually
//! consumed can be read back once the command buffer has been submitted.

use tracing::trace;

use crate::command::{BufferCopy, IndirectSource};
use crate::context::{CommandBufferContext, CommandBufferLevel};
use crate::device::{Access, BufferBarrier, BufferUsage, CommandTarget, Device, DeviceError, DeviceOp};
use crate::ids::ResourceId;
use crate::indirect::{snapshot_size, IndirectPatch, IndirectPatchKind, ReadbackAllocation};

/// A barrier plus copy into a readback allocation, not yet recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingCopy {
    pub barrier: BufferBarrier,
    pub src: ResourceId,
    pub dst: ResourceId,
    pub region: BufferCopy,
}

impl PendingCopy {
    fn record<D: Device + ?Sized>(&self, device: &D, target: CommandTarget) -> Result<(), DeviceError> {
        device.record(target, DeviceOp::Barrier(self.barrier))?;
        device.record(
            target,
            DeviceOp::CopyBuffer {
                src: self.src,
                dst: self.dst,
                region: self.region,
            },
        )
    }
}

/// Snapshots the arguments of an indirect command recorded into `ctx`.
///
/// `source.count` is the recorded count (`maxDrawCount` for count variants). A count of zero
/// needs no snapshot and returns an empty patch. Dispatch arguments are copied immediately since
/// dispatches never sit inside a render pass; every other kind is deferred to
/// [`flush_deferred_copies`] because later commands in the pass may still write the source.
pub fn fetch_indirect_data<D: Device + ?Sized>(
    device: &D,
    ctx: &mut CommandBufferContext,
    target: CommandTarget,
    kind: IndirectPatchKind,
    source: IndirectSource,
) -> Result<IndirectPatch, DeviceError> {
    if source.count == 0 || kind == IndirectPatchKind::NoPatch {
        return Ok(IndirectPatch::empty());
    }

    let data_size = kind.data_size(source.count, source.stride);
    let size = snapshot_size(kind, source.count, source.stride, source.counter.is_some());
    let readback = device.create_buffer(size, BufferUsage::Readback)?;

    let mut src_access = Access::INDIRECT_COMMAND_READ | Access::ALL_WRITES;
    if kind == IndirectPatchKind::DrawByteCount {
        src_access |= Access::TRANSFORM_FEEDBACK_COUNTER_READ;
    }

    let mut copies = vec![PendingCopy {
        barrier: BufferBarrier {
            buffer: source.buffer,
            offset: source.offset,
            size: data_size,
            src_access,
            dst_access: Access::TRANSFER_READ,
        },
        src: source.buffer,
        dst: readback,
        region: BufferCopy {
            src_offset: source.offset,
            dst_offset: 0,
            size: data_size,
        },
    }];

    if let Some((counter, counter_offset)) = source.counter {
        copies.push(PendingCopy {
            barrier: BufferBarrier {
                buffer: counter,
                offset: counter_offset,
                size: 4,
                src_access,
                dst_access: Access::TRANSFER_READ,
            },
            src: counter,
            dst: readback,
            region: BufferCopy {
                src_offset: counter_offset,
                dst_offset: size - 16,
                size: 4,
            },
        });
    }

    if kind == IndirectPatchKind::Dispatch {
        for copy in &copies {
            copy.record(device, target)?;
        }
    } else {
        ctx.deferred_copies.extend(copies);
    }

    trace!(
        cb = ctx.id.0,
        ?kind,
        count = source.count,
        stride = source.stride,
        size,
        "snapshotting indirect arguments"
    );

    Ok(IndirectPatch {
        kind,
        readback: Some(ReadbackAllocation {
            buffer: readback,
            size,
        }),
        count: source.count,
        stride: source.stride,
        vertex_offset: 0,
        command_buffer: (ctx.level == CommandBufferLevel::Secondary).then_some(ctx.id),
    })
}

/// Records every deferred snapshot copy of `ctx` into `target`.
pub fn flush_deferred_copies<D: Device + ?Sized>(
    device: &D,
    ctx: &mut CommandBufferContext,
    target: CommandTarget,
) -> Result<(), DeviceError> {
    for copy in std::mem::take(&mut ctx.deferred_copies) {
        copy.record(device, target)?;
    }
    Ok(())
}
