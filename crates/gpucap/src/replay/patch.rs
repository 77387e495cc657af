//! Indirect argument patching for multi-draws.
//!
//! A multi-draw replayed up to an event inside it has to stop after the right sub-draw. Replays
//! from the start simply lower the draw count. Replays of one interior sub-draw rebuild the
//! argument buffer so only that sub-draw produces anything while its draw index stays the same.
//! With a callback installed every sub-draw is replayed on its own so the hooks see them one at
//! a time.

use tracing::{debug, error};

use crate::command::{BufferCopy, Command, IndirectSource};
use crate::context::{CommandBufferContext, CommandBufferLevel};
use crate::device::{
    Access, BufferBarrier, BufferUsage, CommandTarget, Device, DeviceOp, WHOLE_SIZE,
};
use crate::ids::{EventId, ResourceId};
use crate::indirect::IndirectPatchKind;
use crate::timeline::PartialReplayRange;

use super::executor::ReplayPass;
use super::{ReplayError, ScratchBuffer};

/// The non-count draw that consumes the same argument records as `kind`.
fn plain_draw(
    kind: IndirectPatchKind,
    buffer: ResourceId,
    offset: u64,
    count: u32,
    stride: u32,
) -> Command {
    if kind.is_indexed() {
        Command::DrawIndexedIndirect {
            buffer,
            offset,
            count,
            stride,
        }
    } else {
        Command::DrawIndirect {
            buffer,
            offset,
            count,
            stride,
        }
    }
}

impl<'a, D: Device + ?Sized> ReplayPass<'a, D> {
    pub(super) fn replay_multi_draw(
        &mut self,
        target: CommandTarget,
        ctx: &mut CommandBufferContext,
        range: PartialReplayRange,
        cmd: &Command,
        offset: u64,
    ) -> Result<(), ReplayError> {
        let kind = cmd.descriptor().patch;
        let Some(source) = cmd.indirect_source() else {
            return Ok(());
        };

        let parent = range.base_event + ctx.cur_event_id + 1;
        let found = self.timeline.uses().event_at(offset);
        // Secondaries are indexed at their first execution; a primary's chunk maps to its parent.
        debug_assert!(
            found.is_none()
                || self.timeline.sections()[range.section].level == CommandBufferLevel::Secondary
                || found == Some(parent),
            "chunk at {offset} maps to event {found:?}, expected {parent}"
        );
        let count = match found {
            Some(_) => self.multi_draw_children(parent),
            None => None,
        };
        let Some(count) = count else {
            error!("Unexpected drawcall not found in uses vector, offset {offset}");
            self.report.unresolved_offsets.push(offset);
            return Ok(());
        };

        if self.callback.is_some() && ctx.is_in_render_pass_scope() {
            let name = cmd.descriptor().name;
            return self.replay_each_sub_draw(target, kind, source, parent, count, name);
        }

        // Only the parent marker is in range.
        if range.last_event <= parent {
            return Ok(());
        }
        let reached = (range.last_event - parent).min(count);
        if reached == 0 {
            return Ok(());
        }

        if range.first_event <= 1 {
            debug!(parent, count, reached, "truncating multi-draw");
            let draw = plain_draw(kind, source.buffer, source.offset, reached, source.stride);
            self.device.record(target, DeviceOp::Command(&draw))?;
            return Ok(());
        }

        self.replay_one_sub_draw(target, ctx, kind, source, parent, reached - 1)
    }

    /// Draws `draw_index + 1` records from a scratch buffer whose last record is the original
    /// record `draw_index` and whose others are zero.
    fn replay_one_sub_draw(
        &mut self,
        target: CommandTarget,
        ctx: &CommandBufferContext,
        kind: IndirectPatchKind,
        source: IndirectSource,
        parent: EventId,
        draw_index: u32,
    ) -> Result<(), ReplayError> {
        let record = kind.record_size();
        let needed = record * (u64::from(draw_index) + 1);
        let scratch = self.scratch_buffer(needed)?;

        self.device.begin_scratch()?;
        let prep = CommandTarget::Scratch;
        self.barrier(
            prep,
            scratch.buffer,
            0,
            WHOLE_SIZE,
            Access::INDIRECT_COMMAND_READ,
            Access::TRANSFER_WRITE,
        )?;
        self.device.record(
            prep,
            DeviceOp::FillBuffer {
                buffer: scratch.buffer,
                offset: 0,
                size: WHOLE_SIZE,
                data: 0,
            },
        )?;
        self.barrier(
            prep,
            scratch.buffer,
            0,
            WHOLE_SIZE,
            Access::TRANSFER_WRITE,
            Access::TRANSFER_WRITE,
        )?;
        self.device.record(
            prep,
            DeviceOp::CopyBuffer {
                src: source.buffer,
                dst: scratch.buffer,
                region: BufferCopy {
                    src_offset: source.offset + u64::from(source.stride) * u64::from(draw_index),
                    dst_offset: needed - record,
                    size: record,
                },
            },
        )?;
        self.barrier(
            prep,
            scratch.buffer,
            0,
            WHOLE_SIZE,
            Access::TRANSFER_WRITE,
            Access::INDIRECT_COMMAND_READ,
        )?;
        self.device.end_scratch()?;

        debug!(parent, draw_index, needed, "replaying one sub-draw from scratch");
        let draw = plain_draw(kind, scratch.buffer, 0, draw_index + 1, record as u32);
        let event = parent + 1 + draw_index;
        self.record_with_hooks(target, ctx.is_in_render_pass_scope(), event, &draw)
    }

    /// Copies the whole argument range to scratch once, then draws `i + 1` records for every
    /// sub-draw `i` and zeroes record `i` afterwards, so each draw only adds sub-draw `i`.
    ///
    /// This ignores the replay range: every sub-draw is replayed.
    fn replay_each_sub_draw(
        &mut self,
        target: CommandTarget,
        kind: IndirectPatchKind,
        source: IndirectSource,
        parent: EventId,
        count: u32,
        name: &str,
    ) -> Result<(), ReplayError> {
        if count == 0 {
            return Ok(());
        }
        let record = kind.record_size();
        let stride = u64::from(source.stride);
        let total = record + u64::from(count - 1) * stride;
        let scratch = self.scratch_buffer(total)?;

        self.device.record(target, DeviceOp::BeginMarker(name))?;
        self.barrier(
            target,
            source.buffer,
            source.offset,
            total,
            Access::INDIRECT_COMMAND_READ,
            Access::TRANSFER_READ,
        )?;
        self.barrier(
            target,
            scratch.buffer,
            0,
            total,
            Access::INDIRECT_COMMAND_READ,
            Access::TRANSFER_WRITE,
        )?;
        self.device.record(
            target,
            DeviceOp::CopyBuffer {
                src: source.buffer,
                dst: scratch.buffer,
                region: BufferCopy {
                    src_offset: source.offset,
                    dst_offset: 0,
                    size: total,
                },
            },
        )?;
        self.barrier(
            target,
            scratch.buffer,
            0,
            total,
            Access::TRANSFER_WRITE,
            Access::INDIRECT_COMMAND_READ,
        )?;

        for i in 0..count {
            let draw = plain_draw(kind, scratch.buffer, 0, i + 1, source.stride);
            self.record_with_hooks(target, true, parent + 1 + i, &draw)?;

            let at = u64::from(i) * stride;
            self.barrier(
                target,
                scratch.buffer,
                at,
                record,
                Access::INDIRECT_COMMAND_READ,
                Access::TRANSFER_WRITE,
            )?;
            self.device.record(
                target,
                DeviceOp::FillBuffer {
                    buffer: scratch.buffer,
                    offset: at,
                    size: record,
                    data: 0,
                },
            )?;
            self.barrier(
                target,
                scratch.buffer,
                at,
                record,
                Access::TRANSFER_WRITE,
                Access::INDIRECT_COMMAND_READ,
            )?;
        }

        self.device.record(target, DeviceOp::EndMarker)?;
        Ok(())
    }

    /// The scratch buffer, created on first use with the capture's worst-case size.
    fn scratch_buffer(&mut self, needed: u64) -> Result<ScratchBuffer, ReplayError> {
        let capacity = self.timeline.scratch_size();
        if needed > capacity {
            error!(needed, capacity, "indirect scratch buffer too small");
            return Err(ReplayError::ScratchOverflow { needed, capacity });
        }
        if let Some(scratch) = *self.scratch {
            if scratch.capacity >= needed {
                return Ok(scratch);
            }
        }
        let buffer = self
            .device
            .create_buffer(capacity, BufferUsage::IndirectScratch)?;
        let scratch = ScratchBuffer { buffer, capacity };
        *self.scratch = Some(scratch);
        Ok(scratch)
    }

    fn barrier(
        &self,
        target: CommandTarget,
        buffer: ResourceId,
        offset: u64,
        size: u64,
        src_access: Access,
        dst_access: Access,
    ) -> Result<(), ReplayError> {
        self.device.record(
            target,
            DeviceOp::Barrier(BufferBarrier {
                buffer,
                offset,
                size,
                src_access,
                dst_access,
            }),
        )?;
        Ok(())
    }
}
