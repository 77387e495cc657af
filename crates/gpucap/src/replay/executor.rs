//! Section rerecording and single-event replay.

use gpucap_chunklog::Chunk;
use tracing::{debug, error, trace};

use crate::callback::{DrawcallCallback, HookClass};
use crate::command::{Command, CommandCategory};
use crate::context::{CommandBufferContext, CommandBufferLevel};
use crate::device::{CommandTarget, Device, DeviceOp};
use crate::draw::DrawFlags;
use crate::ids::EventId;
use crate::indirect::IndirectPatchKind;
use crate::timeline::{PartialRanges, PartialReplayRange, SectionInfo, Timeline};

use super::{ReplayError, ReplayReport, ScratchBuffer};

/// State of one [`Replayer::replay`](super::Replayer::replay) call.
pub(crate) struct ReplayPass<'a, D: Device + ?Sized> {
    pub device: &'a D,
    pub timeline: &'a Timeline,
    pub callback: Option<&'a mut (dyn DrawcallCallback + 'static)>,
    pub scratch: &'a mut Option<ScratchBuffer>,
    pub report: ReplayReport,
}

/// Real chunks of a section, in log order.
fn section_chunks<'t>(
    timeline: &'t Timeline,
    section: &SectionInfo,
) -> impl Iterator<Item = &'t Chunk> {
    timeline
        .log()
        .iter()
        .skip(section.chunks.start)
        .take(section.chunks.len())
        .filter(|c| !c.is_synthetic())
}

/// Indirect draws the patcher expands into sub-draws.
fn is_multi_draw(cmd: &Command) -> bool {
    match (cmd.descriptor().patch, cmd.indirect_source()) {
        (IndirectPatchKind::Draw | IndirectPatchKind::DrawIndexed, Some(source)) => source.count > 1,
        (IndirectPatchKind::DrawCount | IndirectPatchKind::DrawIndexedCount, Some(_)) => true,
        _ => false,
    }
}

impl<'a, D: Device + ?Sized> ReplayPass<'a, D> {
    /// Submits every primary before the target section as recorded, then rerecords the target
    /// (and the secondary it executes the target event from, if any) up to the last event.
    pub fn run_prefix(&mut self, ranges: PartialRanges) -> Result<(), ReplayError> {
        let timeline = self.timeline;
        for (idx, section) in timeline.sections().iter().enumerate().take(ranges.primary.section) {
            if section.level == CommandBufferLevel::Primary {
                let target = self.verbatim(idx, section.base_event)?;
                self.submit(target)?;
            }
        }

        if let Some(secondary) = ranges.secondary {
            self.rerecord(secondary, None)?;
        }
        self.rerecord(ranges.primary, ranges.secondary)?;
        self.submit(CommandTarget::Rerecord(ranges.primary.cb))
    }

    /// Records the render pass state leading up to the target event into the outside command
    /// buffer, then the target chunk alone.
    pub fn run_single(&mut self, ranges: PartialRanges) -> Result<(), ReplayError> {
        let timeline = self.timeline;
        let event = ranges.primary.last_event;
        let offset = timeline
            .event_offset(event)
            .ok_or(ReplayError::EventOutOfRange {
                event,
                last: timeline.last_event(),
            })?;

        let target = CommandTarget::Outside;
        let section = &timeline.sections()[ranges.primary.section];
        let mut ctx = CommandBufferContext::new(section.cb, section.level, section.usage);
        let found = self.fast_forward(
            target,
            section,
            ranges.primary,
            &mut ctx,
            offset,
            ranges.secondary,
        )?;
        if !found {
            error!(event, offset, "chunk for event not found in its command buffer");
            self.report.unresolved_offsets.push(offset);
        }

        if ctx.render_pass.is_some() {
            self.device
                .record(target, DeviceOp::Command(&Command::EndRenderPass))?;
        }
        self.submit(target)
    }

    /// Walks `section` recording only state and render pass commands until the chunk at
    /// `offset`, which is executed. When `nested` is set the walk descends into that secondary
    /// execution instead. Returns whether the chunk was reached.
    fn fast_forward(
        &mut self,
        target: CommandTarget,
        section: &SectionInfo,
        range: PartialReplayRange,
        ctx: &mut CommandBufferContext,
        offset: u64,
        nested: Option<PartialReplayRange>,
    ) -> Result<bool, ReplayError> {
        let timeline = self.timeline;
        for chunk in section_chunks(timeline, section) {
            let (_, cmd) = Command::from_chunk(chunk)?;
            let category = cmd.descriptor().category;
            if category == CommandCategory::Frame {
                ctx.track_state(&cmd);
                continue;
            }
            if nested.is_none() && chunk.offset == offset {
                self.execute_single(target, ctx, range, &cmd, offset)?;
                return Ok(true);
            }

            if let (CommandCategory::Nested, Some(sec)) = (category, nested) {
                let parent = range.base_event + ctx.cur_event_id + 1;
                let runs_target = section.executions.iter().any(|(s, x)| {
                    *s == sec.section && x.parent_event == parent && x.contains(sec.last_event)
                });
                if runs_target {
                    let sec_section = &timeline.sections()[sec.section];
                    let mut sec_ctx = CommandBufferContext::new(
                        sec_section.cb,
                        sec_section.level,
                        sec_section.usage,
                    );
                    return self.fast_forward(target, sec_section, sec, &mut sec_ctx, offset, None);
                }
            }

            let span = self.event_span(section, range.base_event, ctx, &cmd);
            if matches!(category, CommandCategory::State | CommandCategory::Pass) {
                self.device.record(target, DeviceOp::Command(&cmd))?;
                ctx.track_state(&cmd);
            }
            ctx.cur_event_id += span;
        }
        Ok(false)
    }

    fn execute_single(
        &mut self,
        target: CommandTarget,
        ctx: &mut CommandBufferContext,
        range: PartialReplayRange,
        cmd: &Command,
        offset: u64,
    ) -> Result<(), ReplayError> {
        match cmd.descriptor().category {
            CommandCategory::Action if is_multi_draw(cmd) => {
                self.replay_multi_draw(target, ctx, range, cmd, offset)
            }
            CommandCategory::Action => {
                let event = action_event(range, ctx, cmd);
                self.record_with_hooks(target, ctx.is_in_render_pass_scope(), event, cmd)
            }
            CommandCategory::State | CommandCategory::Pass => {
                self.device.record(target, DeviceOp::Command(cmd))?;
                ctx.track_state(cmd);
                Ok(())
            }
            // Markers and command lists have nothing to execute on their own.
            _ => Ok(()),
        }
    }

    /// Records one section into its rerecord target, leaving out every chunk whose first event
    /// lies after `range.last_event`.
    pub fn rerecord(
        &mut self,
        range: PartialReplayRange,
        partial: Option<PartialReplayRange>,
    ) -> Result<(), ReplayError> {
        let timeline = self.timeline;
        let section = &timeline.sections()[range.section];
        let target = CommandTarget::Rerecord(section.cb);
        let mut ctx = CommandBufferContext::new(section.cb, section.level, section.usage);
        let local_last = range.last_event.saturating_sub(range.base_event);

        for chunk in section_chunks(timeline, section) {
            let (_, cmd) = Command::from_chunk(chunk)?;
            let category = cmd.descriptor().category;

            if category == CommandCategory::Frame {
                if cmd == Command::EndCommandBuffer && ctx.render_pass.is_some() {
                    self.device
                        .record(target, DeviceOp::Command(&Command::EndRenderPass))?;
                    ctx.track_state(&Command::EndRenderPass);
                }
                self.device.record(target, DeviceOp::Command(&cmd))?;
                ctx.track_state(&cmd);
                continue;
            }

            let span = self.event_span(section, range.base_event, &ctx, &cmd);
            if ctx.cur_event_id + node_lead(&cmd) <= local_last {
                match category {
                    CommandCategory::Action if is_multi_draw(&cmd) => {
                        self.replay_multi_draw(target, &mut ctx, range, &cmd, chunk.offset)?
                    }
                    CommandCategory::Action => {
                        let event = action_event(range, &ctx, &cmd);
                        self.record_with_hooks(target, ctx.is_in_render_pass_scope(), event, &cmd)?
                    }
                    CommandCategory::Nested => {
                        self.replay_execute(target, section, range, partial, &ctx, &cmd)?
                    }
                    _ => self.device.record(target, DeviceOp::Command(&cmd))?,
                }
                ctx.track_state(&cmd);
            } else {
                self.report.truncated_chunks += 1;
            }
            ctx.cur_event_id += span;
        }

        debug!(
            cb = section.cb.0,
            section = range.section,
            last_event = range.last_event,
            "rerecorded command buffer"
        );
        self.report.rerecorded.push(section.cb);
        Ok(())
    }

    fn replay_execute(
        &mut self,
        target: CommandTarget,
        section: &SectionInfo,
        range: PartialReplayRange,
        partial: Option<PartialReplayRange>,
        ctx: &CommandBufferContext,
        cmd: &Command,
    ) -> Result<(), ReplayError> {
        let Command::ExecuteCommands { secondaries } = cmd else {
            return Ok(());
        };
        let parent = range.base_event + ctx.cur_event_id + 1;
        let mut executions = section
            .executions
            .iter()
            .filter(|(_, x)| x.parent_event == parent)
            .peekable();

        if executions.peek().is_none() {
            for &sec in secondaries {
                self.device
                    .record(target, DeviceOp::Execute(CommandTarget::Original(sec)))?;
            }
            return Ok(());
        }

        for &(sec_section, x) in executions {
            if x.base_event + 1 > range.last_event {
                break;
            }
            let nested = match partial {
                Some(p) if p.section == sec_section && x.contains(range.last_event) => {
                    CommandTarget::Rerecord(x.secondary)
                }
                _ => self.verbatim(sec_section, x.base_event)?,
            };
            self.device.record(target, DeviceOp::Execute(nested))?;
        }
        Ok(())
    }

    /// Target that replays section `idx` exactly as recorded. The device only keeps the latest
    /// recording of a command buffer, so older sections are rerecorded in full.
    fn verbatim(&mut self, idx: usize, base_event: EventId) -> Result<CommandTarget, ReplayError> {
        let timeline = self.timeline;
        let section = &timeline.sections()[idx];
        if timeline.latest_section(section.cb) == Some(idx) {
            return Ok(CommandTarget::Original(section.cb));
        }
        let range = PartialReplayRange {
            first_event: 1,
            last_event: EventId::MAX,
            cb: section.cb,
            base_event,
            section: idx,
        };
        self.rerecord(range, None)?;
        Ok(CommandTarget::Rerecord(section.cb))
    }

    /// Events the chunk consumes, matching what baking assigned to it.
    fn event_span(
        &self,
        section: &SectionInfo,
        base_event: EventId,
        ctx: &CommandBufferContext,
        cmd: &Command,
    ) -> EventId {
        let desc = cmd.descriptor();
        let parent = base_event + ctx.cur_event_id + 1;
        match desc.category {
            CommandCategory::Frame => 0,
            CommandCategory::Nested => {
                let mut executions = section
                    .executions
                    .iter()
                    .filter(|(_, x)| x.parent_event == parent)
                    .peekable();
                let nested: EventId = if executions.peek().is_some() {
                    executions.map(|(_, x)| x.event_count).sum()
                } else if let Command::ExecuteCommands { secondaries } = cmd {
                    secondaries
                        .iter()
                        .filter_map(|sec| self.timeline.baked_secondary(*sec))
                        .map(|b| b.event_count)
                        .sum()
                } else {
                    0
                };
                nested + 2
            }
            CommandCategory::Action => match (desc.patch, cmd.indirect_source()) {
                (IndirectPatchKind::Draw | IndirectPatchKind::DrawIndexed, Some(source)) => {
                    match source.count {
                        0 => 1,
                        1 => 2,
                        n => n + 2,
                    }
                }
                (IndirectPatchKind::DrawCount | IndirectPatchKind::DrawIndexedCount, Some(source)) => {
                    self.multi_draw_children(parent)
                        .unwrap_or(source.count)
                        + 2
                }
                _ => 1,
            },
            _ => 1,
        }
    }

    /// Sub-draw count of the multi-draw whose parent node is at `parent`.
    pub(super) fn multi_draw_children(&self, parent: EventId) -> Option<u32> {
        self.timeline
            .drawcall(parent)
            .filter(|node| node.draw.flags.contains(DrawFlags::MULTI_DRAW))
            .map(|node| node.children.len() as u32)
    }

    /// Records `cmd`, surrounded by the instrumentation hooks when a callback is installed.
    pub(super) fn record_with_hooks(
        &mut self,
        target: CommandTarget,
        in_render_pass: bool,
        event: EventId,
        cmd: &Command,
    ) -> Result<(), ReplayError> {
        let class = HookClass::for_flags(cmd.draw_flags())
            .filter(|class| *class != HookClass::Draw || in_render_pass);
        let (Some(class), Some(callback)) = (class, self.callback.as_deref_mut()) else {
            self.device.record(target, DeviceOp::Command(cmd))?;
            return Ok(());
        };

        class.pre(&mut *callback, event, target);
        self.device.record(target, DeviceOp::Command(cmd))?;
        if class.post(&mut *callback, event, target) {
            trace!(event, "recording action again for post hook");
            self.device.record(target, DeviceOp::Command(cmd))?;
            class.post_re(&mut *callback, event, target);
        }
        Ok(())
    }

    pub(super) fn submit(&mut self, target: CommandTarget) -> Result<(), ReplayError> {
        self.device.submit(target)?;
        self.report.submitted.push(target);
        Ok(())
    }
}

/// Distance from the chunk's first event to its draw-tree node. A single indirect draw is
/// preceded by the event of its synthetic sub-command.
fn node_lead(cmd: &Command) -> EventId {
    match (cmd.descriptor().patch, cmd.indirect_source()) {
        (IndirectPatchKind::Draw | IndirectPatchKind::DrawIndexed, Some(s)) if s.count == 1 => 2,
        _ => 1,
    }
}

/// Event of the draw-tree node behind a non-multi action chunk.
fn action_event(range: PartialReplayRange, ctx: &CommandBufferContext, cmd: &Command) -> EventId {
    range.base_event + ctx.cur_event_id + node_lead(cmd)
}
