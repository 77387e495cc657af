//! Event/draw-tree builder.
//!
//! Baking turns one recorded command buffer into events: every chunk gets its event ids, action
//! chunks become draw-tree nodes, indirect commands are expanded into their sub-draws (with a
//! synthetic chunk per sub-draw) and resource touches go into the ledger. Baking runs once the
//! command buffer has been submitted, so the indirect snapshots taken while recording can be read
//! back and the real argument records and draw counts used.
//!
//! Event ids produced here are local to the command buffer (1-based); the timeline rebases them
//! when the section is appended.

use std::collections::HashMap;

use gpucap_chunklog::{Chunk, ChunkLog, DrawcallUse};
use tracing::{trace, warn};

use crate::command::{indirect_sub_chunk, Command, CommandCategory, DecodeError, IndirectSource};
use crate::context::CommandBufferContext;
use crate::device::Device;
use crate::draw::{ApiEvent, DrawFlags, DrawcallDescription};
use crate::ids::{CommandBufferId, EventId};
use crate::indirect::{IndirectArgs, IndirectPatch, IndirectPatchKind};
use crate::recorder::RecordedCommandBuffer;
use crate::tree::{DrawTree, NodeId};
use crate::usage::{ResourceUsageLedger, UsageTouch};

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{0} is executed before it was recorded")]
    UnknownSecondary(CommandBufferId),
    #[error("synthetic chunk in recorded command stream")]
    SyntheticInput,
}

/// Where baked chunks go.
pub trait ChunkSink {
    /// Appends a real chunk and returns its log offset.
    fn push_real(&mut self, chunk: Chunk) -> u64;

    fn push_synthetic(&mut self, chunk: Chunk);

    /// Inserts a synthetic chunk immediately before the last real one.
    fn insert_synthetic_before_last(&mut self, chunk: Chunk);
}

/// The global log: real chunks get their offsets assigned on append.
impl ChunkSink for ChunkLog {
    fn push_real(&mut self, chunk: Chunk) -> u64 {
        let idx = self.append(chunk);
        self.get(idx).map_or(0, |c| c.offset)
    }

    fn push_synthetic(&mut self, chunk: Chunk) {
        self.append(chunk);
    }

    fn insert_synthetic_before_last(&mut self, chunk: Chunk) {
        self.insert_before_last(chunk);
    }
}

/// A standalone section whose real chunks already carry their log offsets.
impl ChunkSink for Vec<Chunk> {
    fn push_real(&mut self, chunk: Chunk) -> u64 {
        let offset = chunk.offset;
        self.push(chunk);
        offset
    }

    fn push_synthetic(&mut self, chunk: Chunk) {
        self.push(chunk);
    }

    fn insert_synthetic_before_last(&mut self, chunk: Chunk) {
        let idx = self.len().saturating_sub(1);
        self.insert(idx, chunk);
    }
}

/// One run of a secondary command buffer inside a primary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SecondaryExecution {
    pub secondary: CommandBufferId,
    /// Event of the `ExecuteCommands` node.
    pub parent_event: EventId,
    /// The secondary's events are `base_event + 1 ..= base_event + event_count`.
    pub base_event: EventId,
    pub event_count: EventId,
}

impl SecondaryExecution {
    pub fn contains(&self, event: EventId) -> bool {
        event > self.base_event && event <= self.base_event + self.event_count
    }
}

/// Output of baking one command buffer, in events local to it.
#[derive(Clone, Debug, Default)]
pub struct BakedSection {
    pub tree: DrawTree,
    pub ledger: ResourceUsageLedger,
    pub uses: Vec<DrawcallUse>,
    /// Log offset of the chunk behind every event, in event order.
    pub event_offsets: Vec<(EventId, u64)>,
    pub executions: Vec<SecondaryExecution>,
    pub event_count: EventId,
    /// Worst-case indirect scratch buffer size needed to replay this section.
    pub scratch_size: u64,
}

pub(crate) fn bake_section<D, S>(
    device: &D,
    sink: &mut S,
    rec: RecordedCommandBuffer,
    secondaries: &HashMap<CommandBufferId, BakedSection>,
) -> Result<BakedSection, BakeError>
where
    D: Device + ?Sized,
    S: ChunkSink,
{
    let mut baker = SectionBaker {
        device,
        sink,
        secondaries,
        ctx: CommandBufferContext::new(rec.id, rec.level, rec.usage),
        out: BakedSection::default(),
        scope: vec![NodeId::ROOT],
        pending: Vec::new(),
    };
    let patches = rec.patches.into_iter().chain(std::iter::repeat(None));
    for (chunk, patch) in rec.chunks.into_iter().zip(patches) {
        baker.bake_chunk(chunk, patch)?;
    }
    baker.flush_api_calls();
    baker.out.event_count = baker.ctx.cur_event_id;
    trace!(
        cb = rec.id.0,
        events = baker.out.event_count,
        nodes = baker.out.tree.len(),
        "baked command buffer"
    );
    Ok(baker.out)
}

struct SectionBaker<'a, D: ?Sized, S> {
    device: &'a D,
    sink: &'a mut S,
    secondaries: &'a HashMap<CommandBufferId, BakedSection>,
    ctx: CommandBufferContext,
    out: BakedSection,
    scope: Vec<NodeId>,
    /// API events waiting for the next node.
    pending: Vec<ApiEvent>,
}

impl<'a, D: Device + ?Sized, S: ChunkSink> SectionBaker<'a, D, S> {
    fn next_event(&self) -> EventId {
        self.ctx.cur_event_id + 1
    }

    fn advance(&mut self) {
        self.ctx.cur_event_id += 1;
    }

    fn current_scope(&self) -> NodeId {
        self.scope.last().copied().unwrap_or(NodeId::ROOT)
    }

    fn api_event(&mut self, offset: u64) {
        let event_id = self.next_event();
        self.pending.push(ApiEvent {
            event_id,
            file_offset: offset,
        });
        self.out.event_offsets.push((event_id, offset));
    }

    /// Adds a node at the next event, taking every pending API event with it.
    fn add_node(
        &mut self,
        mut draw: DrawcallDescription,
        offset: u64,
        scoped: bool,
        record_use: bool,
    ) -> NodeId {
        let event_id = self.next_event();
        draw.event_id = event_id;
        draw.events = std::mem::take(&mut self.pending);
        draw.events.push(ApiEvent {
            event_id,
            file_offset: offset,
        });
        self.out.event_offsets.push((event_id, offset));
        if record_use {
            self.out.uses.push(DrawcallUse::new(offset, event_id));
        }
        let id = self.out.tree.push_child(self.current_scope(), draw);
        if scoped {
            self.scope.push(id);
        }
        id
    }

    fn pop_scope(&mut self) {
        if self.scope.len() > 1 {
            self.scope.pop();
        }
    }

    fn attach_usages(&mut self, node: NodeId, touches: Vec<UsageTouch>) {
        let event_id = self.out.tree.node(node).draw.event_id;
        for touch in touches {
            let (resource, usage) = touch.for_event(event_id);
            self.out.ledger.record(resource, usage);
            if !resource.is_null() {
                self.out.tree.node_mut(node).resource_usage.push((resource, usage));
            }
        }
    }

    fn flush_api_calls(&mut self) {
        let Some(last) = self.pending.last().copied() else {
            return;
        };
        let mut draw = DrawcallDescription::new("API Calls", DrawFlags::API_CALLS);
        draw.event_id = last.event_id;
        draw.events = std::mem::take(&mut self.pending);
        let scope = self.current_scope();
        self.out.tree.push_child(scope, draw);
    }

    fn bake_chunk(&mut self, chunk: Chunk, patch: Option<IndirectPatch>) -> Result<(), BakeError> {
        let (_, cmd) = Command::from_chunk(&chunk)?;
        let desc = cmd.descriptor();

        if desc.category == CommandCategory::Frame {
            self.sink.push_real(chunk);
            if cmd == Command::EndCommandBuffer {
                self.flush_api_calls();
            }
            self.ctx.track_state(&cmd);
            return Ok(());
        }

        let template = (desc.patch != IndirectPatchKind::NoPatch).then(|| chunk.clone());
        let offset = self.sink.push_real(chunk);

        match desc.category {
            CommandCategory::State => self.api_event(offset),
            CommandCategory::Marker => match &cmd {
                Command::PushMarker { name } => {
                    self.add_node(DrawcallDescription::new(name, desc.flags), offset, true, false);
                }
                Command::PopMarker => {
                    self.pop_scope();
                    self.add_node(DrawcallDescription::new(desc.name, desc.flags), offset, false, false);
                }
                _ => {
                    self.add_node(DrawcallDescription::new(cmd.display_name(), desc.flags), offset, false, false);
                }
            },
            CommandCategory::Pass => {
                self.add_node(DrawcallDescription::new(cmd.display_name(), desc.flags), offset, false, false);
            }
            CommandCategory::Action => match (cmd.indirect_source(), template) {
                (Some(source), Some(mut template)) => {
                    template.offset = offset;
                    self.bake_indirect(&cmd, source, template, patch.unwrap_or_default())
                }
                _ => {
                    let node = self.add_node(describe(&cmd), offset, false, true);
                    let touches = cmd.usages(&self.ctx);
                    self.attach_usages(node, touches);
                }
            },
            CommandCategory::Nested => self.bake_execute(&cmd, offset)?,
            CommandCategory::Synthetic | CommandCategory::Frame => {
                return Err(BakeError::SyntheticInput)
            }
        }

        self.ctx.track_state(&cmd);
        self.advance();
        Ok(())
    }

    fn read_snapshot(&self, patch: &IndirectPatch) -> Option<Vec<u8>> {
        let readback = patch.readback?;
        match self.device.read_buffer(readback.buffer, 0, readback.size) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(buffer = readback.buffer.0, error = %err, "indirect snapshot unavailable");
                None
            }
        }
    }

    fn bake_indirect(
        &mut self,
        cmd: &Command,
        source: IndirectSource,
        template: Chunk,
        patch: IndirectPatch,
    ) {
        let desc = cmd.descriptor();
        let kind = desc.patch;
        let offset = template.offset;
        let data = self.read_snapshot(&patch);
        let record = kind.record_size();
        let stride = u64::from(source.stride);

        match kind {
            IndirectPatchKind::Dispatch => {
                let args = data.as_deref().and_then(|d| kind.decode_args(d));
                let mut draw = DrawcallDescription::new(
                    match args {
                        Some(IndirectArgs::Dispatch(a)) => {
                            format!("{}(<{}, {}, {}>)", desc.name, a.x, a.y, a.z)
                        }
                        _ => format!("{}(<?, ?, ?>)", desc.name),
                    },
                    desc.flags,
                );
                if let Some(a) = args {
                    fill_args(&mut draw, a);
                }
                let node = self.add_node(draw, offset, false, true);
                self.out.tree.node_mut(node).indirect_patch = Some(patch);
                let touches = cmd.usages(&self.ctx);
                self.attach_usages(node, touches);
            }
            IndirectPatchKind::DrawByteCount => {
                let Command::DrawIndirectByteCount { instance_count, first_instance, .. } = *cmd
                else {
                    return;
                };
                let counter = data
                    .as_deref()
                    .and_then(|d| d.get(..4))
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                let vertices = counter.map(|c| {
                    c.saturating_sub(patch.vertex_offset)
                        .checked_div(source.stride)
                        .unwrap_or(0)
                });
                let mut draw = DrawcallDescription::new(
                    match vertices {
                        Some(v) => format!("{}(<{v}, {instance_count}>)", desc.name),
                        None => format!("{}(<?, {instance_count}>)", desc.name),
                    },
                    desc.flags,
                );
                draw.num_indices = vertices.unwrap_or(0);
                draw.num_instances = instance_count;
                draw.instance_offset = first_instance;
                let node = self.add_node(draw, offset, false, true);
                self.out.tree.node_mut(node).indirect_patch = Some(patch);
                let touches = cmd.usages(&self.ctx);
                self.attach_usages(node, touches);
            }
            IndirectPatchKind::Draw | IndirectPatchKind::DrawIndexed => {
                let count = source.count;
                self.out.scratch_size = self
                    .out
                    .scratch_size
                    .max(record + u64::from(count) * stride);

                match count {
                    0 => {
                        let draw = DrawcallDescription::new(format!("{}(0)", desc.name), desc.flags);
                        let node = self.add_node(draw, offset, false, true);
                        self.out.tree.node_mut(node).indirect_patch = Some(patch);
                        let touches = cmd.usages(&self.ctx);
                        self.attach_usages(node, touches);
                    }
                    1 => {
                        let args = sub_args(kind, data.as_deref(), 0, stride);
                        self.sink.insert_synthetic_before_last(indirect_sub_chunk(
                            &template,
                            0,
                            source.buffer,
                            source.offset,
                            source.stride,
                            args,
                        ));
                        self.api_event(offset);
                        self.advance();

                        let mut draw =
                            DrawcallDescription::new(format!("{}({})", desc.name, short_args(args)), desc.flags);
                        fill_args(&mut draw, args);
                        let node = self.add_node(draw, offset, false, true);
                        self.out.tree.node_mut(node).indirect_patch = Some(patch);
                        let touches = cmd.usages(&self.ctx);
                        self.attach_usages(node, touches);
                    }
                    _ => self.bake_multi_draw(cmd, source, &template, patch, data.as_deref(), count),
                }
            }
            IndirectPatchKind::DrawCount | IndirectPatchKind::DrawIndexedCount => {
                let max = source.count;
                self.out.scratch_size = self
                    .out
                    .scratch_size
                    .max(record + u64::from(max.saturating_sub(1)) * stride);

                let observed = patch.count_offset().and_then(|at| {
                    let at = usize::try_from(at).ok()?;
                    let b = data.as_deref()?.get(at..at + 4)?;
                    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                });
                let count = match observed {
                    Some(c) => c.min(max),
                    None => {
                        if max > 0 {
                            warn!(max, "indirect count unavailable, expanding to maxDrawCount");
                        }
                        max
                    }
                };
                self.bake_multi_draw(cmd, source, &template, patch, data.as_deref(), count);
            }
            IndirectPatchKind::NoPatch => {}
        }
    }

    /// Parent marker, one child per sub-draw (each with its own synthetic chunk), then the pop.
    fn bake_multi_draw(
        &mut self,
        cmd: &Command,
        source: IndirectSource,
        template: &Chunk,
        patch: IndirectPatch,
        data: Option<&[u8]>,
        count: u32,
    ) {
        let desc = cmd.descriptor();
        let kind = desc.patch;
        let offset = template.offset;
        let stride = u64::from(source.stride);

        let parent = self.add_node(
            DrawcallDescription::new(
                format!("{}({count})", desc.name),
                DrawFlags::MULTI_DRAW | DrawFlags::PUSH_MARKER,
            ),
            offset,
            true,
            true,
        );
        self.out.tree.node_mut(parent).indirect_patch = Some(patch);
        let touches = cmd.usages(&self.ctx);
        self.attach_usages(parent, touches.clone());
        self.advance();

        for i in 0..count {
            let args = sub_args(kind, data, i, stride);
            self.sink.push_synthetic(indirect_sub_chunk(
                template,
                i,
                source.buffer,
                source.offset + u64::from(i) * stride,
                source.stride,
                args,
            ));
            let mut draw = DrawcallDescription::new(
                format!("{}[{i}]({})", desc.name, short_args(args)),
                desc.flags,
            );
            fill_args(&mut draw, args);
            draw.draw_index = i;
            let child = self.add_node(draw, offset, false, true);
            self.attach_usages(child, touches.clone());
            self.advance();
        }

        self.pop_scope();
        self.add_node(DrawcallDescription::new(desc.name, DrawFlags::POP_MARKER), offset, false, false);
    }

    fn bake_execute(&mut self, cmd: &Command, offset: u64) -> Result<(), BakeError> {
        let Command::ExecuteCommands { secondaries } = cmd else {
            return Ok(());
        };
        let desc = cmd.descriptor();
        let parent = self.add_node(DrawcallDescription::new(cmd.display_name(), desc.flags), offset, true, true);
        let parent_event = self.out.tree.node(parent).draw.event_id;
        self.advance();

        let baked_secondaries = self.secondaries;
        for &sec in secondaries {
            let baked = baked_secondaries
                .get(&sec)
                .ok_or(BakeError::UnknownSecondary(sec))?;
            let base = self.ctx.cur_event_id;

            self.out.tree.graft(parent, &baked.tree, base);
            self.out.ledger.append_rebased(&baked.ledger, base);
            self.out
                .uses
                .extend(baked.uses.iter().map(|u| DrawcallUse::new(u.offset, u.event_id + base)));
            self.out
                .event_offsets
                .extend(baked.event_offsets.iter().map(|&(e, o)| (e + base, o)));
            self.out.executions.push(SecondaryExecution {
                secondary: sec,
                parent_event,
                base_event: base,
                event_count: baked.event_count,
            });
            self.out.scratch_size = self.out.scratch_size.max(baked.scratch_size);
            self.ctx.cur_event_id += baked.event_count;
        }

        self.pop_scope();
        self.add_node(DrawcallDescription::new(desc.name, DrawFlags::POP_MARKER), offset, false, false);
        Ok(())
    }
}

/// Argument record `index` of a snapshot, or a zeroed record when it cannot be read.
fn sub_args(kind: IndirectPatchKind, data: Option<&[u8]>, index: u32, stride: u64) -> IndirectArgs {
    let at = u64::from(index) * stride;
    data.and_then(|d| d.get(usize::try_from(at).ok()?..))
        .and_then(|d| kind.decode_args(d))
        .or_else(|| kind.zeroed_args())
        .unwrap_or(IndirectArgs::Draw(Default::default()))
}

fn short_args(args: IndirectArgs) -> String {
    match args {
        IndirectArgs::Dispatch(a) => format!("<{}, {}, {}>", a.x, a.y, a.z),
        IndirectArgs::Draw(a) => format!("<{}, {}>", a.vertex_count, a.instance_count),
        IndirectArgs::DrawIndexed(a) => format!("<{}, {}>", a.index_count, a.instance_count),
    }
}

fn fill_args(draw: &mut DrawcallDescription, args: IndirectArgs) {
    match args {
        IndirectArgs::Dispatch(a) => draw.dispatch_dimension = [a.x, a.y, a.z],
        IndirectArgs::Draw(a) => {
            draw.num_indices = a.vertex_count;
            draw.num_instances = a.instance_count;
            draw.vertex_offset = a.first_vertex;
            draw.instance_offset = a.first_instance;
        }
        IndirectArgs::DrawIndexed(a) => {
            draw.num_indices = a.index_count;
            draw.num_instances = a.instance_count;
            draw.index_offset = a.first_index;
            draw.base_vertex = a.base_vertex;
            draw.instance_offset = a.first_instance;
        }
    }
}

/// Node for a direct (non-indirect) action.
fn describe(cmd: &Command) -> DrawcallDescription {
    let mut draw = DrawcallDescription::new(cmd.display_name(), cmd.draw_flags());
    match *cmd {
        Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        } => {
            draw.num_indices = vertex_count;
            draw.num_instances = instance_count;
            draw.vertex_offset = first_vertex;
            draw.instance_offset = first_instance;
        }
        Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        } => {
            draw.num_indices = index_count;
            draw.num_instances = instance_count;
            draw.index_offset = first_index;
            draw.base_vertex = vertex_offset;
            draw.instance_offset = first_instance;
        }
        Command::Dispatch { x, y, z } => draw.dispatch_dimension = [x, y, z],
        Command::DispatchBase { base, groups } => {
            draw.dispatch_base = base;
            draw.dispatch_dimension = groups;
        }
        Command::CopyBuffer { src, dst, .. }
        | Command::CopyImage { src, dst, .. }
        | Command::BlitImage { src, dst, .. }
        | Command::ResolveImage { src, dst, .. }
        | Command::CopyBufferToImage { src, dst, .. }
        | Command::CopyImageToBuffer { src, dst, .. } => {
            draw.copy_source = src;
            draw.copy_destination = dst;
        }
        Command::FillBuffer { buffer, .. } => draw.copy_destination = buffer,
        Command::ClearColorImage { image, .. } | Command::ClearDepthStencilImage { image, .. } => {
            draw.copy_destination = image
        }
        _ => {}
    }
    draw
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::{CommandBufferLevel, CommandBufferUsage};
    use crate::device::CommandTarget;
    use crate::ids::ResourceId;
    use crate::indirect::DispatchIndirectArgs;
    use crate::memory_device::MemoryDevice;
    use crate::recorder::CommandRecorder;
    use crate::usage::ResourceUsage;

    const CB: CommandBufferId = CommandBufferId(4);

    fn record(device: &Arc<MemoryDevice>, cmds: Vec<Command>) -> RecordedCommandBuffer {
        let mut rec = CommandRecorder::begin(
            Arc::clone(device),
            CB,
            CommandBufferLevel::Primary,
            CommandBufferUsage::empty(),
        )
        .unwrap();
        for cmd in cmds {
            rec.record(cmd).unwrap();
        }
        rec.finish().unwrap()
    }

    #[test]
    fn dispatch_indirect_is_named_after_its_readback() {
        let device = Arc::new(MemoryDevice::new());
        device.insert_buffer(
            ResourceId(9),
            bytemuck::bytes_of(&DispatchIndirectArgs { x: 4, y: 2, z: 1 }).to_vec(),
        );
        let rec = record(
            &device,
            vec![Command::DispatchIndirect {
                buffer: ResourceId(9),
                offset: 0,
            }],
        );
        device.submit(CommandTarget::Original(CB)).unwrap();

        let mut chunks = Vec::new();
        let baked = bake_section(&*device, &mut chunks, rec, &HashMap::new()).unwrap();
        assert_eq!(baked.event_count, 1);
        let node = baked.tree.node(baked.tree.find_by_event(1).unwrap());
        assert_eq!(node.draw.name, "DispatchIndirect(<4, 2, 1>)");
        assert_eq!(node.draw.dispatch_dimension, [4, 2, 1]);
        assert!(node.indirect_patch.as_ref().is_some_and(|p| !p.is_empty()));
        // Frame chunks plus the dispatch; dispatches never expand.
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn count_draw_without_readback_expands_to_max() {
        let device = Arc::new(MemoryDevice::new());
        device.insert_buffer(ResourceId(9), vec![0; 64]);
        device.insert_buffer(ResourceId(10), 1u32.to_le_bytes().to_vec());
        let mut rec = record(
            &device,
            vec![Command::DrawIndirectCount {
                buffer: ResourceId(9),
                offset: 0,
                count_buffer: ResourceId(10),
                count_offset: 0,
                max_draw_count: 3,
                stride: 16,
            }],
        );
        rec.patches.clear();

        let mut chunks = Vec::new();
        let baked = bake_section(&*device, &mut chunks, rec, &HashMap::new()).unwrap();
        let parent = baked.tree.node(baked.tree.find_by_event(1).unwrap());
        assert_eq!(parent.children.len(), 3);
        assert_eq!(baked.event_count, 5);
        assert_eq!(chunks.iter().filter(|c| c.is_synthetic()).count(), 3);
        assert_eq!(baked.scratch_size, 16 + 2 * 16);
    }

    #[test]
    fn usages_follow_the_event_of_their_node() {
        let device = Arc::new(MemoryDevice::new());
        device.insert_buffer(ResourceId(9), vec![0; 16]);
        let rec = record(
            &device,
            vec![
                Command::PushMarker {
                    name: "clear".into(),
                },
                Command::FillBuffer {
                    buffer: ResourceId(9),
                    offset: 0,
                    size: 16,
                    data: 0,
                },
                Command::PopMarker,
            ],
        );
        let mut chunks = Vec::new();
        let baked = bake_section(&*device, &mut chunks, rec, &HashMap::new()).unwrap();

        let usages = baked.ledger.usages(ResourceId(9));
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].event_id, 2);
        let marker = baked.tree.find_by_event(1).unwrap();
        assert_eq!(baked.tree.children(marker).len(), 1);
        assert_eq!(baked.uses, vec![DrawcallUse::new(chunks[2].offset, 2)]);
    }

    #[test]
    fn every_sub_draw_records_the_bound_vertex_buffers() {
        let device = Arc::new(MemoryDevice::new());
        device.insert_buffer(ResourceId(7), vec![0; 64]);
        device.insert_buffer(ResourceId(9), vec![1; 48]);
        let rec = record(
            &device,
            vec![
                Command::BindVertexBuffers {
                    first_binding: 0,
                    buffers: vec![ResourceId(7)],
                    offsets: vec![0],
                },
                Command::BeginRenderPass {
                    render_pass: ResourceId(20),
                    color_attachments: vec![],
                    depth_attachment: None,
                },
                Command::DrawIndirect {
                    buffer: ResourceId(9),
                    offset: 0,
                    count: 3,
                    stride: 16,
                },
                Command::EndRenderPass,
            ],
        );
        device.submit(CommandTarget::Original(CB)).unwrap();

        let mut chunks = Vec::new();
        let baked = bake_section(&*device, &mut chunks, rec, &HashMap::new()).unwrap();
        let parent = baked.tree.find_by_event(3).unwrap();
        assert_eq!(baked.tree.children(parent).len(), 3);

        let events: Vec<EventId> = baked
            .ledger
            .usages(ResourceId(7))
            .iter()
            .filter(|u| u.usage == ResourceUsage::VertexBuffer)
            .map(|u| u.event_id)
            .collect();
        assert_eq!(events, vec![3, 4, 5, 6]);
        for event in 4..=6 {
            let node = baked.tree.node(baked.tree.find_by_event(event).unwrap());
            assert!(node.resource_usage.iter().any(|(r, _)| *r == ResourceId(7)));
        }
    }

    #[test]
    fn unknown_secondary_fails_the_bake() {
        let device = Arc::new(MemoryDevice::new());
        let rec = record(
            &device,
            vec![Command::ExecuteCommands {
                secondaries: vec![CommandBufferId(77)],
            }],
        );
        let err = bake_section(&*device, &mut Vec::<Chunk>::new(), rec, &HashMap::new()).unwrap_err();
        assert!(matches!(err, BakeError::UnknownSecondary(CommandBufferId(77))));
    }
}
