//! Command model and the command-descriptor table.
//!
//! Every recordable command is one [`Command`] variant. What the engine needs to know about a
//! command kind (how it appears in the draw tree, whether it needs a render pass, whether it
//! carries indirect arguments) lives in [`DESCRIPTORS`], so capture and replay run one generic
//! pipeline over all kinds.

mod chunk;

pub use chunk::{indirect_sub_chunk, DecodeError};

use serde::Serialize;

use crate::context::{CommandBufferContext, CommandBufferLevel, CommandBufferUsage};
use crate::draw::DrawFlags;
use crate::ids::{CommandBufferId, ResourceId};
use crate::indirect::{IndirectArgs, IndirectPatchKind};
use crate::usage::{ResourceUsage, Subresource, UsageTouch};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImageCopy {
    pub src: Subresource,
    pub dst: Subresource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub image: Subresource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ClearAttachment {
    Color { index: u32 },
    DepthStencil,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Command {
    BeginCommandBuffer {
        level: CommandBufferLevel,
        usage: CommandBufferUsage,
    },
    EndCommandBuffer,
    BeginRenderPass {
        render_pass: ResourceId,
        color_attachments: Vec<ResourceId>,
        depth_attachment: Option<ResourceId>,
    },
    EndRenderPass,
    BindPipeline {
        pipeline: ResourceId,
        compute: bool,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<ResourceId>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: ResourceId,
        offset: u64,
        index_type: IndexType,
    },
    PushMarker {
        name: String,
    },
    PopMarker,
    SetMarker {
        name: String,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: ResourceId,
        offset: u64,
        count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: ResourceId,
        offset: u64,
        count: u32,
        stride: u32,
    },
    DrawIndirectCount {
        buffer: ResourceId,
        offset: u64,
        count_buffer: ResourceId,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirectCount {
        buffer: ResourceId,
        offset: u64,
        count_buffer: ResourceId,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    },
    DrawIndirectByteCount {
        instance_count: u32,
        first_instance: u32,
        counter_buffer: ResourceId,
        counter_offset: u64,
        counter_vertex_offset: u32,
        vertex_stride: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchBase {
        base: [u32; 3],
        groups: [u32; 3],
    },
    DispatchIndirect {
        buffer: ResourceId,
        offset: u64,
    },
    CopyBuffer {
        src: ResourceId,
        dst: ResourceId,
        regions: Vec<BufferCopy>,
    },
    CopyImage {
        src: ResourceId,
        dst: ResourceId,
        regions: Vec<ImageCopy>,
    },
    BlitImage {
        src: ResourceId,
        dst: ResourceId,
        regions: Vec<ImageCopy>,
    },
    ResolveImage {
        src: ResourceId,
        dst: ResourceId,
        regions: Vec<ImageCopy>,
    },
    CopyBufferToImage {
        src: ResourceId,
        dst: ResourceId,
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        src: ResourceId,
        dst: ResourceId,
        regions: Vec<BufferImageCopy>,
    },
    FillBuffer {
        buffer: ResourceId,
        offset: u64,
        size: u64,
        data: u32,
    },
    ClearColorImage {
        image: ResourceId,
        color: [f32; 4],
        ranges: Vec<Subresource>,
    },
    ClearDepthStencilImage {
        image: ResourceId,
        depth: f32,
        stencil: u32,
        ranges: Vec<Subresource>,
    },
    ClearAttachments {
        attachments: Vec<ClearAttachment>,
    },
    ExecuteCommands {
        secondaries: Vec<CommandBufferId>,
    },
    /// One sub-draw of an indirect command. Only ever synthesized, never recorded.
    IndirectSubCommand {
        draw_index: u32,
        buffer: ResourceId,
        offset: u64,
        stride: u32,
        args: IndirectArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u16)]
pub enum CommandKind {
    BeginCommandBuffer = 0,
    EndCommandBuffer = 1,
    BeginRenderPass = 2,
    EndRenderPass = 3,
    BindPipeline = 4,
    BindVertexBuffers = 5,
    BindIndexBuffer = 6,
    PushMarker = 7,
    PopMarker = 8,
    SetMarker = 9,
    Draw = 10,
    DrawIndexed = 11,
    DrawIndirect = 12,
    DrawIndexedIndirect = 13,
    DrawIndirectCount = 14,
    DrawIndexedIndirectCount = 15,
    DrawIndirectByteCount = 16,
    Dispatch = 17,
    DispatchBase = 18,
    DispatchIndirect = 19,
    CopyBuffer = 20,
    CopyImage = 21,
    BlitImage = 22,
    ResolveImage = 23,
    CopyBufferToImage = 24,
    CopyImageToBuffer = 25,
    FillBuffer = 26,
    ClearColorImage = 27,
    ClearDepthStencilImage = 28,
    ClearAttachments = 29,
    ExecuteCommands = 30,
    IndirectSubCommand = 31,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CommandCategory {
    /// Begin/end of a command buffer. Consumes no event.
    Frame,
    /// Render pass boundaries.
    Pass,
    /// Binds state; becomes an API event attached to the next draw.
    State,
    Marker,
    /// Draws, dispatches, copies and clears.
    Action,
    /// Executes secondary command buffers.
    Nested,
    Synthetic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ScopeRequirement {
    None,
    RenderPass,
}

/// Per-kind data driving the generic capture/replay pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub kind: CommandKind,
    pub name: &'static str,
    pub category: CommandCategory,
    pub scope: ScopeRequirement,
    pub patch: IndirectPatchKind,
    pub flags: DrawFlags,
}

const fn desc(
    kind: CommandKind,
    name: &'static str,
    category: CommandCategory,
    scope: ScopeRequirement,
    patch: IndirectPatchKind,
    flags: DrawFlags,
) -> CommandDescriptor {
    CommandDescriptor {
        kind,
        name,
        category,
        scope,
        patch,
        flags,
    }
}

const NONE: DrawFlags = DrawFlags::empty();
const DRAW: DrawFlags = DrawFlags::DRAWCALL.union(DrawFlags::INSTANCED);
const DRAW_INDEXED: DrawFlags = DRAW.union(DrawFlags::INDEXED);
const DRAW_INDIRECT: DrawFlags = DRAW.union(DrawFlags::INDIRECT);
const DRAW_INDEXED_INDIRECT: DrawFlags = DRAW_INDEXED.union(DrawFlags::INDIRECT);

use CommandCategory as Cat;
use IndirectPatchKind as Patch;
use ScopeRequirement as Scope;

/// Indexed by `CommandKind as usize`.
pub static DESCRIPTORS: [CommandDescriptor; 32] = [
    desc(CommandKind::BeginCommandBuffer, "BeginCommandBuffer", Cat::Frame, Scope::None, Patch::NoPatch, NONE),
    desc(CommandKind::EndCommandBuffer, "EndCommandBuffer", Cat::Frame, Scope::None, Patch::NoPatch, NONE),
    desc(CommandKind::BeginRenderPass, "BeginRenderPass", Cat::Pass, Scope::None, Patch::NoPatch, DrawFlags::PASS_BOUNDARY.union(DrawFlags::BEGIN_PASS)),
    desc(CommandKind::EndRenderPass, "EndRenderPass", Cat::Pass, Scope::RenderPass, Patch::NoPatch, DrawFlags::PASS_BOUNDARY.union(DrawFlags::END_PASS)),
    desc(CommandKind::BindPipeline, "BindPipeline", Cat::State, Scope::None, Patch::NoPatch, NONE),
    desc(CommandKind::BindVertexBuffers, "BindVertexBuffers", Cat::State, Scope::None, Patch::NoPatch, NONE),
    desc(CommandKind::BindIndexBuffer, "BindIndexBuffer", Cat::State, Scope::None, Patch::NoPatch, NONE),
    desc(CommandKind::PushMarker, "PushMarker", Cat::Marker, Scope::None, Patch::NoPatch, DrawFlags::PUSH_MARKER),
    desc(CommandKind::PopMarker, "PopMarker", Cat::Marker, Scope::None, Patch::NoPatch, DrawFlags::POP_MARKER),
    desc(CommandKind::SetMarker, "SetMarker", Cat::Marker, Scope::None, Patch::NoPatch, DrawFlags::SET_MARKER),
    desc(CommandKind::Draw, "Draw", Cat::Action, Scope::RenderPass, Patch::NoPatch, DRAW),
    desc(CommandKind::DrawIndexed, "DrawIndexed", Cat::Action, Scope::RenderPass, Patch::NoPatch, DRAW_INDEXED),
    desc(CommandKind::DrawIndirect, "DrawIndirect", Cat::Action, Scope::RenderPass, Patch::Draw, DRAW_INDIRECT),
    desc(CommandKind::DrawIndexedIndirect, "DrawIndexedIndirect", Cat::Action, Scope::RenderPass, Patch::DrawIndexed, DRAW_INDEXED_INDIRECT),
    desc(CommandKind::DrawIndirectCount, "DrawIndirectCount", Cat::Action, Scope::RenderPass, Patch::DrawCount, DRAW_INDIRECT),
    desc(CommandKind::DrawIndexedIndirectCount, "DrawIndexedIndirectCount", Cat::Action, Scope::RenderPass, Patch::DrawIndexedCount, DRAW_INDEXED_INDIRECT),
    desc(CommandKind::DrawIndirectByteCount, "DrawIndirectByteCount", Cat::Action, Scope::RenderPass, Patch::DrawByteCount, DRAW_INDIRECT),
    desc(CommandKind::Dispatch, "Dispatch", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::DISPATCH),
    desc(CommandKind::DispatchBase, "DispatchBase", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::DISPATCH),
    desc(CommandKind::DispatchIndirect, "DispatchIndirect", Cat::Action, Scope::None, Patch::Dispatch, DrawFlags::DISPATCH.union(DrawFlags::INDIRECT)),
    desc(CommandKind::CopyBuffer, "CopyBuffer", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::COPY),
    desc(CommandKind::CopyImage, "CopyImage", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::COPY),
    desc(CommandKind::BlitImage, "BlitImage", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::RESOLVE),
    desc(CommandKind::ResolveImage, "ResolveImage", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::RESOLVE),
    desc(CommandKind::CopyBufferToImage, "CopyBufferToImage", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::COPY),
    desc(CommandKind::CopyImageToBuffer, "CopyImageToBuffer", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::COPY),
    desc(CommandKind::FillBuffer, "FillBuffer", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::CLEAR),
    desc(CommandKind::ClearColorImage, "ClearColorImage", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::CLEAR.union(DrawFlags::CLEAR_COLOR)),
    desc(CommandKind::ClearDepthStencilImage, "ClearDepthStencilImage", Cat::Action, Scope::None, Patch::NoPatch, DrawFlags::CLEAR.union(DrawFlags::CLEAR_DEPTH_STENCIL)),
    desc(CommandKind::ClearAttachments, "ClearAttachments", Cat::Action, Scope::RenderPass, Patch::NoPatch, DrawFlags::CLEAR),
    desc(CommandKind::ExecuteCommands, "ExecuteCommands", Cat::Nested, Scope::None, Patch::NoPatch, DrawFlags::CMD_LIST.union(DrawFlags::PUSH_MARKER)),
    desc(CommandKind::IndirectSubCommand, "Indirect sub-command", Cat::Synthetic, Scope::None, Patch::NoPatch, NONE),
];

impl CommandKind {
    pub fn descriptor(self) -> &'static CommandDescriptor {
        &DESCRIPTORS[self as usize]
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        DESCRIPTORS.get(tag as usize).map(|d| d.kind)
    }
}

/// Where an indirect command reads its arguments from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndirectSource {
    pub buffer: ResourceId,
    pub offset: u64,
    /// Recorded count: the draw count, or `maxDrawCount` for count variants.
    pub count: u32,
    pub stride: u32,
    pub counter: Option<(ResourceId, u64)>,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::BeginCommandBuffer { .. } => CommandKind::BeginCommandBuffer,
            Command::EndCommandBuffer => CommandKind::EndCommandBuffer,
            Command::BeginRenderPass { .. } => CommandKind::BeginRenderPass,
            Command::EndRenderPass => CommandKind::EndRenderPass,
            Command::BindPipeline { .. } => CommandKind::BindPipeline,
            Command::BindVertexBuffers { .. } => CommandKind::BindVertexBuffers,
            Command::BindIndexBuffer { .. } => CommandKind::BindIndexBuffer,
            Command::PushMarker { .. } => CommandKind::PushMarker,
            Command::PopMarker => CommandKind::PopMarker,
            Command::SetMarker { .. } => CommandKind::SetMarker,
            Command::Draw { .. } => CommandKind::Draw,
            Command::DrawIndexed { .. } => CommandKind::DrawIndexed,
            Command::DrawIndirect { .. } => CommandKind::DrawIndirect,
            Command::DrawIndexedIndirect { .. } => CommandKind::DrawIndexedIndirect,
            Command::DrawIndirectCount { .. } => CommandKind::DrawIndirectCount,
            Command::DrawIndexedIndirectCount { .. } => CommandKind::DrawIndexedIndirectCount,
            Command::DrawIndirectByteCount { .. } => CommandKind::DrawIndirectByteCount,
            Command::Dispatch { .. } => CommandKind::Dispatch,
            Command::DispatchBase { .. } => CommandKind::DispatchBase,
            Command::DispatchIndirect { .. } => CommandKind::DispatchIndirect,
            Command::CopyBuffer { .. } => CommandKind::CopyBuffer,
            Command::CopyImage { .. } => CommandKind::CopyImage,
            Command::BlitImage { .. } => CommandKind::BlitImage,
            Command::ResolveImage { .. } => CommandKind::ResolveImage,
            Command::CopyBufferToImage { .. } => CommandKind::CopyBufferToImage,
            Command::CopyImageToBuffer { .. } => CommandKind::CopyImageToBuffer,
            Command::FillBuffer { .. } => CommandKind::FillBuffer,
            Command::ClearColorImage { .. } => CommandKind::ClearColorImage,
            Command::ClearDepthStencilImage { .. } => CommandKind::ClearDepthStencilImage,
            Command::ClearAttachments { .. } => CommandKind::ClearAttachments,
            Command::ExecuteCommands { .. } => CommandKind::ExecuteCommands,
            Command::IndirectSubCommand { .. } => CommandKind::IndirectSubCommand,
        }
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        self.kind().descriptor()
    }

    pub fn indirect_source(&self) -> Option<IndirectSource> {
        match *self {
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
            } => Some(IndirectSource {
                buffer,
                offset,
                count,
                stride,
                counter: None,
            }),
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
            } => Some(IndirectSource {
                buffer,
                offset,
                count: max_draw_count,
                stride,
                counter: Some((count_buffer, count_offset)),
            }),
            Command::DrawIndirectByteCount {
                counter_buffer,
                counter_offset,
                vertex_stride,
                ..
            } => Some(IndirectSource {
                buffer: counter_buffer,
                offset: counter_offset,
                count: 1,
                stride: vertex_stride,
                counter: None,
            }),
            Command::DispatchIndirect { buffer, offset } => Some(IndirectSource {
                buffer,
                offset,
                count: 1,
                stride: 0,
                counter: None,
            }),
            _ => None,
        }
    }

    /// Display name before any indirect arguments are known.
    pub fn display_name(&self) -> String {
        let base = self.descriptor().name;
        match self {
            Command::Draw {
                vertex_count,
                instance_count,
                ..
            } => format!("{base}({vertex_count}, {instance_count})"),
            Command::DrawIndexed {
                index_count,
                instance_count,
                ..
            } => format!("{base}({index_count}, {instance_count})"),
            Command::DrawIndirectByteCount { .. } => format!("{base}(<?, ?>)"),
            Command::Dispatch { x, y, z } => format!("{base}({x}, {y}, {z})"),
            Command::DispatchBase { base: b, groups: g } => format!(
                "{base}({}, {}, {}, {}, {}, {})",
                b[0], b[1], b[2], g[0], g[1], g[2]
            ),
            Command::DispatchIndirect { .. } => format!("{base}(<?, ?, ?>)"),
            Command::CopyBuffer { src, dst, .. }
            | Command::CopyImage { src, dst, .. }
            | Command::BlitImage { src, dst, .. }
            | Command::ResolveImage { src, dst, .. }
            | Command::CopyBufferToImage { src, dst, .. }
            | Command::CopyImageToBuffer { src, dst, .. } => format!("{base}({src}, {dst})"),
            Command::FillBuffer { buffer, .. } => format!("{base}({buffer})"),
            Command::ClearColorImage { image, .. } | Command::ClearDepthStencilImage { image, .. } => {
                format!("{base}({image})")
            }
            Command::ClearAttachments { attachments } => format!("{base}({})", attachments.len()),
            Command::BeginRenderPass {
                color_attachments,
                depth_attachment,
                ..
            } => format!(
                "{base}(C={}, D={})",
                color_attachments.len(),
                if depth_attachment.is_some() { "yes" } else { "no" }
            ),
            Command::PushMarker { name } | Command::SetMarker { name } => name.clone(),
            Command::ExecuteCommands { secondaries } => format!("{base}({})", secondaries.len()),
            _ => base.to_owned(),
        }
    }

    /// Flags of the node this command produces. Clears of attachments pick up the colour and
    /// depth flags of what they clear.
    pub fn draw_flags(&self) -> DrawFlags {
        let mut flags = self.descriptor().flags;
        if let Command::ClearAttachments { attachments } = self {
            for att in attachments {
                flags |= match att {
                    ClearAttachment::Color { .. } => DrawFlags::CLEAR_COLOR,
                    ClearAttachment::DepthStencil => DrawFlags::CLEAR_DEPTH_STENCIL,
                };
            }
        }
        flags
    }

    /// Resources this command touches, given the recording state of its command buffer.
    pub fn usages(&self, ctx: &CommandBufferContext) -> Vec<UsageTouch> {
        let mut out = Vec::new();
        match self {
            Command::CopyBuffer { src, dst, .. } => {
                copy_pair(&mut out, *src, *dst, None, None, ResourceUsage::Copy)
            }
            Command::CopyImage { src, dst, regions } => {
                let first = regions.first();
                copy_pair(
                    &mut out,
                    *src,
                    *dst,
                    first.map(|r| r.src),
                    first.map(|r| r.dst),
                    ResourceUsage::Copy,
                )
            }
            Command::BlitImage { src, dst, regions } | Command::ResolveImage { src, dst, regions } => {
                let first = regions.first();
                copy_pair(
                    &mut out,
                    *src,
                    *dst,
                    first.map(|r| r.src),
                    first.map(|r| r.dst),
                    ResourceUsage::Resolve,
                )
            }
            Command::CopyBufferToImage { src, dst, regions } => {
                let first = regions.first();
                copy_pair(&mut out, *src, *dst, None, first.map(|r| r.image), ResourceUsage::Copy)
            }
            Command::CopyImageToBuffer { src, dst, regions } => {
                let first = regions.first();
                copy_pair(&mut out, *src, *dst, first.map(|r| r.image), None, ResourceUsage::Copy)
            }
            Command::FillBuffer { buffer, .. } => {
                out.push(UsageTouch::new(*buffer, ResourceUsage::Clear))
            }
            Command::ClearColorImage { image, ranges, .. }
            | Command::ClearDepthStencilImage { image, ranges, .. } => out.push(
                UsageTouch::new(*image, ResourceUsage::Clear).at(ranges.first().copied()),
            ),
            Command::ClearAttachments { attachments } => {
                if let Some(pass) = &ctx.render_pass {
                    for att in attachments {
                        let target = match att {
                            ClearAttachment::Color { index } => {
                                pass.color_attachments.get(*index as usize).copied()
                            }
                            ClearAttachment::DepthStencil => pass.depth_attachment,
                        };
                        if let Some(target) = target {
                            out.push(UsageTouch::new(target, ResourceUsage::Clear));
                        }
                    }
                }
            }
            _ if self.descriptor().flags.contains(DrawFlags::DRAWCALL) => {
                bound_draw_usages(&mut out, ctx, self.descriptor().flags);
                if let Some(src) = self.indirect_source() {
                    out.push(UsageTouch::new(src.buffer, ResourceUsage::Indirect));
                    if let Some((counter, _)) = src.counter {
                        out.push(UsageTouch::new(counter, ResourceUsage::Indirect));
                    }
                }
            }
            Command::DispatchIndirect { buffer, .. } => {
                out.push(UsageTouch::new(*buffer, ResourceUsage::Indirect))
            }
            _ => {}
        }
        out
    }
}

/// Self-copies collapse to one `same` usage; anything else records source and destination.
fn copy_pair(
    out: &mut Vec<UsageTouch>,
    src: ResourceId,
    dst: ResourceId,
    src_sub: Option<Subresource>,
    dst_sub: Option<Subresource>,
    same: ResourceUsage,
) {
    if src == dst {
        out.push(UsageTouch::new(src, same).at(src_sub));
        return;
    }
    let (src_usage, dst_usage) = match same {
        ResourceUsage::Resolve => (ResourceUsage::ResolveSrc, ResourceUsage::ResolveDst),
        _ => (ResourceUsage::CopySrc, ResourceUsage::CopyDst),
    };
    out.push(UsageTouch::new(src, src_usage).at(src_sub));
    out.push(UsageTouch::new(dst, dst_usage).at(dst_sub));
}

fn bound_draw_usages(out: &mut Vec<UsageTouch>, ctx: &CommandBufferContext, flags: DrawFlags) {
    for vb in ctx.vertex_buffers.iter().filter(|b| !b.is_null()) {
        out.push(UsageTouch::new(*vb, ResourceUsage::VertexBuffer));
    }
    if flags.contains(DrawFlags::INDEXED) && !ctx.index_buffer.is_null() {
        out.push(UsageTouch::new(ctx.index_buffer, ResourceUsage::IndexBuffer));
    }
    if let Some(pass) = &ctx.render_pass {
        for target in &pass.color_attachments {
            out.push(UsageTouch::new(*target, ResourceUsage::ColorTarget));
        }
        if let Some(depth) = pass.depth_attachment {
            out.push(UsageTouch::new(depth, ResourceUsage::DepthStencilTarget));
        }
    }
}
