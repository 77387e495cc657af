//! Field schemas: how each command is stored as a chunk, and how it is read back.
//!
//! Every chunk starts with a `commandBuffer` resource field naming the command buffer it was
//! recorded into; the command's own arguments follow in declaration order.

use gpucap_chunklog::{Chunk, ChunkFlags, ChunkKind, Field, FieldValue};

use super::{
    BufferCopy, BufferImageCopy, ClearAttachment, Command, CommandKind, ImageCopy, IndexType,
};
use crate::context::{
    vertex_bindings_fit, CommandBufferLevel, CommandBufferUsage, MAX_VERTEX_BINDINGS,
};
use crate::ids::{CommandBufferId, ResourceId};
use crate::indirect::{
    DispatchIndirectArgs, DrawIndexedIndirectArgs, DrawIndirectArgs, IndirectArgs,
};
use crate::usage::Subresource;

const COMMAND_BUFFER: &str = "commandBuffer";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown command kind tag {0}")]
    UnknownKind(u16),
    #[error("{kind:?} chunk is missing field `{field}`")]
    MissingField {
        kind: CommandKind,
        field: &'static str,
    },
    #[error("{kind:?} field `{field}` has the wrong type")]
    WrongType {
        kind: CommandKind,
        field: &'static str,
    },
    #[error("{kind:?} field `{field}` has invalid value {value}")]
    InvalidValue {
        kind: CommandKind,
        field: &'static str,
        value: u64,
    },
    #[error(
        "{count} vertex bindings starting at {first_binding} exceed {max} slots",
        max = MAX_VERTEX_BINDINGS
    )]
    VertexBindingsOutOfRange { first_binding: u32, count: usize },
}

fn u32v(v: u32) -> FieldValue {
    FieldValue::U32(v)
}

fn u64v(v: u64) -> FieldValue {
    FieldValue::U64(v)
}

fn res(id: ResourceId) -> FieldValue {
    FieldValue::Resource(id.0)
}

fn res_list(ids: &[ResourceId]) -> FieldValue {
    FieldValue::Array(ids.iter().map(|&id| res(id)).collect())
}

fn subresource(sub: Subresource) -> FieldValue {
    FieldValue::Struct(vec![
        Field::new("mip", u32v(sub.mip)),
        Field::new("slice", u32v(sub.slice)),
    ])
}

fn image_copies(regions: &[ImageCopy]) -> FieldValue {
    FieldValue::Array(
        regions
            .iter()
            .map(|r| {
                FieldValue::Struct(vec![
                    Field::new("src", subresource(r.src)),
                    Field::new("dst", subresource(r.dst)),
                ])
            })
            .collect(),
    )
}

fn buffer_image_copies(regions: &[BufferImageCopy]) -> FieldValue {
    FieldValue::Array(
        regions
            .iter()
            .map(|r| {
                FieldValue::Struct(vec![
                    Field::new("bufferOffset", u64v(r.buffer_offset)),
                    Field::new("image", subresource(r.image)),
                ])
            })
            .collect(),
    )
}

fn ranges(ranges: &[Subresource]) -> FieldValue {
    FieldValue::Array(ranges.iter().map(|&r| subresource(r)).collect())
}

impl Command {
    /// Serializes the command into a chunk recorded into `cb`. The chunk's offset is assigned
    /// when it is appended to a log.
    pub fn to_chunk(&self, cb: CommandBufferId) -> Chunk {
        let mut chunk = Chunk::new(ChunkKind(self.kind().tag()))
            .with_field(COMMAND_BUFFER, FieldValue::Resource(cb.0));
        let mut put = |name: &str, value: FieldValue| chunk.push_field(name, value);

        match self {
            Command::BeginCommandBuffer { level, usage } => {
                put("level", u32v(level.to_raw()));
                put("flags", u32v(usage.bits()));
            }
            Command::EndCommandBuffer | Command::EndRenderPass | Command::PopMarker => {}
            Command::BeginRenderPass {
                render_pass,
                color_attachments,
                depth_attachment,
            } => {
                put("renderPass", res(*render_pass));
                put("colorAttachments", res_list(color_attachments));
                put(
                    "depthAttachment",
                    depth_attachment.map_or(FieldValue::Null, res),
                );
            }
            Command::BindPipeline { pipeline, compute } => {
                put("pipeline", res(*pipeline));
                put("compute", FieldValue::Bool(*compute));
            }
            Command::BindVertexBuffers {
                first_binding,
                buffers,
                offsets,
            } => {
                put("firstBinding", u32v(*first_binding));
                put("buffers", res_list(buffers));
                put(
                    "offsets",
                    FieldValue::Array(offsets.iter().map(|&o| u64v(o)).collect()),
                );
            }
            Command::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            } => {
                put("buffer", res(*buffer));
                put("offset", u64v(*offset));
                put(
                    "indexType",
                    u32v(match index_type {
                        IndexType::U16 => 0,
                        IndexType::U32 => 1,
                    }),
                );
            }
            Command::PushMarker { name } | Command::SetMarker { name } => {
                put("name", FieldValue::Str(name.clone()));
            }
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                put("vertexCount", u32v(*vertex_count));
                put("instanceCount", u32v(*instance_count));
                put("firstVertex", u32v(*first_vertex));
                put("firstInstance", u32v(*first_instance));
            }
            Command::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            } => {
                put("indexCount", u32v(*index_count));
                put("instanceCount", u32v(*instance_count));
                put("firstIndex", u32v(*first_index));
                put("vertexOffset", FieldValue::I32(*vertex_offset));
                put("firstInstance", u32v(*first_instance));
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
            } => {
                put("buffer", res(*buffer));
                put("offset", u64v(*offset));
                put("count", u32v(*count));
                put("stride", u32v(*stride));
            }
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
                put("buffer", res(*buffer));
                put("offset", u64v(*offset));
                put("countBuffer", res(*count_buffer));
                put("countBufferOffset", u64v(*count_offset));
                put("maxDrawCount", u32v(*max_draw_count));
                put("stride", u32v(*stride));
            }
            Command::DrawIndirectByteCount {
                instance_count,
                first_instance,
                counter_buffer,
                counter_offset,
                counter_vertex_offset,
                vertex_stride,
            } => {
                put("instanceCount", u32v(*instance_count));
                put("firstInstance", u32v(*first_instance));
                put("counterBuffer", res(*counter_buffer));
                put("counterBufferOffset", u64v(*counter_offset));
                put("counterOffset", u32v(*counter_vertex_offset));
                put("vertexStride", u32v(*vertex_stride));
            }
            Command::Dispatch { x, y, z } => {
                put("x", u32v(*x));
                put("y", u32v(*y));
                put("z", u32v(*z));
            }
            Command::DispatchBase { base, groups } => {
                put("baseX", u32v(base[0]));
                put("baseY", u32v(base[1]));
                put("baseZ", u32v(base[2]));
                put("x", u32v(groups[0]));
                put("y", u32v(groups[1]));
                put("z", u32v(groups[2]));
            }
            Command::DispatchIndirect { buffer, offset } => {
                put("buffer", res(*buffer));
                put("offset", u64v(*offset));
            }
            Command::CopyBuffer { src, dst, regions } => {
                put("src", res(*src));
                put("dst", res(*dst));
                put(
                    "regions",
                    FieldValue::Array(
                        regions
                            .iter()
                            .map(|r| {
                                FieldValue::Struct(vec![
                                    Field::new("srcOffset", u64v(r.src_offset)),
                                    Field::new("dstOffset", u64v(r.dst_offset)),
                                    Field::new("size", u64v(r.size)),
                                ])
                            })
                            .collect(),
                    ),
                );
            }
            Command::CopyImage { src, dst, regions }
            | Command::BlitImage { src, dst, regions }
            | Command::ResolveImage { src, dst, regions } => {
                put("src", res(*src));
                put("dst", res(*dst));
                put("regions", image_copies(regions));
            }
            Command::CopyBufferToImage { src, dst, regions }
            | Command::CopyImageToBuffer { src, dst, regions } => {
                put("src", res(*src));
                put("dst", res(*dst));
                put("regions", buffer_image_copies(regions));
            }
            Command::FillBuffer {
                buffer,
                offset,
                size,
                data,
            } => {
                put("buffer", res(*buffer));
                put("offset", u64v(*offset));
                put("size", u64v(*size));
                put("data", u32v(*data));
            }
            Command::ClearColorImage {
                image,
                color,
                ranges: r,
            } => {
                put("image", res(*image));
                put(
                    "color",
                    FieldValue::Array(color.iter().map(|&c| FieldValue::F32(c)).collect()),
                );
                put("ranges", ranges(r));
            }
            Command::ClearDepthStencilImage {
                image,
                depth,
                stencil,
                ranges: r,
            } => {
                put("image", res(*image));
                put("depth", FieldValue::F32(*depth));
                put("stencil", u32v(*stencil));
                put("ranges", ranges(r));
            }
            Command::ClearAttachments { attachments } => {
                put(
                    "attachments",
                    FieldValue::Array(
                        attachments
                            .iter()
                            .map(|a| {
                                let (aspect, index) = match a {
                                    ClearAttachment::Color { index } => (0, *index),
                                    ClearAttachment::DepthStencil => (1, 0),
                                };
                                FieldValue::Struct(vec![
                                    Field::new("aspect", u32v(aspect)),
                                    Field::new("colorAttachment", u32v(index)),
                                ])
                            })
                            .collect(),
                    ),
                );
            }
            Command::ExecuteCommands { secondaries } => {
                put(
                    "commandBuffers",
                    FieldValue::Array(
                        secondaries
                            .iter()
                            .map(|cb| FieldValue::Resource(cb.0))
                            .collect(),
                    ),
                );
            }
            Command::IndirectSubCommand {
                draw_index,
                buffer,
                offset,
                stride,
                args,
            } => {
                put("drawIndex", u32v(*draw_index));
                put("buffer", res(*buffer));
                put("offset", u64v(*offset));
                put("stride", u32v(*stride));
                put("command", args.to_field_value());
            }
        }
        if self.kind() == CommandKind::IndirectSubCommand {
            chunk.flags |= ChunkFlags::SYNTHETIC;
        }
        chunk
    }

    /// Reads a chunk back into the command buffer it was recorded into and the command.
    pub fn from_chunk(chunk: &Chunk) -> Result<(CommandBufferId, Command), DecodeError> {
        let kind = CommandKind::from_tag(chunk.kind.0).ok_or(DecodeError::UnknownKind(chunk.kind.0))?;
        let f = Fields {
            kind,
            fields: &chunk.fields,
        };
        let cb = CommandBufferId(f.resource(COMMAND_BUFFER)?.0);

        let cmd = match kind {
            CommandKind::BeginCommandBuffer => Command::BeginCommandBuffer {
                level: CommandBufferLevel::from_raw(f.u32("level")?).ok_or(
                    DecodeError::InvalidValue {
                        kind,
                        field: "level",
                        value: u64::from(f.u32("level")?),
                    },
                )?,
                usage: CommandBufferUsage::from_bits_truncate(f.u32("flags")?),
            },
            CommandKind::EndCommandBuffer => Command::EndCommandBuffer,
            CommandKind::BeginRenderPass => Command::BeginRenderPass {
                render_pass: f.resource("renderPass")?,
                color_attachments: f.resource_list("colorAttachments")?,
                depth_attachment: match f.get("depthAttachment")? {
                    FieldValue::Null => None,
                    FieldValue::Resource(id) => Some(ResourceId(*id)),
                    _ => {
                        return Err(DecodeError::WrongType {
                            kind,
                            field: "depthAttachment",
                        })
                    }
                },
            },
            CommandKind::EndRenderPass => Command::EndRenderPass,
            CommandKind::BindPipeline => Command::BindPipeline {
                pipeline: f.resource("pipeline")?,
                compute: f.bool("compute")?,
            },
            CommandKind::BindVertexBuffers => {
                let first_binding = f.u32("firstBinding")?;
                let buffers = f.resource_list("buffers")?;
                if !vertex_bindings_fit(first_binding, buffers.len()) {
                    return Err(DecodeError::VertexBindingsOutOfRange {
                        first_binding,
                        count: buffers.len(),
                    });
                }
                Command::BindVertexBuffers {
                    first_binding,
                    buffers,
                    offsets: f.map_array("offsets", |v| v.as_u64())?,
                }
            }
            CommandKind::BindIndexBuffer => Command::BindIndexBuffer {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                index_type: match f.u32("indexType")? {
                    0 => IndexType::U16,
                    1 => IndexType::U32,
                    other => {
                        return Err(DecodeError::InvalidValue {
                            kind,
                            field: "indexType",
                            value: u64::from(other),
                        })
                    }
                },
            },
            CommandKind::PushMarker => Command::PushMarker {
                name: f.str("name")?.to_owned(),
            },
            CommandKind::PopMarker => Command::PopMarker,
            CommandKind::SetMarker => Command::SetMarker {
                name: f.str("name")?.to_owned(),
            },
            CommandKind::Draw => Command::Draw {
                vertex_count: f.u32("vertexCount")?,
                instance_count: f.u32("instanceCount")?,
                first_vertex: f.u32("firstVertex")?,
                first_instance: f.u32("firstInstance")?,
            },
            CommandKind::DrawIndexed => Command::DrawIndexed {
                index_count: f.u32("indexCount")?,
                instance_count: f.u32("instanceCount")?,
                first_index: f.u32("firstIndex")?,
                vertex_offset: f.i32("vertexOffset")?,
                first_instance: f.u32("firstInstance")?,
            },
            CommandKind::DrawIndirect => Command::DrawIndirect {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                count: f.u32("count")?,
                stride: f.u32("stride")?,
            },
            CommandKind::DrawIndexedIndirect => Command::DrawIndexedIndirect {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                count: f.u32("count")?,
                stride: f.u32("stride")?,
            },
            CommandKind::DrawIndirectCount => Command::DrawIndirectCount {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                count_buffer: f.resource("countBuffer")?,
                count_offset: f.u64("countBufferOffset")?,
                max_draw_count: f.u32("maxDrawCount")?,
                stride: f.u32("stride")?,
            },
            CommandKind::DrawIndexedIndirectCount => Command::DrawIndexedIndirectCount {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                count_buffer: f.resource("countBuffer")?,
                count_offset: f.u64("countBufferOffset")?,
                max_draw_count: f.u32("maxDrawCount")?,
                stride: f.u32("stride")?,
            },
            CommandKind::DrawIndirectByteCount => Command::DrawIndirectByteCount {
                instance_count: f.u32("instanceCount")?,
                first_instance: f.u32("firstInstance")?,
                counter_buffer: f.resource("counterBuffer")?,
                counter_offset: f.u64("counterBufferOffset")?,
                counter_vertex_offset: f.u32("counterOffset")?,
                vertex_stride: f.u32("vertexStride")?,
            },
            CommandKind::Dispatch => Command::Dispatch {
                x: f.u32("x")?,
                y: f.u32("y")?,
                z: f.u32("z")?,
            },
            CommandKind::DispatchBase => Command::DispatchBase {
                base: [f.u32("baseX")?, f.u32("baseY")?, f.u32("baseZ")?],
                groups: [f.u32("x")?, f.u32("y")?, f.u32("z")?],
            },
            CommandKind::DispatchIndirect => Command::DispatchIndirect {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
            },
            CommandKind::CopyBuffer => Command::CopyBuffer {
                src: f.resource("src")?,
                dst: f.resource("dst")?,
                regions: f.map_structs("regions", |r| {
                    Ok(BufferCopy {
                        src_offset: r.u64("srcOffset")?,
                        dst_offset: r.u64("dstOffset")?,
                        size: r.u64("size")?,
                    })
                })?,
            },
            CommandKind::CopyImage | CommandKind::BlitImage | CommandKind::ResolveImage => {
                let src = f.resource("src")?;
                let dst = f.resource("dst")?;
                let regions = f.map_structs("regions", |r| {
                    Ok(ImageCopy {
                        src: r.subresource("src")?,
                        dst: r.subresource("dst")?,
                    })
                })?;
                match kind {
                    CommandKind::CopyImage => Command::CopyImage { src, dst, regions },
                    CommandKind::BlitImage => Command::BlitImage { src, dst, regions },
                    _ => Command::ResolveImage { src, dst, regions },
                }
            }
            CommandKind::CopyBufferToImage | CommandKind::CopyImageToBuffer => {
                let src = f.resource("src")?;
                let dst = f.resource("dst")?;
                let regions = f.map_structs("regions", |r| {
                    Ok(BufferImageCopy {
                        buffer_offset: r.u64("bufferOffset")?,
                        image: r.subresource("image")?,
                    })
                })?;
                if kind == CommandKind::CopyBufferToImage {
                    Command::CopyBufferToImage { src, dst, regions }
                } else {
                    Command::CopyImageToBuffer { src, dst, regions }
                }
            }
            CommandKind::FillBuffer => Command::FillBuffer {
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                size: f.u64("size")?,
                data: f.u32("data")?,
            },
            CommandKind::ClearColorImage => {
                let color = f.map_array("color", FieldValue::as_f32)?;
                let color: [f32; 4] = color.try_into().map_err(|_| DecodeError::WrongType {
                    kind,
                    field: "color",
                })?;
                Command::ClearColorImage {
                    image: f.resource("image")?,
                    color,
                    ranges: f.map_structs("ranges", Fields::as_subresource)?,
                }
            }
            CommandKind::ClearDepthStencilImage => Command::ClearDepthStencilImage {
                image: f.resource("image")?,
                depth: f.f32("depth")?,
                stencil: f.u32("stencil")?,
                ranges: f.map_structs("ranges", Fields::as_subresource)?,
            },
            CommandKind::ClearAttachments => Command::ClearAttachments {
                attachments: f.map_structs("attachments", |a| match a.u32("aspect")? {
                    0 => Ok(ClearAttachment::Color {
                        index: a.u32("colorAttachment")?,
                    }),
                    1 => Ok(ClearAttachment::DepthStencil),
                    other => Err(DecodeError::InvalidValue {
                        kind,
                        field: "aspect",
                        value: u64::from(other),
                    }),
                })?,
            },
            CommandKind::ExecuteCommands => Command::ExecuteCommands {
                secondaries: f
                    .map_array("commandBuffers", FieldValue::as_resource)?
                    .into_iter()
                    .map(CommandBufferId)
                    .collect(),
            },
            CommandKind::IndirectSubCommand => Command::IndirectSubCommand {
                draw_index: f.u32("drawIndex")?,
                buffer: f.resource("buffer")?,
                offset: f.u64("offset")?,
                stride: f.u32("stride")?,
                args: f.nested("command").and_then(|args| args.indirect_args())?,
            },
        };
        Ok((cb, cmd))
    }
}

/// Synthetic sub-command chunk for one sub-draw of an indirect command. `template` is the real
/// chunk being expanded; the synthetic chunk inherits its command buffer and log offset.
pub fn indirect_sub_chunk(
    template: &Chunk,
    draw_index: u32,
    buffer: ResourceId,
    offset: u64,
    stride: u32,
    args: IndirectArgs,
) -> Chunk {
    let cb = template
        .field(COMMAND_BUFFER)
        .and_then(FieldValue::as_resource)
        .unwrap_or_default();
    let mut chunk = Command::IndirectSubCommand {
        draw_index,
        buffer,
        offset,
        stride,
        args,
    }
    .to_chunk(CommandBufferId(cb));
    chunk.offset = template.offset;
    chunk
}

/// Typed field lookups for one chunk body (or one nested struct).
struct Fields<'a> {
    kind: CommandKind,
    fields: &'a [Field],
}

impl<'a> Fields<'a> {
    fn get(&self, field: &'static str) -> Result<&'a FieldValue, DecodeError> {
        gpucap_chunklog::find_field(self.fields, field).ok_or(DecodeError::MissingField {
            kind: self.kind,
            field,
        })
    }

    fn typed<T>(
        &self,
        field: &'static str,
        f: impl FnOnce(&'a FieldValue) -> Option<T>,
    ) -> Result<T, DecodeError> {
        f(self.get(field)?).ok_or(DecodeError::WrongType {
            kind: self.kind,
            field,
        })
    }

    fn u32(&self, field: &'static str) -> Result<u32, DecodeError> {
        self.typed(field, FieldValue::as_u32)
    }

    fn i32(&self, field: &'static str) -> Result<i32, DecodeError> {
        self.typed(field, FieldValue::as_i32)
    }

    fn u64(&self, field: &'static str) -> Result<u64, DecodeError> {
        self.typed(field, FieldValue::as_u64)
    }

    fn f32(&self, field: &'static str) -> Result<f32, DecodeError> {
        self.typed(field, FieldValue::as_f32)
    }

    fn bool(&self, field: &'static str) -> Result<bool, DecodeError> {
        self.typed(field, FieldValue::as_bool)
    }

    fn str(&self, field: &'static str) -> Result<&'a str, DecodeError> {
        self.typed(field, FieldValue::as_str)
    }

    fn resource(&self, field: &'static str) -> Result<ResourceId, DecodeError> {
        self.typed(field, FieldValue::as_resource).map(ResourceId)
    }

    fn nested(&self, field: &'static str) -> Result<Fields<'a>, DecodeError> {
        let fields = self.typed(field, FieldValue::as_struct)?;
        Ok(Fields {
            kind: self.kind,
            fields,
        })
    }

    fn map_array<T>(
        &self,
        field: &'static str,
        f: impl Fn(&'a FieldValue) -> Option<T>,
    ) -> Result<Vec<T>, DecodeError> {
        let items = self.typed(field, FieldValue::as_array)?;
        items
            .iter()
            .map(|v| {
                f(v).ok_or(DecodeError::WrongType {
                    kind: self.kind,
                    field,
                })
            })
            .collect()
    }

    fn map_structs<T>(
        &self,
        field: &'static str,
        f: impl Fn(&Fields<'a>) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let items = self.typed(field, FieldValue::as_array)?;
        items
            .iter()
            .map(|v| {
                let fields = v.as_struct().ok_or(DecodeError::WrongType {
                    kind: self.kind,
                    field,
                })?;
                f(&Fields {
                    kind: self.kind,
                    fields,
                })
            })
            .collect()
    }

    fn resource_list(&self, field: &'static str) -> Result<Vec<ResourceId>, DecodeError> {
        Ok(self
            .map_array(field, FieldValue::as_resource)?
            .into_iter()
            .map(ResourceId)
            .collect())
    }

    fn as_subresource(&self) -> Result<Subresource, DecodeError> {
        Ok(Subresource {
            mip: self.u32("mip")?,
            slice: self.u32("slice")?,
        })
    }

    fn subresource(&self, field: &'static str) -> Result<Subresource, DecodeError> {
        self.nested(field)?.as_subresource()
    }

    /// The argument record is identified by its first field name.
    fn indirect_args(&self) -> Result<IndirectArgs, DecodeError> {
        match self.fields.first().map(|f| f.name.as_str()) {
            Some("x") => Ok(IndirectArgs::Dispatch(DispatchIndirectArgs {
                x: self.u32("x")?,
                y: self.u32("y")?,
                z: self.u32("z")?,
            })),
            Some("vertexCount") => Ok(IndirectArgs::Draw(DrawIndirectArgs {
                vertex_count: self.u32("vertexCount")?,
                instance_count: self.u32("instanceCount")?,
                first_vertex: self.u32("firstVertex")?,
                first_instance: self.u32("firstInstance")?,
            })),
            Some("indexCount") => Ok(IndirectArgs::DrawIndexed(DrawIndexedIndirectArgs {
                index_count: self.u32("indexCount")?,
                instance_count: self.u32("instanceCount")?,
                first_index: self.u32("firstIndex")?,
                base_vertex: self.i32("vertexOffset")?,
                first_instance: self.u32("firstInstance")?,
            })),
            _ => Err(DecodeError::WrongType {
                kind: self.kind,
                field: "command",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(cmd: &Command) -> Command {
        let chunk = cmd.to_chunk(CommandBufferId(9));
        let (cb, decoded) = Command::from_chunk(&chunk).unwrap();
        assert_eq!(cb, CommandBufferId(9));
        decoded
    }

    #[test]
    fn vertex_bindings_past_the_last_slot_are_rejected() {
        let chunk = Command::BindVertexBuffers {
            first_binding: 0x7fff_ffff,
            buffers: vec![ResourceId(1)],
            offsets: vec![0],
        }
        .to_chunk(CommandBufferId(9));
        assert_eq!(
            Command::from_chunk(&chunk).unwrap_err(),
            DecodeError::VertexBindingsOutOfRange {
                first_binding: 0x7fff_ffff,
                count: 1
            }
        );
    }

    #[test]
    fn first_field_names_the_command_buffer() {
        let chunk = Command::EndRenderPass.to_chunk(CommandBufferId(42));
        assert_eq!(chunk.fields[0].name, "commandBuffer");
        assert_eq!(chunk.fields[0].value, FieldValue::Resource(42));
        assert_eq!(chunk.kind, ChunkKind(CommandKind::EndRenderPass.tag()));
    }

    #[test]
    fn commands_with_nested_fields_decode_back() {
        let cmds = [
            Command::BeginRenderPass {
                render_pass: ResourceId(1),
                color_attachments: vec![ResourceId(2), ResourceId(3)],
                depth_attachment: None,
            },
            Command::ClearColorImage {
                image: ResourceId(4),
                color: [0.0, 0.5, 1.0, 1.0],
                ranges: vec![Subresource { mip: 2, slice: 0 }],
            },
            Command::CopyImageToBuffer {
                src: ResourceId(5),
                dst: ResourceId(6),
                regions: vec![BufferImageCopy {
                    buffer_offset: 256,
                    image: Subresource { mip: 1, slice: 3 },
                }],
            },
            Command::ClearAttachments {
                attachments: vec![ClearAttachment::DepthStencil, ClearAttachment::Color { index: 2 }],
            },
            Command::DrawIndexed {
                index_count: 3,
                instance_count: 1,
                first_index: 0,
                vertex_offset: -8,
                first_instance: 0,
            },
        ];
        for cmd in &cmds {
            assert_eq!(&decode(cmd), cmd);
        }
    }

    #[test]
    fn synthetic_sub_chunk_inherits_template_context() {
        let mut template = Command::DrawIndirect {
            buffer: ResourceId(7),
            offset: 64,
            count: 1,
            stride: 16,
        }
        .to_chunk(CommandBufferId(3));
        template.offset = 1234;

        let args = IndirectArgs::Draw(DrawIndirectArgs {
            vertex_count: 3,
            instance_count: 1,
            ..Default::default()
        });
        let chunk = indirect_sub_chunk(&template, 0, ResourceId(7), 64, 16, args);
        assert!(chunk.is_synthetic());
        assert_eq!(chunk.offset, 1234);

        let names: Vec<_> = chunk.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            ["commandBuffer", "drawIndex", "buffer", "offset", "stride", "command"]
        );
        let (cb, cmd) = Command::from_chunk(&chunk).unwrap();
        assert_eq!(cb, CommandBufferId(3));
        assert!(matches!(cmd, Command::IndirectSubCommand { args: a, .. } if a == args));
    }

    #[test]
    fn missing_and_mistyped_fields_are_reported() {
        let mut chunk = Command::Dispatch { x: 1, y: 2, z: 3 }.to_chunk(CommandBufferId(1));
        chunk.fields.pop();
        assert_eq!(
            Command::from_chunk(&chunk),
            Err(DecodeError::MissingField {
                kind: CommandKind::Dispatch,
                field: "z"
            })
        );

        let mut chunk = Command::Dispatch { x: 1, y: 2, z: 3 }.to_chunk(CommandBufferId(1));
        chunk.fields[1].value = FieldValue::Str("one".into());
        assert_eq!(
            Command::from_chunk(&chunk),
            Err(DecodeError::WrongType {
                kind: CommandKind::Dispatch,
                field: "x"
            })
        );

        let chunk = Chunk::new(ChunkKind(999));
        assert_eq!(Command::from_chunk(&chunk), Err(DecodeError::UnknownKind(999)));
    }
}
