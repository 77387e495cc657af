//! Indirect argument records and the patch descriptors attached to indirect draws.

use bytemuck::{Pod, Zeroable};
use gpucap_chunklog::{Field, FieldValue};
use serde::Serialize;

use crate::ids::{CommandBufferId, ResourceId};

/// Arguments of one indirect dispatch.
///
/// Total size: 12 bytes (3 * u32), 4-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct DispatchIndirectArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Arguments of one non-indexed indirect draw.
///
/// Total size: 16 bytes (4 * u32), 4-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Arguments of one indexed indirect draw.
///
/// Total size: 20 bytes (5 * 4-byte scalars), 4-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize)]
pub struct DrawIndexedIndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DispatchIndirectArgs {
    pub const SIZE_BYTES: u64 = core::mem::size_of::<Self>() as u64;
}

impl DrawIndirectArgs {
    pub const SIZE_BYTES: u64 = core::mem::size_of::<Self>() as u64;
}

impl DrawIndexedIndirectArgs {
    pub const SIZE_BYTES: u64 = core::mem::size_of::<Self>() as u64;
}

/// One decoded argument record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IndirectArgs {
    Dispatch(DispatchIndirectArgs),
    Draw(DrawIndirectArgs),
    DrawIndexed(DrawIndexedIndirectArgs),
}

impl IndirectArgs {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndirectArgs::Dispatch(a) => bytemuck::bytes_of(a),
            IndirectArgs::Draw(a) => bytemuck::bytes_of(a),
            IndirectArgs::DrawIndexed(a) => bytemuck::bytes_of(a),
        }
    }

    /// Field form stored in synthetic sub-command chunks.
    pub fn to_field_value(&self) -> FieldValue {
        let fields = match *self {
            IndirectArgs::Dispatch(a) => vec![
                Field::new("x", FieldValue::U32(a.x)),
                Field::new("y", FieldValue::U32(a.y)),
                Field::new("z", FieldValue::U32(a.z)),
            ],
            IndirectArgs::Draw(a) => vec![
                Field::new("vertexCount", FieldValue::U32(a.vertex_count)),
                Field::new("instanceCount", FieldValue::U32(a.instance_count)),
                Field::new("firstVertex", FieldValue::U32(a.first_vertex)),
                Field::new("firstInstance", FieldValue::U32(a.first_instance)),
            ],
            IndirectArgs::DrawIndexed(a) => vec![
                Field::new("indexCount", FieldValue::U32(a.index_count)),
                Field::new("instanceCount", FieldValue::U32(a.instance_count)),
                Field::new("firstIndex", FieldValue::U32(a.first_index)),
                Field::new("vertexOffset", FieldValue::I32(a.base_vertex)),
                Field::new("firstInstance", FieldValue::U32(a.first_instance)),
            ],
        };
        FieldValue::Struct(fields)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum IndirectPatchKind {
    #[default]
    NoPatch,
    Dispatch,
    Draw,
    DrawIndexed,
    DrawCount,
    DrawIndexedCount,
    DrawByteCount,
}

impl IndirectPatchKind {
    /// Size of one argument record, or 0 when the kind has none.
    pub fn record_size(self) -> u64 {
        match self {
            IndirectPatchKind::NoPatch => 0,
            IndirectPatchKind::Dispatch => DispatchIndirectArgs::SIZE_BYTES,
            IndirectPatchKind::Draw | IndirectPatchKind::DrawCount => DrawIndirectArgs::SIZE_BYTES,
            IndirectPatchKind::DrawIndexed | IndirectPatchKind::DrawIndexedCount => {
                DrawIndexedIndirectArgs::SIZE_BYTES
            }
            IndirectPatchKind::DrawByteCount => 4,
        }
    }

    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            IndirectPatchKind::DrawIndexed | IndirectPatchKind::DrawIndexedCount
        )
    }

    pub fn has_count_buffer(self) -> bool {
        matches!(
            self,
            IndirectPatchKind::DrawCount | IndirectPatchKind::DrawIndexedCount
        )
    }

    /// Bytes of argument data covering `count` records spaced `stride` apart.
    pub fn data_size(self, count: u32, stride: u32) -> u64 {
        match self {
            IndirectPatchKind::NoPatch => 0,
            IndirectPatchKind::Dispatch | IndirectPatchKind::DrawByteCount => self.record_size(),
            _ => self.record_size() + u64::from(count.saturating_sub(1)) * u64::from(stride),
        }
    }

    /// Decodes one argument record. `bytes` must hold at least `record_size()` bytes.
    pub fn decode_args(self, bytes: &[u8]) -> Option<IndirectArgs> {
        let size = self.record_size() as usize;
        let bytes = bytes.get(..size)?;
        match self {
            IndirectPatchKind::Dispatch => Some(IndirectArgs::Dispatch(
                bytemuck::pod_read_unaligned(bytes),
            )),
            IndirectPatchKind::Draw | IndirectPatchKind::DrawCount => {
                Some(IndirectArgs::Draw(bytemuck::pod_read_unaligned(bytes)))
            }
            IndirectPatchKind::DrawIndexed | IndirectPatchKind::DrawIndexedCount => Some(
                IndirectArgs::DrawIndexed(bytemuck::pod_read_unaligned(bytes)),
            ),
            IndirectPatchKind::NoPatch | IndirectPatchKind::DrawByteCount => None,
        }
    }

    /// Zeroed argument record of this kind's native shape.
    pub fn zeroed_args(self) -> Option<IndirectArgs> {
        match self {
            IndirectPatchKind::Dispatch => Some(IndirectArgs::Dispatch(Zeroable::zeroed())),
            IndirectPatchKind::Draw | IndirectPatchKind::DrawCount => {
                Some(IndirectArgs::Draw(Zeroable::zeroed()))
            }
            IndirectPatchKind::DrawIndexed | IndirectPatchKind::DrawIndexedCount => {
                Some(IndirectArgs::DrawIndexed(Zeroable::zeroed()))
            }
            IndirectPatchKind::NoPatch | IndirectPatchKind::DrawByteCount => None,
        }
    }
}

/// Host-readable copy of indirect data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReadbackAllocation {
    pub buffer: ResourceId,
    pub size: u64,
}

/// Everything needed to recover an indirect command's arguments after capture.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndirectPatch {
    pub kind: IndirectPatchKind,
    pub readback: Option<ReadbackAllocation>,
    pub count: u32,
    pub stride: u32,
    /// Byte-count draws only: the counter offset subtracted before dividing by the stride.
    pub vertex_offset: u32,
    /// Set when the command was recorded into a secondary command buffer, whose event ids shift
    /// once it is executed from a primary.
    pub command_buffer: Option<CommandBufferId>,
}

impl IndirectPatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kind == IndirectPatchKind::NoPatch || self.readback.is_none()
    }

    /// Where the copied count value lives inside the readback allocation.
    pub fn count_offset(&self) -> Option<u64> {
        let readback = self.readback?;
        self.kind.has_count_buffer().then(|| readback.size - 16)
    }
}

/// Aligns `value` up to `align`, which must be a power of two.
pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Readback allocation size for a snapshot: argument bytes aligned to 16, plus a 16-byte slot for
/// the count value when a counter buffer is copied too.
pub fn snapshot_size(kind: IndirectPatchKind, count: u32, stride: u32, has_counter: bool) -> u64 {
    let mut size = align_up(kind.data_size(count, stride), 16);
    if has_counter {
        size += 16;
    }
    size
}
