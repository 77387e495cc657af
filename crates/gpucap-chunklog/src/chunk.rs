use bitflags::bitflags;

use crate::format::CHUNK_HEADER_SIZE;

/// Command-kind tag. The log itself does not interpret it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKind(pub u16);

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChunkFlags: u16 {
        /// Inserted by the event builder, with no real command behind it. Never written to disk.
        const SYNTHETIC = 1 << 0;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    U32(u32),
    I32(i32),
    U64(u64),
    F32(f32),
    Resource(u64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
    Struct(Vec<Field>),
}

impl FieldValue {
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            FieldValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            FieldValue::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            FieldValue::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<u64> {
        match *self {
            FieldValue::Resource(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Field]> {
        match self {
            FieldValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    /// Encoded size of this value, tag byte included.
    pub fn encoded_len(&self) -> u64 {
        1 + match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::U32(_) | FieldValue::I32(_) | FieldValue::F32(_) => 4,
            FieldValue::U64(_) | FieldValue::Resource(_) => 8,
            FieldValue::Str(s) => 4 + s.len() as u64,
            FieldValue::Bytes(b) => 4 + b.len() as u64,
            FieldValue::Array(items) => 4 + items.iter().map(FieldValue::encoded_len).sum::<u64>(),
            FieldValue::Struct(fields) => 4 + fields.iter().map(Field::encoded_len).sum::<u64>(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn encoded_len(&self) -> u64 {
        2 + self.name.len() as u64 + self.value.encoded_len()
    }
}

/// Looks up a field by name in a struct body.
pub fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a FieldValue> {
    fields.iter().find(|f| f.name == name).map(|f| &f.value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageCategory {
    Miscellaneous = 0,
    Execution = 1,
    StateCreation = 2,
    Resource = 3,
}

impl MessageCategory {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Miscellaneous),
            1 => Some(Self::Execution),
            2 => Some(Self::StateCreation),
            3 => Some(Self::Resource),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageSeverity {
    High = 0,
    Medium = 1,
    Low = 2,
    Info = 3,
}

impl MessageSeverity {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::High),
            1 => Some(Self::Medium),
            2 => Some(Self::Low),
            3 => Some(Self::Info),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageSource {
    Api = 0,
    IncorrectApiUse = 1,
    RuntimeWarning = 2,
}

impl MessageSource {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Api),
            1 => Some(Self::IncorrectApiUse),
            2 => Some(Self::RuntimeWarning),
            _ => None,
        }
    }
}

/// Diagnostic attached to the chunk of the command that triggered it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugMessage {
    pub category: MessageCategory,
    pub severity: MessageSeverity,
    pub source: MessageSource,
    pub description: String,
}

impl DebugMessage {
    pub fn encoded_len(&self) -> u64 {
        4 + 4 + self.description.len() as u64
    }
}

/// One record of the chunk log.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub flags: ChunkFlags,
    /// Byte position of the record in the serialized log. Synthetic chunks carry the offset of
    /// the real chunk they were expanded from.
    pub offset: u64,
    pub fields: Vec<Field>,
    pub debug_messages: Vec<DebugMessage>,
}

impl Chunk {
    pub fn new(kind: ChunkKind) -> Self {
        Self {
            kind,
            flags: ChunkFlags::empty(),
            offset: 0,
            fields: Vec::new(),
            debug_messages: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.push_field(name, value);
        self
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push(Field::new(name, value));
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        find_field(&self.fields, name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .map(|f| &mut f.value)
    }

    pub fn is_synthetic(&self) -> bool {
        self.flags.contains(ChunkFlags::SYNTHETIC)
    }

    pub fn payload_len(&self) -> u64 {
        4 + self.fields.iter().map(Field::encoded_len).sum::<u64>()
            + 4
            + self
                .debug_messages
                .iter()
                .map(DebugMessage::encoded_len)
                .sum::<u64>()
            + 4
    }

    /// Total bytes this chunk occupies in the serialized log.
    pub fn encoded_len(&self) -> u64 {
        CHUNK_HEADER_SIZE as u64 + self.payload_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_len_counts_every_sub_record() {
        let mut chunk = Chunk::new(ChunkKind(7))
            .with_field("a", FieldValue::U32(1))
            .with_field(
                "s",
                FieldValue::Struct(vec![Field::new("x", FieldValue::U64(2))]),
            );
        // header 8, field count 4, "a": 2+1+1+4, "s": 2+1+1+4 + ("x": 2+1+1+8), msg count 4,
        // sentinel 4.
        assert_eq!(chunk.encoded_len(), 8 + 4 + 8 + 8 + 12 + 4 + 4);

        chunk.debug_messages.push(DebugMessage {
            category: MessageCategory::Execution,
            severity: MessageSeverity::High,
            source: MessageSource::IncorrectApiUse,
            description: "abc".into(),
        });
        assert_eq!(chunk.encoded_len(), 8 + 4 + 8 + 8 + 12 + 4 + 4 + 11);
    }

    #[test]
    fn field_lookup_by_name() {
        let mut chunk = Chunk::new(ChunkKind(1)).with_field("count", FieldValue::U32(3));
        assert_eq!(chunk.field("count").and_then(FieldValue::as_u32), Some(3));
        assert!(chunk.field("missing").is_none());

        *chunk.field_mut("count").unwrap() = FieldValue::U32(9);
        assert_eq!(chunk.field("count").and_then(FieldValue::as_u32), Some(9));
    }
}
