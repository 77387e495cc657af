//! On-disk constants for the chunk log stream.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header   : magic[8] header_size:u32 version:u32 flags:u32 reserved:u32
//! chunk*   : kind:u16 chunk_flags:u16 payload_len:u32 payload[payload_len]
//! payload  : field_count:u32 field* message_count:u32 message* sentinel:u32
//! field    : name_len:u16 name[name_len] value
//! value    : tag:u8 data
//! message  : category:u8 severity:u8 source:u8 reserved:u8 str
//! str      : len:u32 bytes[len]
//! ```

pub const LOG_MAGIC: [u8; 8] = *b"GPUCAPLG";
pub const LOG_HEADER_SIZE: u32 = 24;
pub const FORMAT_VERSION: u32 = 1;

pub const CHUNK_HEADER_SIZE: u32 = 8;

/// Written after the last sub-record of every chunk payload.
pub const CHUNK_SENTINEL: u32 = 0x4B4E_4843;

/// Structs and arrays may nest at most this deep.
pub const MAX_NESTING_DEPTH: usize = 32;

pub(crate) const TAG_NULL: u8 = 0;
pub(crate) const TAG_BOOL: u8 = 1;
pub(crate) const TAG_U32: u8 = 2;
pub(crate) const TAG_I32: u8 = 3;
pub(crate) const TAG_U64: u8 = 4;
pub(crate) const TAG_F32: u8 = 5;
pub(crate) const TAG_RESOURCE: u8 = 6;
pub(crate) const TAG_STR: u8 = 7;
pub(crate) const TAG_BYTES: u8 = 8;
pub(crate) const TAG_ARRAY: u8 = 9;
pub(crate) const TAG_STRUCT: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogHeader {
    pub version: u32,
    pub flags: u32,
}

impl Default for LogHeader {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            flags: 0,
        }
    }
}
