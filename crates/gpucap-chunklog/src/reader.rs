use std::io::{self, Read, Seek, SeekFrom};

use crate::chunk::{
    Chunk, ChunkFlags, ChunkKind, DebugMessage, Field, FieldValue, MessageCategory,
    MessageSeverity, MessageSource,
};
use crate::format::{
    LogHeader, CHUNK_HEADER_SIZE, CHUNK_SENTINEL, FORMAT_VERSION, LOG_HEADER_SIZE, LOG_MAGIC,
    MAX_NESTING_DEPTH, TAG_ARRAY, TAG_BOOL, TAG_BYTES, TAG_F32, TAG_I32, TAG_NULL, TAG_RESOURCE,
    TAG_STR, TAG_STRUCT, TAG_U32, TAG_U64,
};
use crate::log::ChunkLog;

#[derive(Debug, thiserror::Error)]
pub enum ChunkReadError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid log magic")]
    InvalidMagic,
    #[error("unsupported header size {0}")]
    UnsupportedHeaderSize(u32),
    #[error("unsupported log format version {0}")]
    UnsupportedVersion(u32),
    #[error("chunk at offset {offset} extends past the end of the log")]
    RecordOutOfBounds { offset: u64 },
    #[error("chunk at offset {offset} is malformed: {reason}")]
    Malformed { offset: u64, reason: &'static str },
    #[error("chunk at offset {offset} has a bad end-of-record sentinel {found:#010x}")]
    BadSentinel { offset: u64, found: u32 },
    #[error("chunk at offset {offset} is flagged synthetic")]
    SyntheticOnDisk { offset: u64 },
}

/// Reads a chunk log from a seekable source.
pub struct ChunkReader<R> {
    reader: R,
    pub header: LogHeader,
    file_len: u64,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn open(mut reader: R) -> Result<Self, ChunkReadError> {
        // Payload lengths are untrusted; knowing the file length lets every allocation be checked
        // against it first.
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let header = read_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            file_len,
        })
    }

    /// Reads the chunk starting at `offset`.
    pub fn read_chunk_at(&mut self, offset: u64) -> Result<Chunk, ChunkReadError> {
        if offset < LOG_HEADER_SIZE as u64 || offset >= self.file_len {
            return Err(ChunkReadError::RecordOutOfBounds { offset });
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        read_chunk(&mut self.reader, offset, self.file_len)
    }

    /// Reads every chunk from the first one to the end of the stream.
    pub fn read_log(&mut self) -> Result<ChunkLog, ChunkReadError> {
        let mut log = ChunkLog::new();
        let mut offset = LOG_HEADER_SIZE as u64;
        self.reader.seek(SeekFrom::Start(offset))?;
        while offset < self.file_len {
            let chunk = read_chunk(&mut self.reader, offset, self.file_len)?;
            offset += chunk.encoded_len();
            log.append_at_offset(chunk);
        }
        Ok(log)
    }
}

/// Parses a complete in-memory log.
pub fn read_log_from_slice(bytes: &[u8]) -> Result<ChunkLog, ChunkReadError> {
    ChunkReader::open(io::Cursor::new(bytes))?.read_log()
}

fn read_header<R: Read>(reader: &mut R) -> Result<LogHeader, ChunkReadError> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if magic != LOG_MAGIC {
        return Err(ChunkReadError::InvalidMagic);
    }

    let header_size = read_u32(reader)?;
    if header_size != LOG_HEADER_SIZE {
        return Err(ChunkReadError::UnsupportedHeaderSize(header_size));
    }
    let version = read_u32(reader)?;
    if version == 0 || version > FORMAT_VERSION {
        return Err(ChunkReadError::UnsupportedVersion(version));
    }
    let flags = read_u32(reader)?;
    let _reserved = read_u32(reader)?;

    Ok(LogHeader { version, flags })
}

fn read_chunk<R: Read>(reader: &mut R, offset: u64, end: u64) -> Result<Chunk, ChunkReadError> {
    let header_end = offset
        .checked_add(CHUNK_HEADER_SIZE as u64)
        .ok_or(ChunkReadError::RecordOutOfBounds { offset })?;
    if header_end > end {
        return Err(ChunkReadError::RecordOutOfBounds { offset });
    }

    let kind = read_u16(reader)?;
    let flags = ChunkFlags::from_bits_retain(read_u16(reader)?);
    let payload_len = read_u32(reader)? as u64;
    if flags.contains(ChunkFlags::SYNTHETIC) {
        return Err(ChunkReadError::SyntheticOnDisk { offset });
    }

    let payload_end = header_end
        .checked_add(payload_len)
        .ok_or(ChunkReadError::RecordOutOfBounds { offset })?;
    if payload_end > end {
        return Err(ChunkReadError::RecordOutOfBounds { offset });
    }

    let payload_len_usize =
        usize::try_from(payload_len).map_err(|_| ChunkReadError::RecordOutOfBounds { offset })?;
    let mut payload = vec![0u8; payload_len_usize];
    reader.read_exact(&mut payload)?;

    let mut cursor = PayloadCursor {
        bytes: &payload,
        pos: 0,
        offset,
    };

    let field_count = cursor.read_count(3)?;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        fields.push(cursor.read_field(0)?);
    }

    let message_count = cursor.read_count(8)?;
    let mut debug_messages = Vec::with_capacity(message_count);
    for _ in 0..message_count {
        debug_messages.push(cursor.read_message()?);
    }

    let sentinel = cursor.read_u32()?;
    if sentinel != CHUNK_SENTINEL {
        return Err(ChunkReadError::BadSentinel {
            offset,
            found: sentinel,
        });
    }
    if cursor.remaining() != 0 {
        return Err(cursor.malformed("trailing bytes after sentinel"));
    }

    Ok(Chunk {
        kind: ChunkKind(kind),
        flags,
        offset,
        fields,
        debug_messages,
    })
}

struct PayloadCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> PayloadCursor<'a> {
    fn malformed(&self, reason: &'static str) -> ChunkReadError {
        ChunkReadError::Malformed {
            offset: self.offset,
            reason,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ChunkReadError> {
        if self.remaining() < n {
            return Err(self.malformed("truncated payload"));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ChunkReadError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ChunkReadError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ChunkReadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, ChunkReadError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads an element count, rejecting counts that could not possibly fit in what is left when
    /// every element takes at least `min_elem_size` bytes.
    fn read_count(&mut self, min_elem_size: usize) -> Result<usize, ChunkReadError> {
        let count = self.read_u32()? as usize;
        if count
            .checked_mul(min_elem_size)
            .map_or(true, |n| n > self.remaining())
        {
            return Err(self.malformed("element count exceeds payload"));
        }
        Ok(count)
    }

    fn read_string(&mut self) -> Result<String, ChunkReadError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.malformed("string is not utf-8"))
    }

    fn read_field(&mut self, depth: usize) -> Result<Field, ChunkReadError> {
        let name_len = self.read_u16()? as usize;
        let name = std::str::from_utf8(self.take(name_len)?)
            .map_err(|_| self.malformed("field name is not utf-8"))?
            .to_owned();
        let value = self.read_value(depth)?;
        Ok(Field { name, value })
    }

    fn read_value(&mut self, depth: usize) -> Result<FieldValue, ChunkReadError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(self.malformed("values nest too deeply"));
        }
        let tag = self.read_u8()?;
        let value = match tag {
            TAG_NULL => FieldValue::Null,
            TAG_BOOL => match self.read_u8()? {
                0 => FieldValue::Bool(false),
                1 => FieldValue::Bool(true),
                _ => return Err(self.malformed("bool out of range")),
            },
            TAG_U32 => FieldValue::U32(self.read_u32()?),
            TAG_I32 => FieldValue::I32(self.read_u32()? as i32),
            TAG_U64 => FieldValue::U64(self.read_u64()?),
            TAG_F32 => FieldValue::F32(f32::from_bits(self.read_u32()?)),
            TAG_RESOURCE => FieldValue::Resource(self.read_u64()?),
            TAG_STR => FieldValue::Str(self.read_string()?),
            TAG_BYTES => {
                let len = self.read_u32()? as usize;
                FieldValue::Bytes(self.take(len)?.to_vec())
            }
            TAG_ARRAY => {
                let count = self.read_count(1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                FieldValue::Array(items)
            }
            TAG_STRUCT => {
                let count = self.read_count(3)?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    fields.push(self.read_field(depth + 1)?);
                }
                FieldValue::Struct(fields)
            }
            _ => return Err(self.malformed("unknown value tag")),
        };
        Ok(value)
    }

    fn read_message(&mut self) -> Result<DebugMessage, ChunkReadError> {
        let category = MessageCategory::from_u8(self.read_u8()?)
            .ok_or_else(|| self.malformed("unknown message category"))?;
        let severity = MessageSeverity::from_u8(self.read_u8()?)
            .ok_or_else(|| self.malformed("unknown message severity"))?;
        let source = MessageSource::from_u8(self.read_u8()?)
            .ok_or_else(|| self.malformed("unknown message source"))?;
        let _reserved = self.read_u8()?;
        let description = self.read_string()?;
        Ok(DebugMessage {
            category,
            severity,
            source,
            description,
        })
    }
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, ChunkReadError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ChunkReadError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_log_to_vec;

    fn sample_log() -> ChunkLog {
        let mut log = ChunkLog::new();
        log.append(
            Chunk::new(ChunkKind(4))
                .with_field("commandBuffer", FieldValue::Resource(9))
                .with_field("vertexCount", FieldValue::U32(3)),
        );
        log.append(Chunk::new(ChunkKind(5)).with_field("depth", FieldValue::F32(0.5)));
        log
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = write_log_to_vec(&sample_log()).unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            read_log_from_slice(&bytes),
            Err(ChunkReadError::InvalidMagic)
        ));
    }

    #[test]
    fn rejects_future_version() {
        let mut bytes = write_log_to_vec(&sample_log()).unwrap();
        bytes[12..16].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            read_log_from_slice(&bytes),
            Err(ChunkReadError::UnsupportedVersion(v)) if v == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn rejects_corrupted_sentinel() {
        let log = sample_log();
        let mut bytes = write_log_to_vec(&log).unwrap();
        let first = log.get(0).unwrap();
        let sentinel_pos = (first.offset + first.encoded_len() - 4) as usize;
        bytes[sentinel_pos] ^= 0x01;
        assert!(matches!(
            read_log_from_slice(&bytes),
            Err(ChunkReadError::BadSentinel { offset, .. }) if offset == first.offset
        ));
    }

    #[test]
    fn rejects_truncated_chunk() {
        let bytes = write_log_to_vec(&sample_log()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(
            read_log_from_slice(cut),
            Err(ChunkReadError::RecordOutOfBounds { .. })
        ));
    }

    #[test]
    fn seeks_to_a_single_chunk() {
        let log = sample_log();
        let bytes = write_log_to_vec(&log).unwrap();
        let mut reader = ChunkReader::open(io::Cursor::new(bytes)).unwrap();
        let second = log.get(1).unwrap();
        let chunk = reader.read_chunk_at(second.offset).unwrap();
        assert_eq!(&chunk, second);
        assert!(reader.read_chunk_at(3).is_err());
    }
}
