use std::io::{self, Write};

use crate::chunk::{Chunk, DebugMessage, Field, FieldValue};
use crate::format::{
    LogHeader, CHUNK_SENTINEL, LOG_HEADER_SIZE, LOG_MAGIC, MAX_NESTING_DEPTH, TAG_ARRAY, TAG_BOOL,
    TAG_BYTES, TAG_F32, TAG_I32, TAG_NULL, TAG_RESOURCE, TAG_STR, TAG_STRUCT, TAG_U32, TAG_U64,
};
use crate::log::ChunkLog;

#[derive(Debug, thiserror::Error)]
pub enum ChunkWriteError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("field name `{0}` is longer than 65535 bytes")]
    NameTooLong(String),
    #[error("value does not fit the u32 length prefix")]
    TooLarge,
    #[error("values nest deeper than {MAX_NESTING_DEPTH} levels")]
    TooDeep,
    #[error("synthetic chunks are never serialized")]
    Synthetic,
    #[error("chunk was expected at offset {expected} but the writer is at {actual}")]
    OffsetMismatch { expected: u64, actual: u64 },
}

/// Streams chunks into a log file.
pub struct ChunkWriter<W> {
    writer: W,
    pos: u64,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(mut writer: W, header: LogHeader) -> Result<Self, ChunkWriteError> {
        writer.write_all(&LOG_MAGIC)?;
        writer.write_all(&LOG_HEADER_SIZE.to_le_bytes())?;
        writer.write_all(&header.version.to_le_bytes())?;
        writer.write_all(&header.flags.to_le_bytes())?;
        writer.write_all(&0u32.to_le_bytes())?;
        Ok(Self {
            writer,
            pos: LOG_HEADER_SIZE as u64,
        })
    }

    /// Offset the next chunk will be written at.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<u64, ChunkWriteError> {
        if chunk.is_synthetic() {
            return Err(ChunkWriteError::Synthetic);
        }
        let payload = encode_payload(chunk)?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| ChunkWriteError::TooLarge)?;

        let offset = self.pos;
        self.writer.write_all(&chunk.kind.0.to_le_bytes())?;
        self.writer.write_all(&chunk.flags.bits().to_le_bytes())?;
        self.writer.write_all(&payload_len.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.pos += 8 + payload.len() as u64;
        Ok(offset)
    }

    /// Writes every real chunk of `log`, checking that each lands on the offset the log assigned.
    pub fn write_log(&mut self, log: &ChunkLog) -> Result<(), ChunkWriteError> {
        for chunk in log.real_chunks() {
            if chunk.offset != self.pos {
                return Err(ChunkWriteError::OffsetMismatch {
                    expected: chunk.offset,
                    actual: self.pos,
                });
            }
            self.write_chunk(chunk)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, ChunkWriteError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Serializes a whole log into memory.
pub fn write_log_to_vec(log: &ChunkLog) -> Result<Vec<u8>, ChunkWriteError> {
    let mut writer = ChunkWriter::new(Vec::new(), LogHeader::default())?;
    writer.write_log(log)?;
    writer.finish()
}

pub(crate) fn encode_payload(chunk: &Chunk) -> Result<Vec<u8>, ChunkWriteError> {
    let mut out = Vec::with_capacity(chunk.payload_len() as usize);
    push_len(&mut out, chunk.fields.len())?;
    for field in &chunk.fields {
        encode_field(&mut out, field, 0)?;
    }
    push_len(&mut out, chunk.debug_messages.len())?;
    for msg in &chunk.debug_messages {
        encode_message(&mut out, msg)?;
    }
    out.extend_from_slice(&CHUNK_SENTINEL.to_le_bytes());
    Ok(out)
}

fn encode_field(out: &mut Vec<u8>, field: &Field, depth: usize) -> Result<(), ChunkWriteError> {
    let name_len = u16::try_from(field.name.len())
        .map_err(|_| ChunkWriteError::NameTooLong(field.name.clone()))?;
    out.extend_from_slice(&name_len.to_le_bytes());
    out.extend_from_slice(field.name.as_bytes());
    encode_value(out, &field.value, depth)
}

fn encode_value(out: &mut Vec<u8>, value: &FieldValue, depth: usize) -> Result<(), ChunkWriteError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(ChunkWriteError::TooDeep);
    }
    match value {
        FieldValue::Null => out.push(TAG_NULL),
        FieldValue::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        FieldValue::U32(v) => {
            out.push(TAG_U32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldValue::I32(v) => {
            out.push(TAG_I32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldValue::U64(v) => {
            out.push(TAG_U64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldValue::F32(v) => {
            out.push(TAG_F32);
            out.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        FieldValue::Resource(v) => {
            out.push(TAG_RESOURCE);
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldValue::Str(s) => {
            out.push(TAG_STR);
            push_bytes(out, s.as_bytes())?;
        }
        FieldValue::Bytes(b) => {
            out.push(TAG_BYTES);
            push_bytes(out, b)?;
        }
        FieldValue::Array(items) => {
            out.push(TAG_ARRAY);
            push_len(out, items.len())?;
            for item in items {
                encode_value(out, item, depth + 1)?;
            }
        }
        FieldValue::Struct(fields) => {
            out.push(TAG_STRUCT);
            push_len(out, fields.len())?;
            for field in fields {
                encode_field(out, field, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn encode_message(out: &mut Vec<u8>, msg: &DebugMessage) -> Result<(), ChunkWriteError> {
    out.push(msg.category as u8);
    out.push(msg.severity as u8);
    out.push(msg.source as u8);
    out.push(0);
    push_bytes(out, msg.description.as_bytes())
}

fn push_len(out: &mut Vec<u8>, len: usize) -> Result<(), ChunkWriteError> {
    let len = u32::try_from(len).map_err(|_| ChunkWriteError::TooLarge)?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ChunkWriteError> {
    push_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}
