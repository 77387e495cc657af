//! Structured chunk log for GPU command captures.
//!
//! A capture is an ordered stream of self-describing chunks: a command-kind tag, the command's
//! arguments as named fields in declaration order, optional debug messages and an end-of-record
//! sentinel. The byte offset of a chunk in that stream is its identity during replay; the
//! [`DrawcallUseIndex`] maps offsets back to the events a chunk produced.
//!
//! This crate does not know what the chunk kinds mean. See the `gpucap` crate for the command
//! model built on top of it.

mod chunk;
mod format;
mod log;
mod reader;
mod uses;
mod writer;

pub use chunk::{
    find_field, Chunk, ChunkFlags, ChunkKind, DebugMessage, Field, FieldValue, MessageCategory,
    MessageSeverity, MessageSource,
};
pub use format::{
    LogHeader, CHUNK_HEADER_SIZE, CHUNK_SENTINEL, FORMAT_VERSION, LOG_HEADER_SIZE, LOG_MAGIC,
    MAX_NESTING_DEPTH,
};
pub use log::ChunkLog;
pub use reader::{read_log_from_slice, ChunkReadError, ChunkReader};
pub use uses::{DrawcallUse, DrawcallUseIndex};
pub use writer::{write_log_to_vec, ChunkWriteError, ChunkWriter};
