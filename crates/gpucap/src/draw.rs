use bitflags::bitflags;
use serde::Serialize;

use crate::ids::{EventId, ResourceId};

bitflags! {
    /// What kind of action a draw-tree node represents.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DrawFlags: u32 {
        const CLEAR = 1 << 0;
        const DRAWCALL = 1 << 1;
        const DISPATCH = 1 << 2;
        const COPY = 1 << 3;
        const RESOLVE = 1 << 4;
        const INDEXED = 1 << 5;
        const INSTANCED = 1 << 6;
        const INDIRECT = 1 << 7;
        const MULTI_DRAW = 1 << 8;
        const PUSH_MARKER = 1 << 9;
        const POP_MARKER = 1 << 10;
        const SET_MARKER = 1 << 11;
        const PASS_BOUNDARY = 1 << 12;
        const BEGIN_PASS = 1 << 13;
        const END_PASS = 1 << 14;
        const API_CALLS = 1 << 15;
        const CMD_LIST = 1 << 16;
        const CLEAR_COLOR = 1 << 17;
        const CLEAR_DEPTH_STENCIL = 1 << 18;
    }
}

impl DrawFlags {
    /// Flag names, for reports.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }

    /// Markers do not count as actions.
    pub fn is_marker(self) -> bool {
        self.intersects(
            DrawFlags::PUSH_MARKER
                | DrawFlags::POP_MARKER
                | DrawFlags::SET_MARKER
                | DrawFlags::MULTI_DRAW,
        )
    }
}

/// A chunk that produced an event. Non-action events attach to the next draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ApiEvent {
    pub event_id: EventId,
    /// Log offset of the chunk. Synthetic chunks report the offset of the chunk they expand.
    pub file_offset: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DrawcallDescription {
    pub event_id: EventId,
    pub name: String,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: DrawFlags,
    pub num_indices: u32,
    pub num_instances: u32,
    pub base_vertex: i32,
    pub index_offset: u32,
    pub vertex_offset: u32,
    pub instance_offset: u32,
    pub draw_index: u32,
    pub dispatch_dimension: [u32; 3],
    pub dispatch_base: [u32; 3],
    pub copy_source: ResourceId,
    pub copy_destination: ResourceId,
    pub events: Vec<ApiEvent>,
}

impl DrawcallDescription {
    pub fn new(name: impl Into<String>, flags: DrawFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            ..Self::default()
        }
    }
}

fn serialize_flags<S: serde::Serializer>(flags: &DrawFlags, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(flags.names())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_draw_parent_counts_as_marker() {
        assert!((DrawFlags::MULTI_DRAW | DrawFlags::PUSH_MARKER).is_marker());
        assert!(!(DrawFlags::DRAWCALL | DrawFlags::INDIRECT).is_marker());
        assert_eq!(
            (DrawFlags::DRAWCALL | DrawFlags::INDEXED).names(),
            vec!["DRAWCALL", "INDEXED"]
        );
    }
}
