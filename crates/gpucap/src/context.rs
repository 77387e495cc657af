//! Per-command-buffer recording state.
//!
//! One [`CommandBufferContext`] exists per command buffer being recorded or replayed. It is owned
//! by whoever drives that command buffer and passed by reference down the call chain; nothing
//! about a command buffer's state lives in process-wide maps.

use bitflags::bitflags;
use serde::Serialize;

use crate::command::Command;
use crate::ids::{CommandBufferId, EventId, ResourceId};
use crate::snapshot::PendingCopy;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum CommandBufferLevel {
    #[default]
    Primary,
    Secondary,
}

impl CommandBufferLevel {
    pub fn to_raw(self) -> u32 {
        match self {
            CommandBufferLevel::Primary => 0,
            CommandBufferLevel::Secondary => 1,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(CommandBufferLevel::Primary),
            1 => Some(CommandBufferLevel::Secondary),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CommandBufferUsage: u32 {
        const ONE_TIME_SUBMIT = 1 << 0;
        /// A secondary command buffer that runs entirely inside its caller's render pass.
        const RENDER_PASS_CONTINUE = 1 << 1;
        const SIMULTANEOUS_USE = 1 << 2;
    }
}

impl Serialize for CommandBufferUsage {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(self.iter_names().map(|(name, _)| name))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderPassState {
    pub render_pass: ResourceId,
    pub color_attachments: Vec<ResourceId>,
    pub depth_attachment: Option<ResourceId>,
}

/// Vertex input binding slots a command buffer can address.
pub const MAX_VERTEX_BINDINGS: u32 = 32;

/// Whether `count` bindings starting at `first_binding` fit in the vertex input slots.
pub fn vertex_bindings_fit(first_binding: u32, count: usize) -> bool {
    u64::from(first_binding) + count as u64 <= u64::from(MAX_VERTEX_BINDINGS)
}

#[derive(Clone, Debug)]
pub struct CommandBufferContext {
    pub id: CommandBufferId,
    pub level: CommandBufferLevel,
    pub usage: CommandBufferUsage,
    pub render_pass: Option<RenderPassState>,
    pub vertex_buffers: Vec<ResourceId>,
    pub index_buffer: ResourceId,
    /// Events consumed so far in this command buffer, local to it. The next event is
    /// `cur_event_id + 1`.
    pub cur_event_id: EventId,
    /// Indirect-argument snapshots waiting for the end of the current render pass.
    pub(crate) deferred_copies: Vec<PendingCopy>,
}

impl CommandBufferContext {
    pub fn new(id: CommandBufferId, level: CommandBufferLevel, usage: CommandBufferUsage) -> Self {
        Self {
            id,
            level,
            usage,
            render_pass: None,
            vertex_buffers: Vec::new(),
            index_buffer: ResourceId::NULL,
            cur_event_id: 0,
            deferred_copies: Vec::new(),
        }
    }

    /// Whether render-pass-only commands are legal here.
    ///
    /// Secondary command buffers cannot see the render pass they will be executed in, so for them
    /// this is the recorded `RENDER_PASS_CONTINUE` flag rather than tracked state.
    pub fn is_in_render_pass_scope(&self) -> bool {
        match self.level {
            CommandBufferLevel::Primary => self.render_pass.is_some(),
            CommandBufferLevel::Secondary => {
                self.usage.contains(CommandBufferUsage::RENDER_PASS_CONTINUE)
            }
        }
    }

    /// Updates bound state after `cmd` has been recorded.
    pub fn track_state(&mut self, cmd: &Command) {
        match cmd {
            Command::BeginCommandBuffer { level, usage } => {
                *self = CommandBufferContext {
                    cur_event_id: self.cur_event_id,
                    ..CommandBufferContext::new(self.id, *level, *usage)
                };
            }
            Command::BeginRenderPass {
                render_pass,
                color_attachments,
                depth_attachment,
            } => {
                self.render_pass = Some(RenderPassState {
                    render_pass: *render_pass,
                    color_attachments: color_attachments.clone(),
                    depth_attachment: *depth_attachment,
                });
            }
            Command::EndRenderPass => self.render_pass = None,
            Command::BindVertexBuffers {
                first_binding,
                buffers,
                ..
            } => {
                if !vertex_bindings_fit(*first_binding, buffers.len()) {
                    return;
                }
                let first = *first_binding as usize;
                let end = first + buffers.len();
                if self.vertex_buffers.len() < end {
                    self.vertex_buffers.resize(end, ResourceId::NULL);
                }
                self.vertex_buffers[first..end].copy_from_slice(buffers);
            }
            Command::BindIndexBuffer { buffer, .. } => self.index_buffer = *buffer,
            _ => {}
        }
    }
}
