//! Capture-side recording of one command buffer.

use std::sync::Arc;

use gpucap_chunklog::{Chunk, DebugMessage, MessageCategory, MessageSeverity, MessageSource};
use tracing::{debug, warn};

use crate::capture::CaptureError;
use crate::command::{Command, CommandCategory, CommandKind, DecodeError, ScopeRequirement};
use crate::context::{
    vertex_bindings_fit, CommandBufferContext, CommandBufferLevel, CommandBufferUsage,
};
use crate::device::{CommandTarget, Device, DeviceError, DeviceOp};
use crate::ids::CommandBufferId;
use crate::indirect::IndirectPatch;
use crate::snapshot::{fetch_indirect_data, flush_deferred_copies};

/// A finished command buffer: its chunks in recording order and, parallel to them, the indirect
/// snapshot taken for each chunk (if any).
#[derive(Clone, Debug)]
pub struct RecordedCommandBuffer {
    pub id: CommandBufferId,
    pub level: CommandBufferLevel,
    pub usage: CommandBufferUsage,
    pub chunks: Vec<Chunk>,
    pub patches: Vec<Option<IndirectPatch>>,
}

/// Records one command buffer. Each recorder is owned by the thread recording that command
/// buffer; recorders never share state with each other until submission.
pub struct CommandRecorder<D: Device + ?Sized> {
    device: Arc<D>,
    ctx: CommandBufferContext,
    chunks: Vec<Chunk>,
    patches: Vec<Option<IndirectPatch>>,
}

impl<D: Device + ?Sized> CommandRecorder<D> {
    pub(crate) fn begin(
        device: Arc<D>,
        id: CommandBufferId,
        level: CommandBufferLevel,
        usage: CommandBufferUsage,
    ) -> Result<Self, CaptureError> {
        let mut recorder = Self {
            device,
            ctx: CommandBufferContext::new(id, level, usage),
            chunks: Vec::new(),
            patches: Vec::new(),
        };
        recorder.forward(Command::BeginCommandBuffer { level, usage })?;
        Ok(recorder)
    }

    pub fn id(&self) -> CommandBufferId {
        self.ctx.id
    }

    pub fn context(&self) -> &CommandBufferContext {
        &self.ctx
    }

    /// Executes `cmd` against the device and appends its chunk.
    pub fn record(&mut self, cmd: Command) -> Result<(), CaptureError> {
        match cmd.kind() {
            kind @ (CommandKind::BeginCommandBuffer
            | CommandKind::EndCommandBuffer
            | CommandKind::IndirectSubCommand) => Err(CaptureError::NotRecordable(kind)),
            _ => {
                if let Command::BindVertexBuffers {
                    first_binding,
                    buffers,
                    ..
                } = &cmd
                {
                    if !vertex_bindings_fit(*first_binding, buffers.len()) {
                        return Err(DecodeError::VertexBindingsOutOfRange {
                            first_binding: *first_binding,
                            count: buffers.len(),
                        }
                        .into());
                    }
                }
                self.forward(cmd)
            }
        }
    }

    /// Ends the command buffer, flushing any pending indirect snapshots.
    pub fn finish(mut self) -> Result<RecordedCommandBuffer, CaptureError> {
        self.forward(Command::EndCommandBuffer)?;
        debug!(
            cb = self.ctx.id.0,
            chunks = self.chunks.len(),
            "finished recording command buffer"
        );
        Ok(RecordedCommandBuffer {
            id: self.ctx.id,
            level: self.ctx.level,
            usage: self.ctx.usage,
            chunks: self.chunks,
            patches: self.patches,
        })
    }

    fn forward(&mut self, cmd: Command) -> Result<(), CaptureError> {
        let target = CommandTarget::Original(self.ctx.id);
        let desc = cmd.descriptor();
        let mut chunk = cmd.to_chunk(self.ctx.id);

        if desc.scope == ScopeRequirement::RenderPass
            && desc.category == CommandCategory::Action
            && !self.ctx.is_in_render_pass_scope()
        {
            warn!(cb = self.ctx.id.0, command = desc.name, "command recorded outside render pass");
            chunk.debug_messages.push(outside_render_pass_message(desc.name));
        }

        let patch = execute_command(&*self.device, &mut self.ctx, target, &cmd)?;
        self.chunks.push(chunk);
        self.patches.push(patch);
        Ok(())
    }
}

/// Runs one command against the device as the application recorded it: forwards it, snapshots
/// indirect arguments and keeps `ctx` in step. Capture and the initial replay pass share this.
pub(crate) fn execute_command<D: Device + ?Sized>(
    device: &D,
    ctx: &mut CommandBufferContext,
    target: CommandTarget,
    cmd: &Command,
) -> Result<Option<IndirectPatch>, DeviceError> {
    if cmd.kind() == CommandKind::EndCommandBuffer {
        flush_deferred_copies(device, ctx, target)?;
    }

    match cmd {
        Command::ExecuteCommands { secondaries } => {
            for &sec in secondaries {
                device.record(target, DeviceOp::Execute(CommandTarget::Original(sec)))?;
            }
        }
        _ => device.record(target, DeviceOp::Command(cmd))?,
    }

    let mut patch = None;
    if let Some(source) = cmd.indirect_source() {
        let mut p = fetch_indirect_data(device, ctx, target, cmd.descriptor().patch, source)?;
        if let Command::DrawIndirectByteCount {
            counter_vertex_offset,
            ..
        } = *cmd
        {
            p.vertex_offset = counter_vertex_offset;
        }
        patch = Some(p);
    }

    ctx.track_state(cmd);
    if cmd.kind() == CommandKind::EndRenderPass {
        flush_deferred_copies(device, ctx, target)?;
    }
    Ok(patch)
}

fn outside_render_pass_message(command: &str) -> DebugMessage {
    DebugMessage {
        category: MessageCategory::Execution,
        severity: MessageSeverity::High,
        source: MessageSource::IncorrectApiUse,
        description: format!(
            "{command} is happening outside of a render pass, or in a secondary command buffer \
             without RENDER_PASS_CONTINUE"
        ),
    }
}
