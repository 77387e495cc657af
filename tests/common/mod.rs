#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use gpucap::command::Command;
use gpucap::indirect::{DrawIndirectArgs, IndirectArgs};
use gpucap::{
    Capture, CommandBufferId, CommandBufferLevel, CommandBufferUsage, CommandTarget,
    DrawcallCallback, EventId, MemoryDevice, RecordedCommandBuffer, ResourceId,
};

/// Command buffers recorded by [`record_scene`], one per worker.
pub const WORKERS: u64 = 3;

/// Events each worker's command buffer consumes: BeginRenderPass, Draw, the multi-draw parent,
/// two sub-draws, the pop marker and EndRenderPass.
pub const EVENTS_PER_BUFFER: EventId = 7;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn cb(worker: u64) -> CommandBufferId {
    CommandBufferId(worker + 1)
}

pub fn args_buffer(worker: u64) -> ResourceId {
    ResourceId(200 + worker)
}

/// Vertex counts of worker `w`'s two indirect records.
pub fn indirect_counts(worker: u64) -> [u32; 2] {
    let base = (worker as u32 + 1) * 100;
    [base + 1, base + 2]
}

pub fn plain_count(worker: u64) -> u32 {
    (worker as u32 + 1) * 10
}

pub fn seeded_device() -> Arc<MemoryDevice> {
    let device = Arc::new(MemoryDevice::new());
    for worker in 0..WORKERS {
        let mut bytes = Vec::new();
        for vertex_count in indirect_counts(worker) {
            bytes.extend_from_slice(bytemuck::bytes_of(&DrawIndirectArgs {
                vertex_count,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }));
        }
        device.insert_buffer(args_buffer(worker), bytes);
    }
    device
}

/// Records every worker's command buffer on its own thread.
pub fn record_scene(capture: &Capture<MemoryDevice>) -> Vec<RecordedCommandBuffer> {
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| s.spawn(move || record_worker(capture, worker)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("recording thread panicked"))
            .collect()
    })
}

fn record_worker(capture: &Capture<MemoryDevice>, worker: u64) -> RecordedCommandBuffer {
    let mut rec = capture
        .begin_command_buffer(cb(worker), CommandBufferLevel::Primary, CommandBufferUsage::empty())
        .unwrap();
    rec.record(Command::BeginRenderPass {
        render_pass: ResourceId(50),
        color_attachments: vec![ResourceId(51)],
        depth_attachment: None,
    })
    .unwrap();
    rec.record(Command::Draw {
        vertex_count: plain_count(worker),
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    })
    .unwrap();
    rec.record(Command::DrawIndirect {
        buffer: args_buffer(worker),
        offset: 0,
        count: 2,
        stride: 16,
    })
    .unwrap();
    rec.record(Command::EndRenderPass).unwrap();
    rec.finish().unwrap()
}

pub fn vertex_count(args: Option<IndirectArgs>) -> u32 {
    match args {
        Some(IndirectArgs::Draw(a)) => a.vertex_count,
        other => panic!("unexpected args {other:?}"),
    }
}

/// Collects the events of every draw hook.
#[derive(Clone, Default)]
pub struct DrawLog(pub Arc<Mutex<Vec<(EventId, CommandTarget)>>>);

impl DrawcallCallback for DrawLog {
    fn pre_draw(&mut self, event: EventId, target: CommandTarget) {
        self.0.lock().unwrap().push((event, target));
    }
}
