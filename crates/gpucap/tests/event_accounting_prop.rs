use std::sync::Arc;

use gpucap::command::Command;
use gpucap::indirect::DrawIndirectArgs;
use gpucap::{
    Capture, CommandBufferId, CommandBufferLevel, CommandBufferUsage, DrawFlags, MemoryDevice,
    ReplayMode, Replayer, ResourceId,
};
use proptest::prelude::*;

const ARGS: ResourceId = ResourceId(100);

fn args(count: u32) -> Vec<u8> {
    (0..count.max(1))
        .flat_map(|i| {
            bytemuck::bytes_of(&DrawIndirectArgs {
                vertex_count: i + 1,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            })
            .to_vec()
        })
        .collect()
}

fn device(count: u32) -> Arc<MemoryDevice> {
    let device = Arc::new(MemoryDevice::new());
    device.insert_buffer(ARGS, args(count));
    device
}

fn capture(count: u32, plain_draws: u32) -> Capture<MemoryDevice> {
    let capture = Capture::new(device(count));
    let mut rec = capture
        .begin_command_buffer(
            CommandBufferId(1),
            CommandBufferLevel::Primary,
            CommandBufferUsage::empty(),
        )
        .unwrap();
    rec.record(Command::BeginRenderPass {
        render_pass: ResourceId(50),
        color_attachments: Vec::new(),
        depth_attachment: None,
    })
    .unwrap();
    for _ in 0..plain_draws {
        rec.record(Command::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        })
        .unwrap();
    }
    rec.record(Command::DrawIndirect {
        buffer: ARGS,
        offset: 0,
        count,
        stride: 16,
    })
    .unwrap();
    rec.record(Command::EndRenderPass).unwrap();
    capture.submit(vec![rec.finish().unwrap()]).unwrap();
    capture
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn indirect_draws_consume_the_expected_events(count in 0u32..12, plain_draws in 0u32..4) {
        let capture = capture(count, plain_draws);
        let timeline = capture.timeline();
        let span = match count {
            0 => 1,
            1 => 2,
            n => n + 2,
        };
        prop_assert_eq!(timeline.last_event(), 2 + plain_draws + span);

        // A single indirect draw's node follows the event of its sub-command.
        let node_event = plain_draws + if count == 1 { 3 } else { 2 };
        let parent = timeline.drawcall(node_event).unwrap();
        if count > 1 {
            prop_assert!(parent.draw.flags.contains(DrawFlags::MULTI_DRAW));
            prop_assert_eq!(parent.children.len() as u32, count);
        } else {
            prop_assert!(parent.children.is_empty());
        }
        let synthetic = timeline.log().iter().filter(|c| c.is_synthetic()).count() as u32;
        prop_assert_eq!(synthetic, count);
    }

    #[test]
    fn prefix_replay_draws_up_to_the_target(count in 2u32..10, plain_draws in 0u32..3, pick in 0u32..10) {
        let capture = capture(count, plain_draws);
        let bytes = capture.write_log(Vec::new()).unwrap();
        let replay_device = device(count);
        let mut replayer = Replayer::load(
            Arc::clone(&replay_device),
            &gpucap_chunklog::read_log_from_slice(&bytes).unwrap(),
        )
        .unwrap();
        replay_device.clear_history();

        let parent = plain_draws + 2;
        let target = parent + 1 + pick % count;
        replayer.replay(ReplayMode::Prefix { last_event: target }).unwrap();

        let indirect: Vec<_> = replay_device
            .executed_draws()
            .into_iter()
            .filter(|d| d.source == Some(ARGS))
            .collect();
        prop_assert_eq!(indirect.len() as u32, target - parent);
    }
}
