use std::io::Cursor;
use std::sync::{Arc, Mutex};

use gpucap::command::Command;
use gpucap::device::BufferUsage;
use gpucap::indirect::{DrawIndirectArgs, IndirectArgs};
use gpucap::memory_device::RecordedOp;
use gpucap::{
    Capture, CommandBufferId, CommandBufferLevel, CommandBufferUsage, CommandTarget, Device,
    DrawFlags, DrawcallCallback, EventId, MemoryDevice, ReplayError, ReplayMode, Replayer,
    ResourceId,
};

const ARGS: ResourceId = ResourceId(100);
const COPY_DST: ResourceId = ResourceId(102);
const PRIMARY: CommandBufferId = CommandBufferId(1);
const SECONDARY: CommandBufferId = CommandBufferId(2);
const VERTEX_COUNTS: [u32; 4] = [3, 6, 9, 12];

fn args_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    for vertex_count in VERTEX_COUNTS {
        out.extend_from_slice(bytemuck::bytes_of(&DrawIndirectArgs {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }));
    }
    out
}

fn vertex_count(args: Option<IndirectArgs>) -> u32 {
    match args {
        Some(IndirectArgs::Draw(a)) => a.vertex_count,
        other => panic!("unexpected args {other:?}"),
    }
}

fn device_with_buffers() -> Arc<MemoryDevice> {
    let device = Arc::new(MemoryDevice::new());
    device.insert_buffer(ARGS, args_bytes());
    device.insert_buffer(COPY_DST, vec![0; 64]);
    device
}

fn begin_pass() -> Command {
    Command::BeginRenderPass {
        render_pass: ResourceId(50),
        color_attachments: vec![ResourceId(51)],
        depth_attachment: None,
    }
}

fn multi_draw() -> Command {
    Command::DrawIndirect {
        buffer: ARGS,
        offset: 0,
        count: 4,
        stride: 16,
    }
}

/// Events: 1 BeginRenderPass, 2 parent, 3..=6 sub-draws, 7 pop, 8 EndRenderPass, 9 copy.
fn capture_log() -> Vec<u8> {
    let capture = Capture::new(device_with_buffers());
    let mut rec = capture
        .begin_command_buffer(PRIMARY, CommandBufferLevel::Primary, CommandBufferUsage::empty())
        .unwrap();
    rec.record(begin_pass()).unwrap();
    rec.record(multi_draw()).unwrap();
    rec.record(Command::EndRenderPass).unwrap();
    rec.record(Command::CopyBuffer {
        src: ARGS,
        dst: COPY_DST,
        regions: vec![gpucap::command::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: 16,
        }],
    })
    .unwrap();
    capture.submit(vec![rec.finish().unwrap()]).unwrap();
    assert_eq!(capture.last_event(), 9);
    capture.write_log(Vec::new()).unwrap()
}

fn load(bytes: &[u8]) -> (Arc<MemoryDevice>, Replayer<MemoryDevice>) {
    let device = device_with_buffers();
    let replayer = Replayer::open(Arc::clone(&device), Cursor::new(bytes)).unwrap();
    device.clear_history();
    (device, replayer)
}

#[test]
fn initial_pass_rebuilds_the_capture_timeline() {
    let capture = Capture::new(device_with_buffers());
    let mut rec = capture
        .begin_command_buffer(PRIMARY, CommandBufferLevel::Primary, CommandBufferUsage::empty())
        .unwrap();
    rec.record(begin_pass()).unwrap();
    rec.record(Command::BindPipeline {
        pipeline: ResourceId(60),
        compute: false,
    })
    .unwrap();
    rec.record(Command::Draw {
        vertex_count: 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    })
    .unwrap();
    rec.record(Command::PushMarker {
        name: "shadows".into(),
    })
    .unwrap();
    rec.record(multi_draw()).unwrap();
    rec.record(Command::PopMarker).unwrap();
    rec.record(Command::EndRenderPass).unwrap();
    capture.submit(vec![rec.finish().unwrap()]).unwrap();
    let bytes = capture.write_log(Vec::new()).unwrap();

    let (_, replayer) = load(&bytes);
    let captured = capture.timeline();
    let replayed = replayer.timeline();
    assert_eq!(replayed.last_event(), captured.last_event());
    assert_eq!(replayed.tree().event_ids(), captured.tree().event_ids());
    let names = |t: &gpucap::Timeline| {
        t.tree()
            .walk()
            .into_iter()
            .map(|(depth, id)| (depth, t.tree().node(id).draw.name.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(names(replayed), names(&*captured));
    assert_eq!(replayed.uses().as_slice(), captured.uses().as_slice());
}

#[test]
fn full_replay_runs_every_sub_draw_from_the_original_buffer() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);

    let report = replayer.replay(ReplayMode::Full).unwrap();
    assert_eq!((report.first_event, report.last_event), (1, 9));
    assert_eq!(report.submitted, vec![CommandTarget::Rerecord(PRIMARY)]);
    assert_eq!(report.truncated_chunks, 0);

    let draws = device.executed_draws();
    assert_eq!(draws.len(), 4);
    assert!(draws.iter().all(|d| d.source == Some(ARGS)));
    assert_eq!(
        draws.iter().map(|d| vertex_count(d.args)).collect::<Vec<_>>(),
        VERTEX_COUNTS.to_vec()
    );
}

#[test]
fn prefix_replay_truncates_the_draw_count() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);

    // Second sub-draw: base is the parent (2), so 4 - 2 = 2 sub-draws.
    let report = replayer
        .replay(ReplayMode::Prefix { last_event: 4 })
        .unwrap();
    // EndRenderPass and the copy are left out; the pass is still closed.
    assert_eq!(report.truncated_chunks, 2);

    let stream = device.stream(CommandTarget::Rerecord(PRIMARY));
    assert!(stream.contains(&RecordedOp::Command(Command::DrawIndirect {
        buffer: ARGS,
        offset: 0,
        count: 2,
        stride: 16,
    })));
    assert_eq!(
        stream.last(),
        Some(&RecordedOp::Command(Command::EndCommandBuffer))
    );
    assert_eq!(
        stream[stream.len() - 2],
        RecordedOp::Command(Command::EndRenderPass)
    );

    let draws = device.executed_draws();
    assert_eq!(
        draws.iter().map(|d| vertex_count(d.args)).collect::<Vec<_>>(),
        vec![3, 6]
    );
    assert!(draws.iter().all(|d| d.source == Some(ARGS)));
    assert!(device
        .ops()
        .iter()
        .all(|(target, _)| *target != CommandTarget::Scratch));
}

#[test]
fn prefix_ending_on_the_parent_draws_nothing() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);
    replayer
        .replay(ReplayMode::Prefix { last_event: 2 })
        .unwrap();
    assert!(device.executed_draws().is_empty());
}

#[test]
fn single_event_replay_goes_through_scratch() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);

    let report = replayer.replay(ReplayMode::Single { event: 5 }).unwrap();
    assert_eq!(report.submitted, vec![CommandTarget::Outside]);

    // drawIndex = 5 - 2 - 1 = 2, so three records of which only the last is live.
    let draws = device.executed_draws();
    assert_eq!(draws.len(), 3);
    assert!(draws.iter().all(|d| d.target == CommandTarget::Outside));
    let scratch = draws[0].source.unwrap();
    assert_ne!(scratch, ARGS);
    assert_eq!(
        draws.iter().map(|d| vertex_count(d.args)).collect::<Vec<_>>(),
        vec![0, 0, 9]
    );
    assert_eq!(draws[2].draw_index, 2);

    // The scratch buffer holds exactly drawIndex + 1 records and nothing else.
    let contents = device.read_buffer(scratch, 0, 48).unwrap();
    assert!(contents[..32].iter().all(|&b| b == 0));
    assert_eq!(&contents[32..], &args_bytes()[32..48]);

    // Render pass state leads up to the draw and is closed afterwards.
    let ops = device
        .ops()
        .into_iter()
        .filter(|(target, _)| *target == CommandTarget::Outside)
        .map(|(_, op)| op)
        .collect::<Vec<_>>();
    assert_eq!(ops.first(), Some(&RecordedOp::Command(begin_pass())));
    assert_eq!(ops.last(), Some(&RecordedOp::Command(Command::EndRenderPass)));
}

#[test]
fn scratch_is_prepared_with_ordered_barriers() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);
    replayer.replay(ReplayMode::Single { event: 4 }).unwrap();

    let prep: Vec<_> = device
        .ops()
        .into_iter()
        .filter(|(target, _)| *target == CommandTarget::Scratch)
        .map(|(_, op)| op)
        .collect();
    let shape: Vec<&str> = prep
        .iter()
        .map(|op| match op {
            RecordedOp::Barrier(_) => "barrier",
            RecordedOp::FillBuffer { .. } => "fill",
            RecordedOp::CopyBuffer { .. } => "copy",
            _ => "other",
        })
        .collect();
    assert_eq!(shape, ["barrier", "fill", "barrier", "copy", "barrier"]);
}

#[test]
fn single_event_on_a_plain_action() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);
    device.insert_buffer(COPY_DST, vec![0; 64]);

    replayer.replay(ReplayMode::Single { event: 9 }).unwrap();
    assert!(device.executed_draws().is_empty());
    assert_eq!(
        device.read_buffer(COPY_DST, 0, 16).unwrap(),
        args_bytes()[..16].to_vec()
    );
}

#[test]
fn events_outside_the_capture_are_rejected() {
    let bytes = capture_log();
    let (_, mut replayer) = load(&bytes);
    let err = replayer
        .replay(ReplayMode::Prefix { last_event: 10 })
        .unwrap_err();
    assert!(matches!(
        err,
        ReplayError::EventOutOfRange {
            event: 10,
            last: 9
        }
    ));
}

#[derive(Clone, Default)]
struct Hooks(Arc<Mutex<Vec<String>>>);

impl Hooks {
    fn push(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }
}

impl DrawcallCallback for Hooks {
    fn pre_draw(&mut self, event: EventId, _target: CommandTarget) {
        self.push(format!("pre_draw {event}"));
    }

    fn post_draw(&mut self, event: EventId, _target: CommandTarget) -> bool {
        self.push(format!("post_draw {event}"));
        false
    }

    fn pre_misc(&mut self, event: EventId, flags: DrawFlags, _target: CommandTarget) {
        self.push(format!("pre_misc {event} {:?}", flags.names()));
    }

    fn post_misc(&mut self, event: EventId, _flags: DrawFlags, _target: CommandTarget) -> bool {
        self.push(format!("post_misc {event}"));
        true
    }

    fn post_remisc(&mut self, event: EventId, _flags: DrawFlags, _target: CommandTarget) {
        self.push(format!("post_remisc {event}"));
    }
}

#[test]
fn callback_sees_every_sub_draw_alone() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);
    let hooks = Hooks::default();
    replayer.set_callback(Box::new(hooks.clone()));

    // The range ends inside the multi-draw, but every sub-draw is still replayed.
    replayer
        .replay(ReplayMode::Prefix { last_event: 4 })
        .unwrap();

    let lines = hooks.0.lock().unwrap().clone();
    assert_eq!(
        lines,
        [
            "pre_draw 3",
            "post_draw 3",
            "pre_draw 4",
            "post_draw 4",
            "pre_draw 5",
            "post_draw 5",
            "pre_draw 6",
            "post_draw 6",
        ]
    );

    // Draw i consumes i + 1 records; only record i is still live.
    let live: Vec<u32> = device
        .executed_draws()
        .iter()
        .map(|d| vertex_count(d.args))
        .filter(|&n| n != 0)
        .collect();
    assert_eq!(live, VERTEX_COUNTS.to_vec());
    assert_eq!(device.executed_draws().len(), 1 + 2 + 3 + 4);

    let stream = device.stream(CommandTarget::Rerecord(PRIMARY));
    assert!(stream.contains(&RecordedOp::BeginMarker("DrawIndirect".into())));
    assert!(stream.contains(&RecordedOp::EndMarker));
}

#[test]
fn post_hook_can_request_a_second_run() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);
    let hooks = Hooks::default();
    replayer.set_callback(Box::new(hooks.clone()));

    replayer.replay(ReplayMode::Full).unwrap();
    let lines = hooks.0.lock().unwrap().clone();
    assert_eq!(
        &lines[lines.len() - 3..],
        ["pre_misc 9 [\"COPY\"]", "post_misc 9", "post_remisc 9"]
    );
    let copies = device
        .stream(CommandTarget::Rerecord(PRIMARY))
        .into_iter()
        .filter(|op| matches!(op, RecordedOp::Command(Command::CopyBuffer { .. })))
        .count();
    assert_eq!(copies, 2);
    assert!(replayer.take_callback().is_some());
}

/// Secondary 2 holds the multi-draw; primary 1 runs it inside its render pass.
///
/// Events: 1 BeginRenderPass, 2 ExecuteCommands, 3 parent, 4..=7 sub-draws, 8 pop,
/// 9 ExecuteCommands pop, 10 EndRenderPass.
fn capture_secondary_log() -> Vec<u8> {
    let capture = Capture::new(device_with_buffers());
    let mut sec = capture
        .begin_command_buffer(
            SECONDARY,
            CommandBufferLevel::Secondary,
            CommandBufferUsage::RENDER_PASS_CONTINUE,
        )
        .unwrap();
    sec.record(multi_draw()).unwrap();
    capture.register_secondary(sec.finish().unwrap()).unwrap();

    let mut rec = capture
        .begin_command_buffer(PRIMARY, CommandBufferLevel::Primary, CommandBufferUsage::empty())
        .unwrap();
    rec.record(begin_pass()).unwrap();
    rec.record(Command::ExecuteCommands {
        secondaries: vec![SECONDARY],
    })
    .unwrap();
    rec.record(Command::EndRenderPass).unwrap();
    capture.submit(vec![rec.finish().unwrap()]).unwrap();
    assert_eq!(capture.last_event(), 10);
    capture.write_log(Vec::new()).unwrap()
}

#[test]
fn prefix_into_a_secondary_rerecords_both_levels() {
    let bytes = capture_secondary_log();
    let (device, mut replayer) = load(&bytes);

    let report = replayer
        .replay(ReplayMode::Prefix { last_event: 5 })
        .unwrap();
    assert_eq!(report.rerecorded, vec![SECONDARY, PRIMARY]);
    assert_eq!(report.submitted, vec![CommandTarget::Rerecord(PRIMARY)]);

    let primary = device.stream(CommandTarget::Rerecord(PRIMARY));
    assert!(primary.contains(&RecordedOp::Execute(CommandTarget::Rerecord(SECONDARY))));
    let secondary = device.stream(CommandTarget::Rerecord(SECONDARY));
    assert!(secondary.contains(&RecordedOp::Command(Command::DrawIndirect {
        buffer: ARGS,
        offset: 0,
        count: 2,
        stride: 16,
    })));

    let draws = device.executed_draws();
    assert_eq!(
        draws.iter().map(|d| vertex_count(d.args)).collect::<Vec<_>>(),
        vec![3, 6]
    );
}

#[test]
fn single_event_inside_a_secondary() {
    let bytes = capture_secondary_log();
    let (device, mut replayer) = load(&bytes);

    replayer.replay(ReplayMode::Single { event: 7 }).unwrap();
    let draws = device.executed_draws();
    assert_eq!(
        draws.iter().map(|d| vertex_count(d.args)).collect::<Vec<_>>(),
        vec![0, 0, 0, 12]
    );
    assert!(draws.iter().all(|d| d.source != Some(ARGS)));

    let outside: Vec<_> = device
        .ops()
        .into_iter()
        .filter(|(target, _)| *target == CommandTarget::Outside)
        .map(|(_, op)| op)
        .collect();
    assert_eq!(outside.first(), Some(&RecordedOp::Command(begin_pass())));
    assert_eq!(
        outside.last(),
        Some(&RecordedOp::Command(Command::EndRenderPass))
    );
}

#[test]
fn scratch_buffer_is_created_once() {
    let bytes = capture_log();
    let (device, mut replayer) = load(&bytes);
    replayer.replay(ReplayMode::Single { event: 4 }).unwrap();
    replayer.replay(ReplayMode::Single { event: 6 }).unwrap();

    let sources: Vec<_> = device
        .executed_draws()
        .iter()
        .filter_map(|d| d.source)
        .collect();
    assert!(sources.windows(2).all(|w| w[0] == w[1]));
    // A fresh buffer would get the next device id.
    let next = device.create_buffer(4, BufferUsage::Readback).unwrap();
    assert_eq!(next.0, sources[0].0 + 1);
}

#[test]
fn earlier_recording_of_a_resubmitted_buffer_is_replayed_in_full() {
    let capture = Capture::new(device_with_buffers());
    for vertex_count in [3, 7] {
        let mut rec = capture
            .begin_command_buffer(PRIMARY, CommandBufferLevel::Primary, CommandBufferUsage::empty())
            .unwrap();
        rec.record(begin_pass()).unwrap();
        rec.record(Command::Draw {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        })
        .unwrap();
        rec.record(Command::EndRenderPass).unwrap();
        capture.submit(vec![rec.finish().unwrap()]).unwrap();
    }
    let bytes = capture.write_log(Vec::new()).unwrap();
    let (device, mut replayer) = load(&bytes);

    // Events 1..=3 are the first recording, 4..=6 the second.
    let report = replayer
        .replay(ReplayMode::Prefix { last_event: 5 })
        .unwrap();
    assert_eq!(report.rerecorded, vec![PRIMARY, PRIMARY]);
    assert_eq!(
        report.submitted,
        vec![CommandTarget::Rerecord(PRIMARY), CommandTarget::Rerecord(PRIMARY)]
    );
    assert_eq!(report.truncated_chunks, 1);
    assert_eq!(
        device
            .executed_draws()
            .iter()
            .map(|d| vertex_count(d.args))
            .collect::<Vec<_>>(),
        vec![3, 7]
    );
}

/// Captures one indirect draw of `count` records `stride` bytes apart inside a render pass.
fn capture_indirect_log(count: u32, stride: u32) -> Vec<u8> {
    let capture = Capture::new(device_with_buffers());
    let mut rec = capture
        .begin_command_buffer(PRIMARY, CommandBufferLevel::Primary, CommandBufferUsage::empty())
        .unwrap();
    rec.record(begin_pass()).unwrap();
    rec.record(Command::DrawIndirect {
        buffer: ARGS,
        offset: 0,
        count,
        stride,
    })
    .unwrap();
    rec.record(Command::EndRenderPass).unwrap();
    capture.submit(vec![rec.finish().unwrap()]).unwrap();
    capture.write_log(Vec::new()).unwrap()
}

#[test]
fn prefix_ending_on_a_sub_command_skips_its_draw() {
    // Events: 1 BeginRenderPass, 2 sub-command, 3 draw, 4 EndRenderPass.
    let bytes = capture_indirect_log(1, 16);
    let (device, mut replayer) = load(&bytes);
    assert_eq!(replayer.timeline().last_event(), 4);

    let report = replayer
        .replay(ReplayMode::Prefix { last_event: 2 })
        .unwrap();
    assert!(device.executed_draws().is_empty());
    assert_eq!(report.truncated_chunks, 2);

    replayer
        .replay(ReplayMode::Prefix { last_event: 3 })
        .unwrap();
    let draws = device.executed_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(vertex_count(draws[0].args), VERTEX_COUNTS[0]);
}

#[test]
fn overlapping_records_overflow_the_scratch_buffer() {
    // Records 4 bytes apart overlap, so the capture reserves 16 + 2 * 4 bytes while rebuilding
    // the second sub-draw alone needs two whole records.
    let bytes = capture_indirect_log(2, 4);
    let (device, mut replayer) = load(&bytes);
    assert_eq!(replayer.timeline().scratch_size(), 24);

    // Events: 1 BeginRenderPass, 2 parent, 3..=4 sub-draws, 5 pop, 6 EndRenderPass.
    let err = replayer
        .replay(ReplayMode::Single { event: 4 })
        .unwrap_err();
    assert!(matches!(
        err,
        ReplayError::ScratchOverflow {
            needed: 32,
            capacity: 24
        }
    ));
    assert!(device.stream(CommandTarget::Scratch).is_empty());
    assert!(device.executed_draws().is_empty());
}
