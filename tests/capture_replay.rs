mod common;

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use common::*;
use gpucap::{Capture, CommandTarget, ReplayMode, Replayer, Timeline};
use gpucap_chunklog::ChunkReader;

/// Submission order differs from the order the workers were spawned in.
const SUBMIT_ORDER: [u64; 3] = [2, 0, 1];

fn captured() -> Capture<gpucap::MemoryDevice> {
    init_tracing();
    let capture = Capture::new(seeded_device());
    let mut recorded = record_scene(&capture);
    recorded.sort_by_key(|rec| SUBMIT_ORDER.iter().position(|&w| cb(w) == rec.id));
    capture.submit(recorded).unwrap();
    capture
}

fn tree_names(timeline: &Timeline) -> Vec<(usize, String)> {
    let tree = timeline.tree();
    tree.walk()
        .into_iter()
        .map(|(depth, id)| (depth, tree.node(id).draw.name.clone()))
        .collect()
}

#[test]
fn submission_order_numbers_the_events() {
    let capture = captured();
    let timeline = capture.timeline();
    assert_eq!(timeline.last_event(), WORKERS as u32 * EVENTS_PER_BUFFER);

    for (i, &worker) in SUBMIT_ORDER.iter().enumerate() {
        let section = &timeline.sections()[i];
        let base = i as u32 * EVENTS_PER_BUFFER;
        assert_eq!(section.cb, cb(worker));
        assert_eq!(section.base_event, base);
        assert_eq!(section.event_count, EVENTS_PER_BUFFER);

        let parent = timeline.drawcall(base + 3).unwrap();
        assert_eq!(parent.draw.name, "DrawIndirect(2)");
        assert_eq!(parent.children.len(), 2);
        let [first, second] = indirect_counts(worker);
        assert_eq!(
            timeline.drawcall(base + 4).unwrap().draw.name,
            format!("DrawIndirect[0](<{first}, 1>)")
        );
        assert_eq!(
            timeline.drawcall(base + 5).unwrap().draw.name,
            format!("DrawIndirect[1](<{second}, 1>)")
        );
    }
}

#[test]
fn capture_file_reloads_to_the_same_timeline() {
    let capture = captured();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.gpucap");
    capture.write_log(File::create(&path).unwrap()).unwrap();

    let log = ChunkReader::open(BufReader::new(File::open(&path).unwrap()))
        .unwrap()
        .read_log()
        .unwrap();
    assert_eq!(log.len(), capture.timeline().log().real_chunks().count());

    let replayer = Replayer::load(seeded_device(), &log).unwrap();
    let replayed = replayer.timeline();
    let original = capture.timeline();
    assert_eq!(replayed.last_event(), original.last_event());
    assert_eq!(replayed.tree().event_ids(), original.tree().event_ids());
    assert_eq!(tree_names(replayed), tree_names(&original));
    assert_eq!(replayed.uses().as_slice(), original.uses().as_slice());
    assert_eq!(
        replayed.ledger().resources().collect::<Vec<_>>(),
        original.ledger().resources().collect::<Vec<_>>()
    );
}

#[test]
fn prefix_replay_spans_earlier_submissions() {
    let capture = captured();
    let bytes = capture.write_log(Vec::new()).unwrap();
    let device = seeded_device();
    let mut replayer = Replayer::open(Arc::clone(&device), std::io::Cursor::new(bytes)).unwrap();
    device.clear_history();

    // First sub-draw of the second submission.
    let report = replayer
        .replay(ReplayMode::Prefix {
            last_event: EVENTS_PER_BUFFER + 4,
        })
        .unwrap();
    assert_eq!(
        report.submitted,
        vec![
            CommandTarget::Original(cb(SUBMIT_ORDER[0])),
            CommandTarget::Rerecord(cb(SUBMIT_ORDER[1])),
        ]
    );
    assert_eq!(report.rerecorded, vec![cb(SUBMIT_ORDER[1])]);
    assert_eq!(report.truncated_chunks, 1);

    let first = SUBMIT_ORDER[0];
    let second = SUBMIT_ORDER[1];
    let counts: Vec<u32> = device
        .executed_draws()
        .iter()
        .map(|d| vertex_count(d.args))
        .collect();
    assert_eq!(
        counts,
        vec![
            plain_count(first),
            indirect_counts(first)[0],
            indirect_counts(first)[1],
            plain_count(second),
            indirect_counts(second)[0],
        ]
    );
}

#[test]
fn hooks_fire_only_inside_the_rerecorded_buffer() {
    let capture = captured();
    let bytes = capture.write_log(Vec::new()).unwrap();
    let mut replayer = Replayer::open(seeded_device(), std::io::Cursor::new(bytes)).unwrap();
    let log = DrawLog::default();
    replayer.set_callback(Box::new(log.clone()));

    replayer.replay(ReplayMode::Full).unwrap();
    let last = cb(SUBMIT_ORDER[2]);
    let base = 2 * EVENTS_PER_BUFFER;
    assert_eq!(
        log.0.lock().unwrap().clone(),
        vec![
            (base + 2, CommandTarget::Rerecord(last)),
            (base + 4, CommandTarget::Rerecord(last)),
            (base + 5, CommandTarget::Rerecord(last)),
        ]
    );
}

#[test]
fn single_event_replays_one_sub_draw_of_the_last_buffer() {
    let capture = captured();
    let bytes = capture.write_log(Vec::new()).unwrap();
    let device = seeded_device();
    let mut replayer = Replayer::open(Arc::clone(&device), std::io::Cursor::new(bytes)).unwrap();
    device.clear_history();

    let event = 2 * EVENTS_PER_BUFFER + 5;
    let report = replayer.replay(ReplayMode::Single { event }).unwrap();
    assert_eq!(report.submitted, vec![CommandTarget::Outside]);

    // Sub-draw 1 is rebuilt in scratch behind one zeroed record.
    let counts: Vec<u32> = device
        .executed_draws()
        .iter()
        .map(|d| vertex_count(d.args))
        .collect();
    assert_eq!(counts, vec![0, indirect_counts(SUBMIT_ORDER[2])[1]]);
}
