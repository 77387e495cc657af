//! The global event timeline.
//!
//! Command buffers are baked independently and appended here in submission order. Appending a
//! primary rebases its events onto the end of the timeline; secondaries only get events when a
//! primary executes them.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use gpucap_chunklog::{Chunk, ChunkKind, ChunkLog, DrawcallUse, DrawcallUseIndex};
use serde::Serialize;
use tracing::debug;

use crate::bake::{bake_section, BakeError, BakedSection, SecondaryExecution};
use crate::command::{Command, CommandKind};
use crate::context::{CommandBufferLevel, CommandBufferUsage};
use crate::device::Device;
use crate::ids::{CommandBufferId, EventId};
use crate::recorder::RecordedCommandBuffer;
use crate::tree::{DrawTree, DrawTreeNode, NodeId};
use crate::usage::ResourceUsageLedger;

/// One command buffer's run of chunks in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
    pub cb: CommandBufferId,
    pub level: CommandBufferLevel,
    pub usage: CommandBufferUsage,
    /// Events of a primary are `base_event + 1 ..= base_event + event_count`. Secondary sections
    /// own no events of their own.
    pub base_event: EventId,
    pub event_count: EventId,
    /// Chunk indices in the timeline's log, synthetic chunks included.
    pub chunks: Range<usize>,
    /// Secondaries executed from this section, each with the index of its own section.
    pub executions: Vec<(usize, SecondaryExecution)>,
}

impl SectionInfo {
    pub fn contains_event(&self, event: EventId) -> bool {
        self.level == CommandBufferLevel::Primary
            && event > self.base_event
            && event <= self.base_event + self.event_count
    }
}

/// The part of one command buffer a partial replay has to rerecord.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PartialReplayRange {
    pub first_event: EventId,
    pub last_event: EventId,
    pub cb: CommandBufferId,
    /// Offset from the command buffer's local event ids to global ones.
    pub base_event: EventId,
    pub section: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PartialRanges {
    pub primary: PartialReplayRange,
    /// Set when the target event lies inside a secondary executed by the primary.
    pub secondary: Option<PartialReplayRange>,
}

#[derive(Clone, Debug)]
pub struct Timeline {
    log: ChunkLog,
    tree: DrawTree,
    ledger: ResourceUsageLedger,
    uses: DrawcallUseIndex,
    sections: Vec<SectionInfo>,
    event_offsets: BTreeMap<EventId, u64>,
    secondaries: HashMap<CommandBufferId, (usize, RecordedCommandBuffer)>,
    baked_secondaries: HashMap<CommandBufferId, BakedSection>,
    last_event: EventId,
    scratch_size: u64,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            log: ChunkLog::new(),
            tree: DrawTree::new(),
            ledger: ResourceUsageLedger::new(),
            uses: DrawcallUseIndex::new(),
            sections: Vec::new(),
            event_offsets: BTreeMap::new(),
            secondaries: HashMap::new(),
            baked_secondaries: HashMap::new(),
            last_event: 0,
            scratch_size: 0,
        }
    }

    pub fn log(&self) -> &ChunkLog {
        &self.log
    }

    pub fn tree(&self) -> &DrawTree {
        &self.tree
    }

    pub fn ledger(&self) -> &ResourceUsageLedger {
        &self.ledger
    }

    pub fn uses(&self) -> &DrawcallUseIndex {
        &self.uses
    }

    pub fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    pub fn last_event(&self) -> EventId {
        self.last_event
    }

    /// Worst-case indirect scratch buffer size across every baked section.
    pub fn scratch_size(&self) -> u64 {
        self.scratch_size
    }

    /// Log offset of the chunk that produced `event`.
    pub fn event_offset(&self, event: EventId) -> Option<u64> {
        self.event_offsets.get(&event).copied()
    }

    pub fn drawcall(&self, event: EventId) -> Option<&DrawTreeNode> {
        self.tree.find_by_event(event).map(|id| self.tree.node(id))
    }

    /// Most recent section recorded for `cb`. Recording a command buffer again replaces what the
    /// device holds for it, so only this section can be resubmitted as recorded.
    pub fn latest_section(&self, cb: CommandBufferId) -> Option<usize> {
        self.sections.iter().rposition(|s| s.cb == cb)
    }

    pub fn has_secondary(&self, cb: CommandBufferId) -> bool {
        self.secondaries.contains_key(&cb)
    }

    pub fn baked_secondary(&self, cb: CommandBufferId) -> Option<&BakedSection> {
        self.baked_secondaries.get(&cb)
    }

    /// Appends a finished secondary command buffer. It is baked the first time a submitted
    /// primary executes it. Returns its section index.
    pub(crate) fn add_secondary(&mut self, mut rec: RecordedCommandBuffer) -> usize {
        let start = self.log.len();
        for chunk in &mut rec.chunks {
            let idx = self.log.append(chunk.clone());
            if let Some(appended) = self.log.get(idx) {
                chunk.offset = appended.offset;
            }
        }
        let section = self.sections.len();
        self.sections.push(SectionInfo {
            cb: rec.id,
            level: CommandBufferLevel::Secondary,
            usage: rec.usage,
            base_event: 0,
            event_count: 0,
            chunks: start..self.log.len(),
            executions: Vec::new(),
        });
        self.baked_secondaries.remove(&rec.id);
        debug!(cb = rec.id.0, section, "appended secondary command buffer");
        self.secondaries.insert(rec.id, (section, rec));
        section
    }

    /// Bakes a submitted primary command buffer onto the end of the timeline and returns its
    /// section index. Indirect snapshots taken while recording it must be readable.
    pub(crate) fn bake_primary<D: Device + ?Sized>(
        &mut self,
        device: &D,
        rec: RecordedCommandBuffer,
    ) -> Result<usize, BakeError> {
        let executed = executed_secondaries(&rec)?;
        for &sec in &executed {
            if self.baked_secondaries.contains_key(&sec) {
                continue;
            }
            let (section, recorded) = self
                .secondaries
                .get(&sec)
                .ok_or(BakeError::UnknownSecondary(sec))?;
            let section = *section;
            let mut chunks = Vec::with_capacity(recorded.chunks.len());
            let baked = bake_section(device, &mut chunks, recorded.clone(), &self.baked_secondaries)?;
            self.splice_section(section, chunks);
            self.scratch_size = self.scratch_size.max(baked.scratch_size);
            self.baked_secondaries.insert(sec, baked);
        }

        let (cb, usage) = (rec.id, rec.usage);
        let start = self.log.len();
        let baked = bake_section(device, &mut self.log, rec, &self.baked_secondaries)?;
        let base = self.last_event;

        self.tree.graft(NodeId::ROOT, &baked.tree, base);
        self.ledger.append_rebased(&baked.ledger, base);
        for u in &baked.uses {
            self.uses.push(DrawcallUse::new(u.offset, u.event_id + base));
        }
        self.event_offsets
            .extend(baked.event_offsets.iter().map(|&(e, o)| (e + base, o)));
        self.scratch_size = self.scratch_size.max(baked.scratch_size);

        let executions = baked
            .executions
            .iter()
            .map(|x| {
                let section = self.secondaries.get(&x.secondary).map_or(0, |(s, _)| *s);
                let global = SecondaryExecution {
                    parent_event: x.parent_event + base,
                    base_event: x.base_event + base,
                    ..*x
                };
                (section, global)
            })
            .collect();

        let section = self.sections.len();
        self.sections.push(SectionInfo {
            cb,
            level: CommandBufferLevel::Primary,
            usage,
            base_event: base,
            event_count: baked.event_count,
            chunks: start..self.log.len(),
            executions,
        });
        self.last_event += baked.event_count;
        debug!(
            cb = cb.0,
            section,
            base_event = base,
            events = baked.event_count,
            "baked primary command buffer"
        );
        Ok(section)
    }

    /// Swaps a secondary's recorded chunks for its baked ones, synthetic sub-commands included,
    /// and shifts the chunk ranges of the sections after it.
    fn splice_section(&mut self, section: usize, baked: Vec<Chunk>) {
        let Some(range) = self.sections.get(section).map(|s| s.chunks.clone()) else {
            return;
        };
        if baked.len() == range.len() {
            return;
        }
        let added = self.log.interleave_synthetic(range.clone(), baked);
        for info in &mut self.sections {
            if info.chunks.start >= range.end && info.chunks.start > range.start {
                info.chunks = info.chunks.start + added..info.chunks.end + added;
            }
        }
        if let Some(info) = self.sections.get_mut(section) {
            info.chunks = range.start..range.end + added;
        }
    }

    /// Ranges to rerecord for a replay of `first_event ..= last_event`, or `None` when no
    /// primary owns `last_event`.
    pub fn partial_ranges(&self, first_event: EventId, last_event: EventId) -> Option<PartialRanges> {
        let (idx, section) = self
            .sections
            .iter()
            .enumerate()
            .find(|(_, s)| s.contains_event(last_event))?;
        let primary = PartialReplayRange {
            first_event,
            last_event,
            cb: section.cb,
            base_event: section.base_event,
            section: idx,
        };
        let secondary = section
            .executions
            .iter()
            .find(|(_, x)| x.contains(last_event))
            .map(|&(sec_section, x)| PartialReplayRange {
                first_event,
                last_event,
                cb: x.secondary,
                base_event: x.base_event,
                section: sec_section,
            });
        Some(PartialRanges { primary, secondary })
    }
}

pub(crate) fn executed_secondaries(rec: &RecordedCommandBuffer) -> Result<Vec<CommandBufferId>, BakeError> {
    let tag = ChunkKind(CommandKind::ExecuteCommands.tag());
    let mut out = Vec::new();
    for chunk in rec.chunks.iter().filter(|c| c.kind == tag) {
        if let (_, Command::ExecuteCommands { secondaries }) = Command::from_chunk(chunk)? {
            out.extend(secondaries);
        }
    }
    Ok(out)
}
