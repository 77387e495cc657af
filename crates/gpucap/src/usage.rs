//! Resource usage ledger: which events touched which resources, and how.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ids::{EventId, ResourceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceUsage {
    Read,
    CompleteWrite,
    PartialWrite,
    VertexBuffer,
    IndexBuffer,
    ColorTarget,
    DepthStencilTarget,
    Indirect,
    Clear,
    /// Copy where source and destination are the same resource.
    Copy,
    CopySrc,
    CopyDst,
    /// Resolve or blit where source and destination are the same resource.
    Resolve,
    ResolveSrc,
    ResolveDst,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Subresource {
    pub mip: u32,
    pub slice: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EventUsage {
    pub event_id: EventId,
    pub usage: ResourceUsage,
    pub subresource: Option<Subresource>,
}

impl EventUsage {
    pub fn new(event_id: EventId, usage: ResourceUsage) -> Self {
        Self {
            event_id,
            usage,
            subresource: None,
        }
    }

    pub fn with_subresource(mut self, subresource: Option<Subresource>) -> Self {
        self.subresource = subresource;
        self
    }
}

/// One resource touch extracted from a command, before it has an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageTouch {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
    pub subresource: Option<Subresource>,
}

impl UsageTouch {
    pub fn new(resource: ResourceId, usage: ResourceUsage) -> Self {
        Self {
            resource,
            usage,
            subresource: None,
        }
    }

    pub fn at(mut self, subresource: Option<Subresource>) -> Self {
        self.subresource = subresource;
        self
    }

    pub fn for_event(self, event_id: EventId) -> (ResourceId, EventUsage) {
        (
            self.resource,
            EventUsage::new(event_id, self.usage).with_subresource(self.subresource),
        )
    }
}

/// Append-only map of resource to its usages in event order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceUsageLedger {
    usages: BTreeMap<ResourceId, Vec<EventUsage>>,
}

impl ResourceUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource: ResourceId, usage: EventUsage) {
        if resource.is_null() {
            return;
        }
        self.usages.entry(resource).or_default().push(usage);
    }

    pub fn usages(&self, resource: ResourceId) -> &[EventUsage] {
        self.usages.get(&resource).map_or(&[], Vec::as_slice)
    }

    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.usages.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &[EventUsage])> + '_ {
        self.usages.iter().map(|(id, u)| (*id, u.as_slice()))
    }

    /// Total number of records across all resources.
    pub fn len(&self) -> usize {
        self.usages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    /// Appends every record of `other`, with event ids shifted by `event_offset`.
    pub fn append_rebased(&mut self, other: &ResourceUsageLedger, event_offset: EventId) {
        for (resource, usages) in &other.usages {
            let dst = self.usages.entry(*resource).or_default();
            dst.extend(usages.iter().map(|u| EventUsage {
                event_id: u.event_id + event_offset,
                ..*u
            }));
        }
    }
}
