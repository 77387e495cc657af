//! Per-action instrumentation hooks used during replay.

use crate::device::CommandTarget;
use crate::draw::DrawFlags;
use crate::ids::EventId;

/// Observes every action replayed inside the rerecorded range.
///
/// `pre_*` runs just before the action is recorded into `target`, `post_*` just after. When a
/// `post_*` hook returns `true` the action is recorded a second time and `post_re*` runs after
/// that copy.
pub trait DrawcallCallback {
    fn pre_draw(&mut self, _event: EventId, _target: CommandTarget) {}

    fn post_draw(&mut self, _event: EventId, _target: CommandTarget) -> bool {
        false
    }

    fn post_redraw(&mut self, _event: EventId, _target: CommandTarget) {}

    fn pre_dispatch(&mut self, _event: EventId, _target: CommandTarget) {}

    fn post_dispatch(&mut self, _event: EventId, _target: CommandTarget) -> bool {
        false
    }

    fn post_redispatch(&mut self, _event: EventId, _target: CommandTarget) {}

    /// Copies, resolves and clears.
    fn pre_misc(&mut self, _event: EventId, _flags: DrawFlags, _target: CommandTarget) {}

    fn post_misc(&mut self, _event: EventId, _flags: DrawFlags, _target: CommandTarget) -> bool {
        false
    }

    fn post_remisc(&mut self, _event: EventId, _flags: DrawFlags, _target: CommandTarget) {}
}

/// Which hook family an action belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HookClass {
    Draw,
    Dispatch,
    Misc(DrawFlags),
}

impl HookClass {
    pub(crate) fn for_flags(flags: DrawFlags) -> Option<Self> {
        if flags.contains(DrawFlags::DRAWCALL) {
            Some(HookClass::Draw)
        } else if flags.contains(DrawFlags::DISPATCH) {
            Some(HookClass::Dispatch)
        } else if flags.intersects(DrawFlags::CLEAR | DrawFlags::COPY | DrawFlags::RESOLVE) {
            Some(HookClass::Misc(flags))
        } else {
            None
        }
    }

    pub(crate) fn pre<C: DrawcallCallback + ?Sized>(
        self,
        cb: &mut C,
        event: EventId,
        target: CommandTarget,
    ) {
        match self {
            HookClass::Draw => cb.pre_draw(event, target),
            HookClass::Dispatch => cb.pre_dispatch(event, target),
            HookClass::Misc(flags) => cb.pre_misc(event, flags, target),
        }
    }

    pub(crate) fn post<C: DrawcallCallback + ?Sized>(
        self,
        cb: &mut C,
        event: EventId,
        target: CommandTarget,
    ) -> bool {
        match self {
            HookClass::Draw => cb.post_draw(event, target),
            HookClass::Dispatch => cb.post_dispatch(event, target),
            HookClass::Misc(flags) => cb.post_misc(event, flags, target),
        }
    }

    pub(crate) fn post_re<C: DrawcallCallback + ?Sized>(
        self,
        cb: &mut C,
        event: EventId,
        target: CommandTarget,
    ) {
        match self {
            HookClass::Draw => cb.post_redraw(event, target),
            HookClass::Dispatch => cb.post_redispatch(event, target),
            HookClass::Misc(flags) => cb.post_remisc(event, flags, target),
        }
    }
}
