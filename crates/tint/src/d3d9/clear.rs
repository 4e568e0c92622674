//! `IDirect3DDevice9::Clear` split into per-view clear events.

use tint_api::{CommandList, ResourceView, pipeline::Rect};
use tint_event::{Event, EventKind, Flow, Registry};

pub const TARGET: u32 = 0x1;
pub const ZBUFFER: u32 = 0x2;
pub const STENCIL: u32 = 0x4;

/// One `Clear` call against the bound attachments.
#[derive(Debug, Clone, Copy)]
pub struct Clear<'a> {
    pub flags: u32,
    pub render_targets: &'a [ResourceView],
    pub color: [f32; 4],
    pub depth_stencil: Option<ResourceView>,
    pub depth: f32,
    pub stencil: u8,
    pub rects: &'a [Rect],
}

impl Clear<'_> {
    /// Dispatches the clear events and returns the flags left for the native call.
    ///
    /// A handled render target clear drops [`TARGET`] for every attachment, the remaining
    /// attachments are not reported. A handled depth stencil clear drops both depth and stencil.
    pub fn dispatch(&self, registry: &Registry, cmd_list: &dyn CommandList) -> u32 {
        let mut flags = self.flags;

        if flags & TARGET != 0 && registry.has_listeners(EventKind::ClearRenderTargetView) {
            for &rtv in self.render_targets {
                let mut event = Event::ClearRenderTargetView {
                    cmd_list,
                    rtv,
                    color: self.color,
                    rects: self.rects,
                };

                if registry.dispatch(&mut event) == Flow::Handled {
                    flags &= !TARGET;
                    break;
                }
            }
        }

        if flags & (ZBUFFER | STENCIL) != 0
            && registry.has_listeners(EventKind::ClearDepthStencilView)
        {
            if let Some(dsv) = self.depth_stencil {
                let mut event = Event::ClearDepthStencilView {
                    cmd_list,
                    dsv,
                    depth: (flags & ZBUFFER != 0).then_some(self.depth),
                    stencil: (flags & STENCIL != 0).then_some(self.stencil),
                    rects: self.rects,
                };

                if registry.dispatch(&mut event) == Flow::Handled {
                    flags &= !(ZBUFFER | STENCIL);
                }
            }
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::testing::RecordingCommandList;

    const RTV0: ResourceView = ResourceView::from_raw(0x100);
    const RTV1: ResourceView = ResourceView::from_raw(0x200);
    const DSV: ResourceView = ResourceView::from_raw(0x300);

    fn clear<'a>(flags: u32, render_targets: &'a [ResourceView]) -> Clear<'a> {
        Clear {
            flags,
            render_targets,
            color: [0.0, 0.0, 0.0, 1.0],
            depth_stencil: Some(DSV),
            depth: 1.0,
            stencil: 0,
            rects: &[],
        }
    }

    #[test]
    fn vetoed_target_skips_remaining_attachments() {
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            registry.register_addon("veto", move |r| {
                r.on(EventKind::ClearRenderTargetView, move |event| {
                    let Event::ClearRenderTargetView { rtv, .. } = event else {
                        return Flow::Continue;
                    };
                    seen.lock().push(*rtv);
                    if *rtv == RTV0 {
                        Flow::Handled
                    } else {
                        Flow::Continue
                    }
                });
            });
        }

        let cmd_list = RecordingCommandList::default();
        let flags = clear(TARGET | ZBUFFER, &[RTV0, RTV1]).dispatch(&registry, &cmd_list);

        assert_eq!(flags, ZBUFFER);
        assert_eq!(*seen.lock(), [RTV0]);
    }

    #[test]
    fn depth_and_stencil_report_only_requested_parts() {
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            registry.register_addon("depth", move |r| {
                r.on(EventKind::ClearDepthStencilView, move |event| {
                    if let Event::ClearDepthStencilView { depth, stencil, .. } = event {
                        seen.lock().push((*depth, *stencil));
                    }
                    Flow::Handled
                });
            });
        }

        let cmd_list = RecordingCommandList::default();
        assert_eq!(clear(STENCIL, &[]).dispatch(&registry, &cmd_list), 0);
        assert_eq!(
            clear(TARGET | ZBUFFER, &[RTV0]).dispatch(&registry, &cmd_list),
            TARGET
        );
        assert_eq!(*seen.lock(), [(None, Some(0)), (Some(1.0), None)]);
    }

    #[test]
    fn without_listeners_flags_pass_through() {
        let registry = Registry::new();
        let cmd_list = RecordingCommandList::default();
        let all = TARGET | ZBUFFER | STENCIL;

        assert_eq!(clear(all, &[RTV0, RTV1]).dispatch(&registry, &cmd_list), all);
    }
}
