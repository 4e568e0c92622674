use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::{Event, EventKind, Flow};

pub type Listener = Arc<dyn Fn(&mut Event<'_>) -> Flow + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddonId(u32);

#[derive(Clone)]
struct Entry {
    addon: AddonId,
    listener: Listener,
}

#[derive(Clone)]
struct Table {
    addons: Vec<(AddonId, Arc<str>)>,
    listeners: Vec<Vec<Entry>>,
}

impl Table {
    fn empty() -> Self {
        Self {
            addons: Vec::new(),
            listeners: vec![Vec::new(); EventKind::COUNT],
        }
    }
}

/// Collects the listeners of one add-on during [`Registry::register_addon`].
pub struct Registrar {
    addon: AddonId,
    entries: Vec<(EventKind, Entry)>,
}

impl Registrar {
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> &mut Self
    where
        F: Fn(&mut Event<'_>) -> Flow + Send + Sync + 'static,
    {
        self.entries.push((
            kind,
            Entry {
                addon: self.addon,
                listener: Arc::new(listener),
            },
        ));
        self
    }
}

/// Listener table shared by every hook.
///
/// Writers publish a new table on each change. A dispatch keeps the table it started with,
/// so listeners of an add-on being unregistered stay alive until every dispatch using them returns.
pub struct Registry {
    table: ArcSwap<Table>,
    write: Mutex<()>,
    next_id: AtomicU32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(Table::empty()),
            write: Mutex::new(()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Registers an add-on and the listeners `f` adds to the registrar.
    pub fn register_addon(&self, name: &str, f: impl FnOnce(&mut Registrar)) -> AddonId {
        let addon = AddonId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registrar = Registrar {
            addon,
            entries: Vec::new(),
        };
        f(&mut registrar);

        let _guard = self.write.lock();
        let mut table = Table::clone(&self.table.load());
        table.addons.push((addon, Arc::from(name)));
        for (kind, entry) in registrar.entries {
            table.listeners[kind as usize].push(entry);
        }
        self.table.store(Arc::new(table));

        debug!("add-on {name} registered as {addon:?}");
        addon
    }

    /// Removes an add-on and all of its listeners. Returns `false` for an unknown id.
    pub fn unregister_addon(&self, addon: AddonId) -> bool {
        let _guard = self.write.lock();
        let mut table = Table::clone(&self.table.load());

        let Some(index) = table.addons.iter().position(|(id, _)| *id == addon) else {
            return false;
        };
        let (_, name) = table.addons.remove(index);
        for listeners in &mut table.listeners {
            listeners.retain(|entry| entry.addon != addon);
        }
        self.table.store(Arc::new(table));

        debug!("add-on {name} unregistered");
        true
    }

    pub fn addons(&self) -> Vec<Arc<str>> {
        self.table
            .load()
            .addons
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    #[inline]
    pub fn has_listeners(&self, kind: EventKind) -> bool {
        !self.table.load().listeners[kind as usize].is_empty()
    }

    /// Calls the listeners of the event in registration order.
    ///
    /// Overridable events stop at the first listener returning [`Flow::Handled`].
    /// Other events reach every listener and always return [`Flow::Continue`].
    pub fn dispatch(&self, event: &mut Event<'_>) -> Flow {
        let kind = event.kind();
        let table = self.table.load_full();
        let listeners = &table.listeners[kind as usize];

        if kind.is_overridable() {
            for entry in listeners {
                if (entry.listener)(event) == Flow::Handled {
                    return Flow::Handled;
                }
            }
        } else {
            for entry in listeners {
                (entry.listener)(event);
            }
        }

        Flow::Continue
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicUsize;

    use tint_api::CommandList;

    use super::*;

    struct NullCommandList;

    impl CommandList for NullCommandList {}

    fn draw(cmd_list: &dyn CommandList) -> Event<'_> {
        Event::Draw {
            cmd_list,
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    #[test]
    fn overridable_stops_at_handled() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for flow in [Flow::Continue, Flow::Handled, Flow::Continue] {
            let calls = calls.clone();
            registry.register_addon("counter", move |r| {
                r.on(EventKind::Draw, move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    flow
                });
            });
        }

        let cmd_list = NullCommandList;
        assert_eq!(registry.dispatch(&mut draw(&cmd_list)), Flow::Handled);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn observation_reaches_everyone() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            registry.register_addon("observer", move |r| {
                r.on(EventKind::ResetCommandList, move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Flow::Handled
                });
            });
        }

        let cmd_list = NullCommandList;
        let mut event = Event::ResetCommandList {
            cmd_list: &cmd_list,
        };
        assert_eq!(registry.dispatch(&mut event), Flow::Continue);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn listener_edits_payload() {
        let registry = Registry::new();
        registry.register_addon("editor", |r| {
            r.on(EventKind::Draw, |event| {
                if let Event::Draw { instance_count, .. } = event {
                    *instance_count = 2;
                }
                Flow::Continue
            });
        });

        let cmd_list = NullCommandList;
        let mut event = draw(&cmd_list);
        registry.dispatch(&mut event);
        assert!(matches!(event, Event::Draw { instance_count: 2, .. }));
    }

    #[test]
    fn unregister_removes_listeners() {
        let registry = Registry::new();
        let id = registry.register_addon("temp", |r| {
            r.on(EventKind::Draw, |_| Flow::Handled);
        });
        assert!(registry.has_listeners(EventKind::Draw));
        assert_eq!(registry.addons().len(), 1);

        assert!(registry.unregister_addon(id));
        assert!(!registry.has_listeners(EventKind::Draw));
        assert!(!registry.unregister_addon(id));

        let cmd_list = NullCommandList;
        assert_eq!(registry.dispatch(&mut draw(&cmd_list)), Flow::Continue);
    }

    #[test]
    fn unregister_during_dispatch_keeps_snapshot() {
        let registry = Arc::new(Registry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(Mutex::new(None));

        {
            let registry_ref = registry.clone();
            let second = second.clone();
            registry.register_addon("unloader", move |r| {
                r.on(EventKind::ResetCommandList, move |_| {
                    if let Some(id) = second.lock().take() {
                        registry_ref.unregister_addon(id);
                    }
                    Flow::Continue
                });
            });
        }

        {
            let calls = calls.clone();
            let id = registry.register_addon("victim", move |r| {
                r.on(EventKind::ResetCommandList, move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Flow::Continue
                });
            });
            *second.lock() = Some(id);
        }

        let cmd_list = NullCommandList;
        let mut event = Event::ResetCommandList {
            cmd_list: &cmd_list,
        };
        registry.dispatch(&mut event);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        registry.dispatch(&mut event);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
