use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kfplink_frame::Frame;
use tracing::trace;

/// Receives decoded frames from a [`FrameBus`].
///
/// Each listener gets its own copy of the frame, so changes a listener makes
/// to its frame are never seen by the others. Callbacks run on the receive
/// loop; a slow listener delays every later listener and the next read.
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, frame: Frame);
}

impl<F> FrameListener for F
where
    F: Fn(Frame) + Send + Sync,
{
    fn on_frame(&self, frame: Frame) {
        self(frame)
    }
}

/// How long a registration lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Invoked for the next frame only, then removed.
    #[default]
    Once,
    /// Invoked for every frame until explicitly removed.
    Persistent,
}

/// Handle returned by registration, used to remove a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Entry {
    id: ListenerId,
    delivery: Delivery,
    listener: Arc<dyn FrameListener>,
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
    next_id: u64,
}

/// Ordered set of frame listeners.
///
/// Listeners are invoked in registration order. Registering the same listener
/// twice yields two entries and two invocations per frame. Registration and
/// removal may happen from any thread, including from inside a callback:
/// dispatch never holds the lock while a listener runs.
pub struct FrameBus {
    registry: Mutex<Registry>,
    default_delivery: Delivery,
}

impl FrameBus {
    /// Create an empty bus whose plain registrations are [`Delivery::Once`].
    pub fn new() -> Self {
        Self::with_delivery(Delivery::Once)
    }

    /// Create an empty bus with the given default delivery.
    pub fn with_delivery(default_delivery: Delivery) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            default_delivery,
        }
    }

    /// Delivery used by [`FrameBus::register`].
    pub fn default_delivery(&self) -> Delivery {
        self.default_delivery
    }

    /// Register a listener with the bus default delivery.
    pub fn register(&self, listener: impl FrameListener + 'static) -> ListenerId {
        self.register_with(listener, self.default_delivery)
    }

    /// Register a listener with an explicit delivery.
    pub fn register_with(
        &self,
        listener: impl FrameListener + 'static,
        delivery: Delivery,
    ) -> ListenerId {
        self.register_shared(Arc::new(listener), delivery)
    }

    /// Register an already shared listener.
    pub fn register_shared(
        &self,
        listener: Arc<dyn FrameListener>,
        delivery: Delivery,
    ) -> ListenerId {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.entries.push(Entry {
            id,
            delivery,
            listener,
        });
        trace!(%id, ?delivery, "listener registered");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        before != registry.entries.len()
    }

    /// Deliver `frame` to every registered listener in registration order.
    ///
    /// Only listeners registered when dispatch begins are considered. Each one
    /// is looked up again right before it runs: a listener removed by an
    /// earlier callback in the same dispatch is skipped, and a
    /// [`Delivery::Once`] listener leaves the registry just before its
    /// callback, so a callback that registers a new listener arms it for the
    /// next frame. Returns the number of listeners invoked.
    pub fn dispatch(&self, frame: Frame) -> usize {
        let pending: Vec<ListenerId> = self.lock().entries.iter().map(|entry| entry.id).collect();

        let mut invoked = 0;
        for id in pending {
            let Some(listener) = self.claim(id) else {
                continue;
            };
            listener.on_frame(frame);
            invoked += 1;
        }
        invoked
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    // Fetch a listener for invocation, dequeuing it if it fires once.
    fn claim(&self, id: ListenerId) -> Option<Arc<dyn FrameListener>> {
        let mut registry = self.lock();
        let index = registry.entries.iter().position(|entry| entry.id == id)?;
        match registry.entries[index].delivery {
            Delivery::Once => Some(registry.entries.remove(index).listener),
            Delivery::Persistent => Some(Arc::clone(&registry.entries[index].listener)),
        }
    }

    // A panicking listener never holds the lock, so the registry is never
    // left half-updated.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBus")
            .field("listeners", &self.len())
            .field("default_delivery", &self.default_delivery)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    fn frame(id: u8) -> Frame {
        Frame::new([id, 0, 0, 0], [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80])
    }

    type Log = Arc<Mutex<Vec<(&'static str, Frame)>>>;

    fn recorder(tag: &'static str, log: &Log) -> impl Fn(Frame) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |frame| log.lock().expect("log lock").push((tag, frame))
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = FrameBus::new();
        bus.register(recorder("l1", &log));
        bus.register(recorder("l2", &log));
        bus.register(recorder("l3", &log));

        assert_eq!(bus.dispatch(frame(1)), 3);

        let log = log.lock().expect("log lock");
        let tags: Vec<_> = log.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, ["l1", "l2", "l3"]);
        assert!(log.iter().all(|(_, f)| *f == frame(1)));
    }

    #[test]
    fn once_listeners_are_drained_by_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = FrameBus::new();
        bus.register(recorder("once", &log));

        assert_eq!(bus.dispatch(frame(1)), 1);
        assert!(bus.is_empty());
        assert_eq!(bus.dispatch(frame(2)), 0);
        assert_eq!(log.lock().expect("log lock").len(), 1);
    }

    #[test]
    fn persistent_listeners_survive_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = FrameBus::with_delivery(Delivery::Persistent);
        bus.register(recorder("p", &log));
        bus.register_with(recorder("o", &log), Delivery::Once);

        bus.dispatch(frame(1));
        bus.dispatch(frame(2));
        bus.dispatch(frame(3));

        let log = log.lock().expect("log lock");
        let tags: Vec<_> = log.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, ["p", "o", "p", "p"]);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn same_listener_registered_twice_runs_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared: Arc<dyn FrameListener> = Arc::new(recorder("dup", &log));
        let bus = FrameBus::new();
        bus.register_shared(Arc::clone(&shared), Delivery::Persistent);
        bus.register_shared(shared, Delivery::Persistent);

        assert_eq!(bus.dispatch(frame(1)), 2);
        assert_eq!(log.lock().expect("log lock").len(), 2);
    }

    #[test]
    fn remove_unregisters_and_ignores_unknown_ids() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = FrameBus::with_delivery(Delivery::Persistent);
        let first = bus.register(recorder("a", &log));
        bus.register(recorder("b", &log));

        assert!(bus.remove(first));
        assert!(!bus.remove(first));
        bus.dispatch(frame(1));

        let log = log.lock().expect("log lock");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "b");
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(FrameBus::with_delivery(Delivery::Persistent));
        let victim = Arc::new(Mutex::new(None));

        let inner_bus = Arc::clone(&bus);
        let inner_victim = Arc::clone(&victim);
        let first_log = Arc::clone(&log);
        bus.register_with(
            move |frame: Frame| {
                first_log.lock().expect("log lock").push(("first", frame));
                if let Some(id) = *inner_victim.lock().expect("victim lock") {
                    inner_bus.remove(id);
                }
            },
            Delivery::Once,
        );
        *victim.lock().expect("victim lock") = Some(bus.register(recorder("second", &log)));
        bus.register(recorder("third", &log));

        assert_eq!(bus.dispatch(frame(1)), 2);

        let log = log.lock().expect("log lock");
        let tags: Vec<_> = log.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, ["first", "third"]);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn no_listeners_means_frame_is_dropped() {
        let bus = FrameBus::new();
        assert_eq!(bus.dispatch(frame(1)), 0);
    }

    #[test]
    fn listeners_receive_independent_copies() {
        let bus = FrameBus::new();
        let (tx, rx) = mpsc::channel();
        bus.register(|mut frame: Frame| {
            frame.payload.set_byte(0, 0xFF);
            frame.id.set_byte(0, 0xEE);
        });
        bus.register(move |frame: Frame| tx.send(frame).expect("send"));

        bus.dispatch(frame(7));
        assert_eq!(rx.recv().expect("frame"), frame(7));
    }

    #[test]
    fn once_listener_can_rearm_itself() {
        fn arm(bus: &Arc<FrameBus>, seen: &Arc<Mutex<Vec<u8>>>) {
            let bus_for_cb = Arc::clone(bus);
            let seen_for_cb = Arc::clone(seen);
            bus.register(move |frame: Frame| {
                seen_for_cb
                    .lock()
                    .expect("seen lock")
                    .push(frame.id.byte(0).expect("id byte"));
                arm(&bus_for_cb, &seen_for_cb);
            });
        }

        let bus = Arc::new(FrameBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        arm(&bus, &seen);

        bus.dispatch(frame(1));
        bus.dispatch(frame(2));
        bus.dispatch(frame(3));

        assert_eq!(*seen.lock().expect("seen lock"), vec![1, 2, 3]);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn listener_registered_during_dispatch_waits_for_next_frame() {
        let bus = Arc::new(FrameBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_log = Arc::clone(&log);
        let inner_bus = Arc::clone(&bus);
        bus.register(move |_frame: Frame| {
            inner_bus.register(recorder("late", &inner_log));
        });

        assert_eq!(bus.dispatch(frame(1)), 1);
        assert!(log.lock().expect("log lock").is_empty());
        assert_eq!(bus.dispatch(frame(2)), 1);
        assert_eq!(log.lock().expect("log lock")[0], ("late", frame(2)));
    }

    #[test]
    fn concurrent_registration_and_dispatch() {
        let bus = Arc::new(FrameBus::with_delivery(Delivery::Persistent));
        let (tx, rx) = mpsc::channel();

        let registrars: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                let tx = tx.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let tx = tx.clone();
                        bus.register(move |_frame: Frame| {
                            let _ = tx.send(());
                        });
                    }
                })
            })
            .collect();

        for n in 0..50u8 {
            bus.dispatch(frame(n));
        }
        for handle in registrars {
            handle.join().expect("registrar thread");
        }
        drop(tx);

        assert_eq!(bus.len(), 100);
        rx.try_iter().for_each(drop);
        assert_eq!(bus.dispatch(frame(0xFF)), 100);
        assert_eq!(rx.try_iter().count(), 100);
    }

    #[test]
    fn clear_removes_everything() {
        let bus = FrameBus::with_delivery(Delivery::Persistent);
        bus.register(|_frame: Frame| {});
        bus.register(|_frame: Frame| {});
        assert_eq!(bus.len(), 2);
        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn listener_id_display() {
        let bus = FrameBus::new();
        let id = bus.register(|_frame: Frame| {});
        assert_eq!(id.to_string(), "listener-1");
    }
}
