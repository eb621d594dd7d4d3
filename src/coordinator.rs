use crate::error::{Error, Result};
use crate::transport::{HostWindow, IdentityRegistry, LifecycleHooks, MessageTransport, WindowId};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Interval between registry polls while `send` waits for an owner to appear.
/// The registry offers no change notification, so the sender is stuck polling.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on how long `send` searches for a live owner.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Checks that `moniker` can name a registry region. Path separators would
/// escape the session-local object namespace the region name lives in.
pub fn validate_moniker(moniker: &str) -> Result<()> {
    if moniker.contains(['\\', '/']) {
        return Err(Error::InvalidMoniker(moniker.to_string()));
    }
    Ok(())
}

/// Coordinates instances of the same application within a session.
///
/// The first process to create the shared registry for a moniker is the
/// primary candidate; once it binds its window, the window identity is
/// published for other instances to relay messages to. Later instances see an
/// existing registry, [`send`](Self::send) their invocation to the owner and
/// exit.
pub struct InstanceCoordinator<R: IdentityRegistry, T: MessageTransport> {
    registry: Mutex<Option<R>>,
    transport: T,
    is_primary_candidate: bool,
    window: Mutex<Option<Arc<dyn HostWindow>>>,
    pending: Mutex<Vec<String>>,
    message_received: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    // Handed out to lifecycle hooks so a dead coordinator never keeps a
    // window alive (or vice versa)
    weak_self: Weak<Self>,
}

impl<R: IdentityRegistry, T: MessageTransport> InstanceCoordinator<R, T> {
    /// Assembles a coordinator from an already-opened registry and transport.
    ///
    /// `is_primary_candidate` reports whether this process created the
    /// registry region rather than opening an existing one. Platform
    /// constructors resolve it; see `win32::Coordinator::new`.
    pub fn from_parts(registry: R, transport: T, is_primary_candidate: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| InstanceCoordinator {
            registry: Mutex::new(Some(registry)),
            transport,
            is_primary_candidate,
            window: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            message_received: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Whether this process is eligible to become the visible owner.
    ///
    /// Eligibility alone publishes nothing; the identity only becomes visible
    /// to other instances once a window is bound and its native resource
    /// exists.
    pub fn is_primary_candidate(&self) -> bool {
        self.is_primary_candidate
    }

    /// Binds `window` and keeps the registry in sync with its lifecycle.
    ///
    /// A previously bound window is unbound first, retracting its identity.
    /// If `window` already has a live identity it is published immediately;
    /// otherwise publication happens when the created hook fires.
    pub fn bind(&self, window: Arc<dyn HostWindow>) -> Result<()>
    where
        R: Send + 'static,
        T: Send + Sync + 'static,
    {
        self.unbind()?;
        let on_created = {
            let weak = self.weak_self.clone();
            Box::new(move |id| {
                if let Some(coordinator) = weak.upgrade() {
                    if let Err(err) = coordinator.publish(id) {
                        error!("Failed to publish window identity: {err}");
                    }
                }
            })
        };
        let on_destroyed = {
            let weak = self.weak_self.clone();
            Box::new(move || Self::unbind_from_hook(&weak))
        };
        let on_disposed = {
            let weak = self.weak_self.clone();
            Box::new(move || Self::unbind_from_hook(&weak))
        };
        window.set_lifecycle_hooks(Some(LifecycleHooks {
            on_created,
            on_destroyed,
            on_disposed,
        }));
        *self.window.lock().unwrap() = Some(window.clone());
        if let Some(id) = window.identity() {
            self.publish(id)?;
        }
        Ok(())
    }

    fn unbind_from_hook(weak: &Weak<Self>) {
        if let Some(coordinator) = weak.upgrade() {
            if let Err(err) = coordinator.unbind() {
                error!("Failed to retract window identity: {err}");
            }
        }
    }

    /// Retracts the published identity and detaches from the bound window.
    /// A no-op when no window is bound.
    pub fn unbind(&self) -> Result<()> {
        let window = self.window.lock().unwrap().take();
        let Some(window) = window else {
            return Ok(());
        };
        window.set_lifecycle_hooks(None);
        self.retract()
    }

    fn publish(&self, id: WindowId) -> Result<()> {
        match self.registry.lock().unwrap().as_ref() {
            Some(registry) => {
                registry.publish(id)?;
                debug!("Published owner identity {:#x}", id.get());
                Ok(())
            }
            None => {
                warn!("Ignoring publish on a disposed coordinator");
                Ok(())
            }
        }
    }

    fn retract(&self) -> Result<()> {
        match self.registry.lock().unwrap().as_ref() {
            Some(registry) => {
                registry.retract()?;
                debug!("Retracted owner identity");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn lookup(&self) -> Result<Option<WindowId>> {
        match self.registry.lock().unwrap().as_ref() {
            Some(registry) => registry.lookup(),
            None => Ok(None),
        }
    }

    /// Relays `text` to the current owner window, waiting up to
    /// [`DEFAULT_SEND_TIMEOUT`] for one to appear.
    pub fn send(&self, text: &str) -> Result<()> {
        self.send_with_timeout(text, DEFAULT_SEND_TIMEOUT)
    }

    /// Relays `text` to the current owner window, polling the registry until
    /// an owner appears or `timeout` elapses. Blocks the calling thread for
    /// up to `timeout`.
    ///
    /// Fire-and-forget: returns `Ok` even when no owner appeared in time or
    /// the owner vanished between the registry read and delivery. Only a
    /// failing registry read reports an error.
    pub fn send_with_timeout(&self, text: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let owner = loop {
            if let Some(id) = self.lookup()? {
                break id;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("No owner window appeared within {timeout:?}, dropping message");
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        };
        if !self.transport.deliver(owner, text) {
            debug!("Owner window {:#x} vanished before delivery", owner.get());
        }
        Ok(())
    }

    /// Brings the current owner window to the foreground, restoring it first
    /// if minimized. Best effort: a missing owner or any platform failure is
    /// swallowed.
    pub fn focus_owner(&self) {
        match self.lookup() {
            Ok(Some(id)) => self.transport.focus(id),
            Ok(None) => {}
            Err(err) => debug!("Skipping focus, registry read failed: {err}"),
        }
    }

    /// Must be called by the host for every native message observed on the
    /// bound window's pump (typically from its window procedure). Returns
    /// whether the message was recognized and consumed.
    ///
    /// On a recognized message the payload is appended to the pending queue
    /// and the message-received callback runs synchronously on the calling
    /// thread.
    pub fn on_incoming_message(&self, raw: &T::Raw) -> bool {
        let Some(text) = self.transport.try_decode(raw) else {
            return false;
        };
        debug!("Queued relayed message ({} bytes)", text.len());
        self.pending.lock().unwrap().push(text);
        let callback = self.message_received.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    /// Registers the callback raised on the pump thread each time a message
    /// is queued, replacing any previous callback.
    pub fn on_message_received(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.message_received.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn has_pending_messages(&self) -> bool {
        !self.pending.lock().unwrap().is_empty()
    }

    /// Atomically removes and returns all queued messages, oldest first.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    /// Retracts any published identity and releases the registry handle.
    /// Safe to call repeatedly; also runs on drop.
    pub fn dispose(&self) {
        if let Err(err) = self.unbind() {
            error!("Failed to retract identity during dispose: {err}");
        }
        self.registry.lock().unwrap().take();
    }
}

impl<R: IdentityRegistry, T: MessageTransport> Drop for InstanceCoordinator<R, T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Registry backed by a plain shared slot, zero meaning "no owner".
    struct SlotRegistry {
        slot: Arc<Mutex<u64>>,
    }

    impl IdentityRegistry for SlotRegistry {
        fn publish(&self, id: WindowId) -> Result<()> {
            *self.slot.lock().unwrap() = id.get();
            Ok(())
        }

        fn retract(&self) -> Result<()> {
            *self.slot.lock().unwrap() = 0;
            Ok(())
        }

        fn lookup(&self) -> Result<Option<WindowId>> {
            Ok(WindowId::new(*self.slot.lock().unwrap()))
        }
    }

    const RELAY_CHANNEL: u32 = 0x52;

    struct TestMessage {
        channel: u32,
        text: String,
    }

    #[derive(Default)]
    struct LoopbackTransport {
        live: Mutex<HashSet<u64>>,
        delivered: Mutex<Vec<(u64, String)>>,
        focused: Mutex<Vec<u64>>,
    }

    impl MessageTransport for Arc<LoopbackTransport> {
        type Raw = TestMessage;

        fn deliver(&self, target: WindowId, text: &str) -> bool {
            if !self.live.lock().unwrap().contains(&target.get()) {
                return false;
            }
            self.delivered
                .lock()
                .unwrap()
                .push((target.get(), text.to_string()));
            true
        }

        fn try_decode(&self, raw: &TestMessage) -> Option<String> {
            (raw.channel == RELAY_CHANNEL).then(|| raw.text.clone())
        }

        fn focus(&self, target: WindowId) {
            self.focused.lock().unwrap().push(target.get());
        }
    }

    #[derive(Default)]
    struct TestWindow {
        identity: Mutex<Option<WindowId>>,
        hooks: Mutex<Option<Arc<LifecycleHooks>>>,
    }

    impl TestWindow {
        fn hooks(&self) -> Option<Arc<LifecycleHooks>> {
            self.hooks.lock().unwrap().clone()
        }

        fn create(&self, raw: u64) {
            let id = WindowId::new(raw).unwrap();
            *self.identity.lock().unwrap() = Some(id);
            if let Some(hooks) = self.hooks() {
                (hooks.on_created)(id);
            }
        }

        fn destroy(&self) {
            *self.identity.lock().unwrap() = None;
            if let Some(hooks) = self.hooks() {
                (hooks.on_destroyed)();
            }
        }

        fn dispose(&self) {
            *self.identity.lock().unwrap() = None;
            if let Some(hooks) = self.hooks() {
                (hooks.on_disposed)();
            }
        }
    }

    impl HostWindow for TestWindow {
        fn identity(&self) -> Option<WindowId> {
            *self.identity.lock().unwrap()
        }

        fn set_lifecycle_hooks(&self, hooks: Option<LifecycleHooks>) {
            *self.hooks.lock().unwrap() = hooks.map(Arc::new);
        }
    }

    struct Fixture {
        slot: Arc<Mutex<u64>>,
        transport: Arc<LoopbackTransport>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                slot: Arc::new(Mutex::new(0)),
                transport: Arc::new(LoopbackTransport::default()),
            }
        }

        fn coordinator(
            &self,
            is_primary: bool,
        ) -> Arc<InstanceCoordinator<SlotRegistry, Arc<LoopbackTransport>>> {
            let registry = SlotRegistry {
                slot: self.slot.clone(),
            };
            InstanceCoordinator::from_parts(registry, self.transport.clone(), is_primary)
        }

        fn mark_live(&self, raw: u64) {
            self.transport.live.lock().unwrap().insert(raw);
        }

        fn slot(&self) -> u64 {
            *self.slot.lock().unwrap()
        }

        fn delivered(&self) -> Vec<(u64, String)> {
            self.transport.delivered.lock().unwrap().clone()
        }
    }

    fn relay_message(text: &str) -> TestMessage {
        TestMessage {
            channel: RELAY_CHANNEL,
            text: text.to_string(),
        }
    }

    #[test]
    fn fresh_queue_is_empty() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        assert!(!coordinator.has_pending_messages());
        assert_eq!(coordinator.drain(), Vec::<String>::new());
    }

    #[test]
    fn moniker_with_separator_is_rejected() {
        assert!(matches!(
            validate_moniker("a\\b"),
            Err(Error::InvalidMoniker(_))
        ));
        assert!(matches!(
            validate_moniker("a/b"),
            Err(Error::InvalidMoniker(_))
        ));
        assert!(validate_moniker("PaintTool").is_ok());
    }

    #[test]
    fn bind_publishes_live_identity_immediately() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        let window = Arc::new(TestWindow::default());
        *window.identity.lock().unwrap() = WindowId::new(0x1234);
        coordinator.bind(window).unwrap();
        assert_eq!(fixture.slot(), 0x1234);
    }

    #[test]
    fn bind_publishes_when_handle_created() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        let window = Arc::new(TestWindow::default());
        coordinator.bind(window.clone()).unwrap();
        assert_eq!(fixture.slot(), 0);
        window.create(0x77);
        assert_eq!(fixture.slot(), 0x77);
    }

    #[test]
    fn destroy_retracts_identity() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        let window = Arc::new(TestWindow::default());
        coordinator.bind(window.clone()).unwrap();
        window.create(0x77);
        window.destroy();
        assert_eq!(fixture.slot(), 0);
        // hooks are gone after the unbind
        assert!(window.hooks().is_none());
    }

    #[test]
    fn dispose_of_window_retracts_identity() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        let window = Arc::new(TestWindow::default());
        coordinator.bind(window.clone()).unwrap();
        window.create(0x42);
        window.dispose();
        assert_eq!(fixture.slot(), 0);
    }

    #[test]
    fn rebind_retracts_previous_identity_first() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        let first = Arc::new(TestWindow::default());
        coordinator.bind(first.clone()).unwrap();
        first.create(0x1);
        let second = Arc::new(TestWindow::default());
        *second.identity.lock().unwrap() = WindowId::new(0x2);
        coordinator.bind(second).unwrap();
        assert_eq!(fixture.slot(), 0x2);
        // the first window no longer reaches the registry
        assert!(first.hooks().is_none());
        first.destroy();
        assert_eq!(fixture.slot(), 0x2);
    }

    #[test]
    fn send_delivers_to_published_owner() {
        let fixture = Fixture::new();
        let primary = fixture.coordinator(true);
        let window = Arc::new(TestWindow::default());
        coordinator_bind_and_create(&primary, &window, 0x9);
        fixture.mark_live(0x9);

        let secondary = fixture.coordinator(false);
        secondary.send("open file.png").unwrap();
        assert_eq!(fixture.delivered(), vec![(0x9, "open file.png".to_string())]);
    }

    #[test]
    fn send_times_out_without_owner() {
        let fixture = Fixture::new();
        let secondary = fixture.coordinator(false);
        let started = Instant::now();
        secondary
            .send_with_timeout("nobody home", Duration::from_millis(250))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(fixture.delivered().is_empty());
    }

    #[test]
    fn send_waits_for_owner_to_appear() {
        let fixture = Fixture::new();
        fixture.mark_live(0xA);
        let slot = fixture.slot.clone();
        let publisher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(250));
            *slot.lock().unwrap() = 0xA;
        });
        let secondary = fixture.coordinator(false);
        secondary
            .send_with_timeout("late owner", Duration::from_secs(5))
            .unwrap();
        publisher.join().unwrap();
        assert_eq!(fixture.delivered(), vec![(0xA, "late owner".to_string())]);
    }

    #[test]
    fn send_to_vanished_owner_is_silent() {
        let fixture = Fixture::new();
        // identity still in the registry, window already gone
        *fixture.slot.lock().unwrap() = 0xDEAD;
        let secondary = fixture.coordinator(false);
        secondary.send("too late").unwrap();
        assert!(fixture.delivered().is_empty());
    }

    #[test]
    fn incoming_messages_queue_in_order() {
        let fixture = Fixture::new();
        let primary = fixture.coordinator(true);
        assert!(primary.on_incoming_message(&relay_message("a")));
        assert!(primary.on_incoming_message(&relay_message("b")));
        assert!(primary.has_pending_messages());
        assert_eq!(primary.drain(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(primary.drain(), Vec::<String>::new());
    }

    #[test]
    fn unrelated_messages_are_ignored() {
        let fixture = Fixture::new();
        let primary = fixture.coordinator(true);
        let unrelated = TestMessage {
            channel: 0xFF,
            text: "ignored".to_string(),
        };
        assert!(!primary.on_incoming_message(&unrelated));
        assert!(!primary.has_pending_messages());
    }

    #[test]
    fn message_received_fires_per_message() {
        let fixture = Fixture::new();
        let primary = fixture.coordinator(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        primary.on_message_received(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        primary.on_incoming_message(&relay_message("x"));
        primary.on_incoming_message(&relay_message("y"));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn focus_owner_without_owner_is_noop() {
        let fixture = Fixture::new();
        let secondary = fixture.coordinator(false);
        secondary.focus_owner();
        assert!(fixture.transport.focused.lock().unwrap().is_empty());
    }

    #[test]
    fn focus_owner_activates_target() {
        let fixture = Fixture::new();
        *fixture.slot.lock().unwrap() = 0x5;
        let secondary = fixture.coordinator(false);
        secondary.focus_owner();
        assert_eq!(*fixture.transport.focused.lock().unwrap(), vec![0x5]);
    }

    #[test]
    fn dispose_is_idempotent() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        coordinator.dispose();
        coordinator.dispose();
        coordinator.send_with_timeout("x", Duration::from_millis(10)).unwrap();
        assert_eq!(coordinator.drain(), Vec::<String>::new());
    }

    #[test]
    fn dispose_retracts_published_identity() {
        let fixture = Fixture::new();
        let coordinator = fixture.coordinator(true);
        let window = Arc::new(TestWindow::default());
        coordinator_bind_and_create(&coordinator, &window, 0x31);
        coordinator.dispose();
        assert_eq!(fixture.slot(), 0);
    }

    #[test]
    fn drop_retracts_published_identity() {
        let fixture = Fixture::new();
        {
            let coordinator = fixture.coordinator(true);
            let window = Arc::new(TestWindow::default());
            coordinator_bind_and_create(&coordinator, &window, 0x31);
            assert_eq!(fixture.slot(), 0x31);
        }
        assert_eq!(fixture.slot(), 0);
    }

    fn coordinator_bind_and_create(
        coordinator: &Arc<InstanceCoordinator<SlotRegistry, Arc<LoopbackTransport>>>,
        window: &Arc<TestWindow>,
        raw: u64,
    ) {
        coordinator.bind(window.clone()).unwrap();
        window.create(raw);
    }
}
