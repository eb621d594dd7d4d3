use crate::error::Result;
use std::num::NonZeroU64;

/// Identity of an owner window as published into the shared registry.
///
/// Zero is reserved as the "no live owner" sentinel inside registry
/// implementations, so the value carried here is always non-zero.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct WindowId(NonZeroU64);

impl WindowId {
    pub fn new(raw: u64) -> Option<WindowId> {
        NonZeroU64::new(raw).map(WindowId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Cross-process slot holding the current owner identity for one moniker.
///
/// The slot itself is the source of truth for other processes; implementations
/// must not cache the published value.
pub trait IdentityRegistry {
    /// Records `id` as the current owner.
    fn publish(&self, id: WindowId) -> Result<()>;

    /// Clears the slot back to the "no live owner" sentinel.
    fn retract(&self) -> Result<()>;

    /// Reads the current owner, if any. The result may be stale by the time
    /// the caller acts on it; that race is accepted by the protocol.
    fn lookup(&self) -> Result<Option<WindowId>>;
}

/// Delivery of text payloads to a specific window identity, and decoding of
/// the inbound native messages that carry them.
pub trait MessageTransport {
    /// Native message type as observed on the owner's message pump.
    type Raw;

    /// Synchronously delivers `text` to `target`. Returns `false` when the
    /// target no longer exists; must not block indefinitely either way.
    fn deliver(&self, target: WindowId, text: &str) -> bool;

    /// Decodes `raw` into a payload if it is a relay message, `None` for
    /// everything else.
    fn try_decode(&self, raw: &Self::Raw) -> Option<String>;

    /// Best-effort foreground activation of `target`. Failures are swallowed.
    fn focus(&self, _target: WindowId) {}
}

/// Lifecycle callbacks the coordinator installs on the bound window.
pub struct LifecycleHooks {
    /// The native resource now exists and has a stable identity.
    pub on_created: Box<dyn Fn(WindowId) + Send + Sync>,
    /// The native resource is about to go away.
    pub on_destroyed: Box<dyn Fn() + Send + Sync>,
    /// The window object itself was torn down.
    pub on_disposed: Box<dyn Fn() + Send + Sync>,
}

/// Capabilities the hosted window must expose to the coordinator.
///
/// Implementations must not hold internal locks while invoking the hooks: a
/// destroyed/disposed hook re-enters the window through
/// [`set_lifecycle_hooks`](HostWindow::set_lifecycle_hooks).
pub trait HostWindow: Send + Sync {
    /// Identity of the native window, if it currently exists.
    fn identity(&self) -> Option<WindowId>;

    /// Installs (`Some`) or removes (`None`) the coordinator's lifecycle
    /// hooks, replacing any previously installed set.
    fn set_lifecycle_hooks(&self, hooks: Option<LifecycleHooks>);
}
