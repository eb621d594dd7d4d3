//! Single-instance coordination and cross-process message relay.
//!
//! Processes of the same application share a coordination domain named by an
//! application-chosen moniker. The first process in a session to construct a
//! coordinator for that moniker becomes the primary candidate; once it binds
//! its window, the window's identity is published in a small shared registry.
//! Any later instance sees an existing registry, relays its invocation (such
//! as a file to open) to the owner with [`InstanceCoordinator::send`], and
//! exits. The primary decodes inbound messages on its message pump, queues
//! them in order, and hands them to the application via
//! [`InstanceCoordinator::drain`].
//!
//! The coordinator itself is platform-neutral: the shared registry and the
//! message delivery primitive sit behind the [`IdentityRegistry`] and
//! [`MessageTransport`] traits. The [`win32`] module implements both on a
//! named file mapping and `WM_COPYDATA`, and `win32::Coordinator::new` is the
//! usual entry point on Windows.
//!
//! The protocol is one-way and best-effort by design: a send that finds no
//! owner within its timeout, or targets a window destroyed in the race window
//! between registry read and delivery, is a silent no-op.

mod coordinator;
mod error;
mod transport;
#[cfg(windows)]
pub mod win32;

pub use coordinator::{validate_moniker, InstanceCoordinator, DEFAULT_SEND_TIMEOUT};
pub use error::{Error, Result, TransportError};
pub use transport::{HostWindow, IdentityRegistry, LifecycleHooks, MessageTransport, WindowId};
