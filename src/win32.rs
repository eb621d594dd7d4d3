//! Win32 implementations of the transport seams: an 8-byte named file mapping
//! as the identity registry, and `WM_COPYDATA` as the message transport.

mod copy_data;
mod mapping;

pub use copy_data::{window_id, CopyDataTransport};
pub use mapping::FileMappingRegistry;

use crate::coordinator::InstanceCoordinator;
use crate::error::Result;
use std::sync::Arc;

/// Coordinator wired to the Win32 registry and transport.
pub type Coordinator = InstanceCoordinator<FileMappingRegistry, CopyDataTransport>;

impl Coordinator {
    /// Creates or joins the coordination domain named by `moniker`.
    ///
    /// The first process to call this for a given moniker within a session
    /// creates the registry region and becomes the primary candidate; every
    /// later process opens the existing region instead.
    pub fn new(moniker: &str) -> Result<Arc<Self>> {
        crate::coordinator::validate_moniker(moniker)?;
        let registry = FileMappingRegistry::create(moniker)?;
        let is_primary_candidate = registry.created_new();
        Ok(InstanceCoordinator::from_parts(
            registry,
            CopyDataTransport,
            is_primary_candidate,
        ))
    }
}
