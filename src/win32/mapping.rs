use crate::error::{Error, Result};
use crate::transport::{IdentityRegistry, WindowId};
use log::error;
use std::marker::PhantomData;
use windows::core::{Error as WindowsError, Owned, PCWSTR};
use windows::Win32::Foundation::{ERROR_ALREADY_EXISTS, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP, FILE_MAP_READ, FILE_MAP_WRITE,
    MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};

/// The region holds a single little-endian `u64`: the owner identity, or zero
/// for "no live owner".
const MAPPING_SIZE: usize = size_of::<u64>();

/// Session-local object namespace; keeps monikers away from unrelated global
/// named objects.
const MAPPING_PREFIX: &str = "Local\\";

/// Shared registry backed by a named, session-scoped file mapping.
///
/// Every access is a full map/unmap cycle: the region itself stays the source
/// of truth for other processes, nothing is cached here. The mapping is
/// zero-initialized by the OS, which doubles as the starting sentinel.
pub struct FileMappingRegistry {
    mapping: Owned<HANDLE>,
    created_new: bool,
}

// SAFETY: file mapping handles are process-global and usable from any thread
unsafe impl Send for FileMappingRegistry {}
unsafe impl Sync for FileMappingRegistry {}

impl FileMappingRegistry {
    /// Atomically creates or opens the region for `moniker`. The OS arbitrates
    /// two processes racing to create the same name; exactly one observes
    /// "created new".
    pub fn create(moniker: &str) -> Result<Self> {
        let name: Vec<u16> = format!("{MAPPING_PREFIX}{moniker}")
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        // SAFETY: the name buffer is null-terminated and outlives the call
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                MAPPING_SIZE as u32,
                PCWSTR(name.as_ptr()),
            )
        }
        .map_err(|err| Error::RegistryUnavailable(err.into()))?;
        // A successful CreateFileMappingW reports "opened existing" through
        // the thread's last-error value, which the call leaves intact
        let created_new = WindowsError::from_win32() != WindowsError::from(ERROR_ALREADY_EXISTS);
        // SAFETY: we own the freshly returned handle
        let mapping = unsafe { Owned::new(mapping) };
        Ok(FileMappingRegistry {
            mapping,
            created_new,
        })
    }

    /// Whether this process created the region, making it the primary
    /// candidate for its moniker.
    pub fn created_new(&self) -> bool {
        self.created_new
    }

    fn map_view(&self, access: FILE_MAP) -> Result<MappedSlot<'_>> {
        // SAFETY: the mapping handle is live for as long as self
        let addr = unsafe { MapViewOfFile(*self.mapping, access, 0, 0, MAPPING_SIZE) };
        if addr.Value.is_null() {
            return Err(Error::RegistryAccess(WindowsError::from_win32().into()));
        }
        Ok(MappedSlot {
            addr,
            _mapping: PhantomData,
        })
    }

    fn write(&self, value: u64) -> Result<()> {
        let view = self.map_view(FILE_MAP_WRITE)?;
        // SAFETY: the view spans MAPPING_SIZE bytes
        unsafe { (view.addr.Value as *mut u64).write_unaligned(value.to_le()) };
        Ok(())
    }

    fn read(&self) -> Result<u64> {
        let view = self.map_view(FILE_MAP_READ)?;
        // SAFETY: the view spans MAPPING_SIZE bytes
        let raw = unsafe { (view.addr.Value as *const u64).read_unaligned() };
        Ok(u64::from_le(raw))
    }
}

impl IdentityRegistry for FileMappingRegistry {
    fn publish(&self, id: WindowId) -> Result<()> {
        self.write(id.get())
    }

    fn retract(&self) -> Result<()> {
        self.write(0)
    }

    fn lookup(&self) -> Result<Option<WindowId>> {
        Ok(WindowId::new(self.read()?))
    }
}

struct MappedSlot<'mapping> {
    addr: MEMORY_MAPPED_VIEW_ADDRESS,
    _mapping: PhantomData<&'mapping Owned<HANDLE>>,
}

impl Drop for MappedSlot<'_> {
    fn drop(&mut self) {
        // SAFETY: addr was returned by a successful MapViewOfFile
        if let Err(err) = unsafe { UnmapViewOfFile(self.addr) } {
            error!("Failed to unmap registry view: {err}");
        }
    }
}
