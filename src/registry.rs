//! Process-wide registry of open stores.
//!
//! One store per canonicalized directory. The registry hands out opaque
//! handles instead of references so the boundary layer can pass them
//! through C without lifetimes; a stale or forged handle is caught by a
//! generation check and can never dereference freed state.
//!
//! Uses `parking_lot::Mutex` instead of `std::sync::Mutex` so a panicking
//! caller cannot poison the registry for the rest of the process.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use satchel_core::{Error, Result};
use satchel_storage::{Store, StoreOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque identifier for one open store.
///
/// Packs a slot index (low 32 bits) and that slot's generation (high
/// 32 bits). Generations start at 1 and only move forward, so the raw
/// value 0 is never issued; the boundary layer reserves it for the
/// default instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    fn new(slot: u32, generation: u32) -> InstanceHandle {
        InstanceHandle(((generation as u64) << 32) | slot as u64)
    }

    fn slot(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The packed value that crosses the boundary.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from its packed value. Validity is checked on
    /// every use, not here.
    pub fn from_raw(raw: u64) -> InstanceHandle {
        InstanceHandle(raw)
    }
}

struct Slot {
    /// Bumped every time the slot is vacated; pending handles carry the
    /// generation they were issued under
    generation: u32,
    entry: Option<Entry>,
}

struct Entry {
    store: Arc<Store>,
    /// Canonical directory, the key in `paths`
    path: PathBuf,
}

struct Registry {
    slots: Vec<Slot>,
    /// Indices of vacant slots, reused before the arena grows
    free: Vec<usize>,
    paths: HashMap<PathBuf, usize>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        slots: Vec::new(),
        free: Vec::new(),
        paths: HashMap::new(),
    })
});

/// Open the store rooted at `dir` and register it under its canonical
/// path.
///
/// Fails with `AlreadyOpen` when a live handle already owns that
/// directory; two stores appending to the same log would corrupt it.
pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> Result<InstanceHandle> {
    // Create the directory first so it can be canonicalized
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let canonical = dir.canonicalize()?;

    // Hold the lock across the whole open so two threads racing on the
    // same path cannot both create a store for it.
    let mut registry = REGISTRY.lock();
    if registry.paths.contains_key(&canonical) {
        return Err(Error::AlreadyOpen(canonical));
    }

    let store = Arc::new(Store::open(&canonical, options)?);

    let index = match registry.free.pop() {
        Some(index) => index,
        None => {
            registry.slots.push(Slot {
                generation: 1,
                entry: None,
            });
            registry.slots.len() - 1
        }
    };
    let slot = &mut registry.slots[index];
    slot.entry = Some(Entry {
        store,
        path: canonical.clone(),
    });
    let handle = InstanceHandle::new(index as u32, slot.generation);
    registry.paths.insert(canonical, index);

    debug!(
        target: "satchel::store",
        handle = handle.as_raw(),
        open = registry.paths.len(),
        "instance registered"
    );
    Ok(handle)
}

/// Look up the store behind `handle`.
///
/// The returned `Arc` keeps the store alive for the duration of the
/// operation even if the handle is closed concurrently; the store's own
/// closed check still applies.
pub fn resolve(handle: InstanceHandle) -> Result<Arc<Store>> {
    let registry = REGISTRY.lock();
    let slot = registry
        .slots
        .get(handle.slot())
        .ok_or_else(|| unknown_handle(handle))?;
    if slot.generation != handle.generation() {
        // Generations only move forward, so an older one was issued and
        // later retired by close; anything else was never issued.
        if handle.generation() != 0 && handle.generation() < slot.generation {
            return Err(Error::InstanceClosed);
        }
        return Err(unknown_handle(handle));
    }
    match &slot.entry {
        Some(entry) => Ok(Arc::clone(&entry.store)),
        None => Err(unknown_handle(handle)),
    }
}

/// Flush and close the store, retire the handle and release its
/// directory for reopening.
pub fn close(handle: InstanceHandle) -> Result<()> {
    let entry = take_entry(handle)?;
    info!(
        target: "satchel::store",
        handle = handle.as_raw(),
        "instance closed"
    );
    // Sync happens outside the registry lock; other instances stay
    // usable while this one flushes.
    entry.store.close()
}

/// Remove every entry from the store behind `handle`. The handle stays
/// live.
pub fn clear(handle: InstanceHandle) -> Result<()> {
    resolve(handle)?.clear()
}

/// Delete the store's on-disk data and retire the handle.
pub fn clear_destroy(handle: InstanceHandle) -> Result<()> {
    let entry = take_entry(handle)?;
    info!(
        target: "satchel::store",
        handle = handle.as_raw(),
        "instance destroyed"
    );
    entry.store.destroy()
}

/// Number of live instances, default instance included.
pub fn open_count() -> usize {
    REGISTRY.lock().paths.len()
}

/// Validate `handle`, vacate its slot and release its path mapping.
fn take_entry(handle: InstanceHandle) -> Result<Entry> {
    let mut guard = REGISTRY.lock();
    let registry = &mut *guard;
    let slot = registry
        .slots
        .get_mut(handle.slot())
        .ok_or_else(|| unknown_handle(handle))?;
    if slot.generation != handle.generation() {
        if handle.generation() != 0 && handle.generation() < slot.generation {
            return Err(Error::InstanceClosed);
        }
        return Err(unknown_handle(handle));
    }
    let entry = slot.entry.take().ok_or_else(|| unknown_handle(handle))?;
    slot.generation = slot.generation.wrapping_add(1);
    if slot.generation == 0 {
        // Generation 0 is reserved; raw handle 0 must stay unissuable
        slot.generation = 1;
    }
    registry.paths.remove(&entry.path);
    registry.free.push(handle.slot());
    Ok(entry)
}

fn unknown_handle(handle: InstanceHandle) -> Error {
    Error::InvalidArgument(format!("unknown instance handle {:#x}", handle.as_raw()))
}
