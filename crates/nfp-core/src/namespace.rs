use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::error::{NftError, Result};
use crate::model::PortId;
use crate::status::NamespaceStatus;
use crate::store::Store;

/// Strictly increasing handle source shared by tables, chains and rules.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Port ids held by open connections.
#[derive(Debug, Default)]
struct PortTable {
    last: u32,
    bound: HashSet<u32>,
}

/// One shared object namespace.
///
/// Every request runs its whole check-then-act sequence while holding the
/// single store lock obtained through [`Namespace::lock`].
#[derive(Debug)]
pub struct Namespace {
    store: Mutex<Store>,
    handles: HandleAllocator,
    ports: Mutex<PortTable>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::new()),
            handles: HandleAllocator::new(),
            ports: Mutex::new(PortTable::default()),
        }
    }

    pub fn lock(&self) -> NamespaceGuard<'_> {
        NamespaceGuard {
            store: self.store.lock(),
            handles: &self.handles,
        }
    }

    pub fn next_handle(&self) -> u64 {
        self.handles.next()
    }

    /// Fresh nonzero port id, skipping ports bound explicitly.
    pub fn allocate_port(&self) -> PortId {
        let mut ports = self.ports.lock();
        loop {
            ports.last = ports.last.wrapping_add(1);
            let port = ports.last;
            if port != 0 && ports.bound.insert(port) {
                return PortId(port);
            }
        }
    }

    /// Claim a caller-chosen port id; it stays taken until released.
    pub fn bind_port(&self, port: PortId) -> Result<PortId> {
        if port.0 == 0 {
            return Err(NftError::invalid("port 0 requests autobind"));
        }
        if !self.ports.lock().bound.insert(port.0) {
            return Err(NftError::exists(format!("port {} is in use", port.0)));
        }
        Ok(port)
    }

    /// Free the port and drop or release the owner tables of a closed connection.
    pub fn release_port(&self, port: PortId) {
        self.ports.lock().bound.remove(&port.0);
        let released = self.lock().release_port(port);
        if released > 0 {
            info!(port = port.0, tables = released, "released owner tables");
        }
    }

    pub fn status(&self) -> NamespaceStatus {
        self.lock().status()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

/// Locked view of the store that can also mint handles.
pub struct NamespaceGuard<'a> {
    store: MutexGuard<'a, Store>,
    handles: &'a HandleAllocator,
}

impl NamespaceGuard<'_> {
    pub fn next_handle(&self) -> u64 {
        self.handles.next()
    }
}

impl Deref for NamespaceGuard<'_> {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

impl DerefMut for NamespaceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn handles_are_unique_across_threads() {
        let ns = Arc::new(Namespace::new());
        let mut workers = vec![];
        for _ in 0..8 {
            let ns = ns.clone();
            workers.push(thread::spawn(move || {
                (0..500).map(|_| ns.next_handle()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<u64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
        assert!(all[0] > 0);
    }

    #[test]
    fn handles_increase_strictly() {
        let ns = Namespace::new();
        let first = ns.next_handle();
        let second = ns.lock().next_handle();
        assert!(second > first);
    }

    #[test]
    fn allocated_ports_are_nonzero_and_distinct() {
        let ns = Namespace::new();
        let a = ns.allocate_port();
        let b = ns.allocate_port();
        assert_ne!(a.0, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn explicit_ports_are_exclusive() {
        let ns = Namespace::new();
        assert_eq!(ns.bind_port(PortId(2)).unwrap(), PortId(2));
        assert!(matches!(
            ns.bind_port(PortId(2)),
            Err(NftError::AlreadyExists(_))
        ));
        assert!(matches!(
            ns.bind_port(PortId(0)),
            Err(NftError::InvalidArgument(_))
        ));

        assert_eq!(ns.allocate_port(), PortId(1));
        assert_eq!(ns.allocate_port(), PortId(3));

        ns.release_port(PortId(2));
        assert!(ns.bind_port(PortId(2)).is_ok());
        assert!(matches!(
            ns.bind_port(PortId(3)),
            Err(NftError::AlreadyExists(_))
        ));
    }
}
