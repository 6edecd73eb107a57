use crate::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::{Ref, RefCell, RefMut};
use std::ops::{Deref, DerefMut};

/// Interior-mutable storage with shared and exclusive access.
///
/// This is the seam between the containers and their lock mode: every
/// container keeps its state in a `RwCell` and only ever touches it through
/// `read` and `write`.
pub trait RwCell<T> {
    type ReadGuard<'a>: Deref<Target = T>
    where
        Self: 'a;
    type WriteGuard<'a>: DerefMut<Target = T>
    where
        Self: 'a;

    fn new(value: T) -> Self;

    /// Shared access for the lifetime of the returned guard.
    fn read(&self) -> Self::ReadGuard<'_>;

    /// Exclusive access for the lifetime of the returned guard.
    fn write(&self) -> Self::WriteGuard<'_>;

    fn into_inner(self) -> T;
}

impl<T> RwCell<T> for RwLock<T> {
    type ReadGuard<'a>
        = RwLockReadGuard<'a, T>
    where
        Self: 'a;
    type WriteGuard<'a>
        = RwLockWriteGuard<'a, T>
    where
        Self: 'a;

    fn new(value: T) -> Self {
        RwLock::new(value)
    }

    fn read(&self) -> Self::ReadGuard<'_> {
        RwLock::read(self)
    }

    fn write(&self) -> Self::WriteGuard<'_> {
        RwLock::write(self)
    }

    fn into_inner(self) -> T {
        RwLock::into_inner(self)
    }
}

/// Unguarded storage. `RefCell` only tracks borrows on the owning thread and
/// never blocks. It is `!Sync`, so an unguarded container cannot be shared
/// across threads.
impl<T> RwCell<T> for RefCell<T> {
    type ReadGuard<'a>
        = Ref<'a, T>
    where
        Self: 'a;
    type WriteGuard<'a>
        = RefMut<'a, T>
    where
        Self: 'a;

    fn new(value: T) -> Self {
        RefCell::new(value)
    }

    fn read(&self) -> Self::ReadGuard<'_> {
        self.borrow()
    }

    fn write(&self) -> Self::WriteGuard<'_> {
        self.borrow_mut()
    }

    fn into_inner(self) -> T {
        RefCell::into_inner(self)
    }
}

/// Compile-time choice between guarded and unguarded containers.
pub trait LockMode: 'static {
    /// The storage a container in this mode keeps its state in.
    type Cell<T>: RwCell<T>;

    const GUARDED: bool;
}

/// Every operation goes through a reader/writer lock; containers are `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guarded {}

impl LockMode for Guarded {
    type Cell<T> = RwLock<T>;

    const GUARDED: bool = true;
}

/// No synchronization. Containers are `Send` but not `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unguarded {}

impl LockMode for Unguarded {
    type Cell<T> = RefCell<T>;

    const GUARDED: bool = false;
}

pub(crate) type Storage<M, T> = <M as LockMode>::Cell<T>;

pub(crate) type ReadGuard<'a, M, T> = <Storage<M, T> as RwCell<T>>::ReadGuard<'a>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bump<M: LockMode>(cell: &Storage<M, Vec<u32>>) -> usize {
        cell.write().push(1);
        let guard = cell.read();
        guard.len()
    }

    #[test]
    fn test_modes_share_one_surface() {
        let guarded: Storage<Guarded, Vec<u32>> = RwCell::new(vec![]);
        let unguarded: Storage<Unguarded, Vec<u32>> = RwCell::new(vec![]);
        assert_eq!(bump::<Guarded>(&guarded), 1);
        assert_eq!(bump::<Guarded>(&guarded), 2);
        assert_eq!(bump::<Unguarded>(&unguarded), 1);
        assert_eq!(RwCell::into_inner(guarded), vec![1, 1]);
        assert_eq!(RwCell::into_inner(unguarded), vec![1]);
        assert!(Guarded::GUARDED);
        assert!(!Unguarded::GUARDED);
    }

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn test_unguarded_reentrant_write_panics() {
        let cell: Storage<Unguarded, u32> = RwCell::new(0);
        let _read = cell.read();
        let _write = cell.write();
    }
}
