// Reader/writer lock on top of the futex primitives from `atomic_wait`.
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

/// Set when a writer holds the lock. Odd, so readers treat it as "writer present".
const WRITE_LOCKED: u32 = u32::MAX;

/// The raw lock state, without any protected data.
///
/// `state` is twice the number of active readers, plus one if a writer is
/// waiting, or `WRITE_LOCKED` while a writer holds the lock. New readers are
/// turned away while the state is odd, so waiting writers are not starved.
pub struct RawRwLock {
    state: AtomicU32,
    /// Bumped whenever the lock may have become available to a writer.
    writer_wake_counter: AtomicU32,
}

impl RawRwLock {
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            writer_wake_counter: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn try_read(&self) -> bool {
        let state = self.state.load(Relaxed);
        state % 2 == 0
            && state < WRITE_LOCKED - 2
            && self
                .state
                .compare_exchange(state, state + 2, Acquire, Relaxed)
                .is_ok()
    }

    #[inline]
    pub fn try_write(&self) -> bool {
        let state = self.state.load(Relaxed);
        state <= 1
            && self
                .state
                .compare_exchange(state, WRITE_LOCKED, Acquire, Relaxed)
                .is_ok()
    }

    #[inline]
    pub fn read(&self) {
        if !self.try_read() {
            self.read_contended();
        }
    }

    #[cold]
    fn read_contended(&self) {
        let mut state = self.spin();
        loop {
            if state % 2 == 0 {
                assert!(state < WRITE_LOCKED - 2, "too many readers");
                match self
                    .state
                    .compare_exchange_weak(state, state + 2, Acquire, Relaxed)
                {
                    Ok(_) => return,
                    Err(s) => state = s,
                }
            }
            if state % 2 == 1 {
                // A writer holds or is waiting for the lock.
                atomic_wait::wait(&self.state, state);
                state = self.spin();
            }
        }
    }

    #[inline]
    pub fn write(&self) {
        if !self.try_write() {
            self.write_contended();
        }
    }

    #[cold]
    fn write_contended(&self) {
        let mut state = self.spin();
        loop {
            if state <= 1 {
                match self
                    .state
                    .compare_exchange(state, WRITE_LOCKED, Acquire, Relaxed)
                {
                    Ok(_) => return,
                    Err(s) => {
                        state = s;
                        continue;
                    }
                }
            }

            // Block new readers by making the state odd.
            if state % 2 == 0 {
                if let Err(s) = self
                    .state
                    .compare_exchange(state, state + 1, Relaxed, Relaxed)
                {
                    state = s;
                    continue;
                }
            }

            // Read the counter before re-checking the state, so a wake-up
            // between the two is not lost.
            let counter = self.writer_wake_counter.load(Acquire);
            state = self.state.load(Relaxed);
            if state >= 2 {
                atomic_wait::wait(&self.writer_wake_counter, counter);
                state = self.state.load(Relaxed);
            }
        }
    }

    fn spin(&self) -> u32 {
        let mut spin = 100;
        loop {
            let state = self.state.load(Relaxed);

            // Stop spinning once the lock is free for someone, or nobody can
            // get in until a writer is done.
            if state <= 1 || state == WRITE_LOCKED || spin == 0 {
                return state;
            }

            std::hint::spin_loop();
            spin -= 1;
        }
    }

    #[inline]
    pub fn read_unlock(&self) {
        // 3 -> 1 means the last reader left and a writer is waiting.
        if self.state.fetch_sub(2, Release) == 3 {
            self.wake_writer();
        }
    }

    #[inline]
    pub fn write_unlock(&self) {
        self.state.store(0, Release);
        self.wake_writer();
        atomic_wait::wake_all(&self.state);
    }

    #[cold]
    fn wake_writer(&self) {
        self.writer_wake_counter.fetch_add(1, Release);
        atomic_wait::wake_one(&self.writer_wake_counter);
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader/writer lock protecting a value, used as the storage of guarded
/// containers.
///
/// No poisoning: a guard dropped during a panic releases the lock normally.
pub struct RwLock<T> {
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `raw`; shared readers only get `&T`.
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawRwLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires shared access, blocking while a writer holds or waits for the lock.
    ///
    /// **Locking behaviour:** Deadlock if called while the current thread
    /// holds the write guard. Also deadlocks if the current thread already
    /// holds a read guard and another thread is waiting to write, since
    /// waiting writers block new readers.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.raw.read();
        RwLockReadGuard { lock: self }
    }

    /// Acquires exclusive access.
    ///
    /// **Locking behaviour:** Deadlock if called while the current thread
    /// holds any guard of the same lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.raw.write();
        RwLockWriteGuard { lock: self }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.raw.try_read().then(|| RwLockReadGuard { lock: self })
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.raw.try_write().then(|| RwLockWriteGuard { lock: self })
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII shared access to the value of a [`RwLock`].
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.read_unlock();
    }
}

/// RAII exclusive access to the value of a [`RwLock`].
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.write_unlock();
    }
}
