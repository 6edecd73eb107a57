use crate::mode::{LockMode, ReadGuard, RwCell, Storage};
use crossbeam_channel::{Receiver, Sender};
use foldhash::fast::RandomState;
use std::collections::hash_map;
use std::collections::HashMap;
use std::thread::JoinHandle;

/// Walks a hash table inside a container while holding its read scope.
///
/// The scope is taken once in `new` and released by `stop` or on drop,
/// whichever comes first. Entries are only lent to a closure, so no reference
/// into the table can outlive the scope.
pub(crate) struct Cursor<'a, T, K, V, M>
where
    M: LockMode,
    T: 'a,
    K: 'a,
    V: 'a,
{
    // Declared before `guard` so it is dropped first.
    entries: Option<hash_map::Iter<'a, K, V>>,
    guard: Option<ReadGuard<'a, M, T>>,
}

impl<'a, T: 'a, K: 'a, V: 'a, M: LockMode> Cursor<'a, T, K, V, M> {
    pub(crate) fn new<F>(cell: &'a Storage<M, T>, table: F) -> Self
    where
        F: FnOnce(&'a T) -> &'a HashMap<K, V, RandomState>,
    {
        let guard = cell.read();
        let state: *const T = &*guard;
        // Safety: `state` points into `cell`, not into the guard, and the
        // guard keeps it shared until it is dropped after `entries`.
        let entries = table(unsafe { &*state }).iter();
        Self {
            entries: Some(entries),
            guard: Some(guard),
        }
    }

    pub(crate) fn next_with<R>(&mut self, f: impl FnOnce(&K, &V) -> R) -> Option<R> {
        let (key, value) = self.entries.as_mut()?.next()?;
        Some(f(key, value))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.len())
    }

    pub(crate) fn stop(&mut self) {
        if let Some(entries) = self.entries.take() {
            log::trace!("iteration stopped with {} entries left", entries.len());
        }
        self.guard = None;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.guard.is_none()
    }
}

/// The consumer end of a hand-off iteration.
///
/// A producer thread holds the container's read lock and passes items one by
/// one through a rendezvous channel, so it never runs ahead of the consumer.
/// The sequence ends when the producer is exhausted. Calling [`Handoff::stop`]
/// or dropping the `Handoff` disconnects the channel. The producer then
/// releases the read lock and exits.
pub struct Handoff<T> {
    receiver: Option<Receiver<T>>,
    producer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Handoff<T> {
    pub(crate) fn spawn<F>(run: F) -> Self
    where
        F: FnOnce(&Sender<T>) + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        // `sender` outlives `run`, so the channel closes only after the
        // producer has dropped its read guard.
        let producer = std::thread::spawn(move || run(&sender));
        Self {
            receiver: Some(receiver),
            producer: Some(producer),
        }
    }
}

impl<T> Handoff<T> {
    /// Stops the iteration and waits for the producer to exit.
    ///
    /// Once this returns, the producer no longer holds the read lock.
    pub fn stop(&mut self) {
        self.receiver = None;
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                log::warn!("hand-off producer panicked");
            }
        }
    }

    /// Returns `true` once the iteration has ended or been stopped.
    pub fn is_stopped(&self) -> bool {
        self.receiver.is_none()
    }
}

impl<T> Iterator for Handoff<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.receiver.as_ref()?.recv().ok();
        if item.is_none() {
            // Producer closed the channel after releasing the lock.
            self.stop();
        }
        item
    }
}

impl<T> Drop for Handoff<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sends every entry of `table` until the consumer disconnects.
pub(crate) fn produce<K, V, T>(
    table: &HashMap<K, V, RandomState>,
    sender: &Sender<T>,
    item: impl Fn(&K, &V) -> T,
) {
    let mut sent = 0usize;
    for (key, value) in table {
        if sender.send(item(key, value)).is_err() {
            log::debug!(
                "hand-off consumer left after {} of {} entries",
                sent,
                table.len()
            );
            return;
        }
        sent += 1;
    }
    log::trace!("hand-off producer exhausted after {} entries", sent);
}
