//! Writer-preferring reader-writer lock guarding a graph's stores and
//! matrices (spec.md §4.3, §5).
//!
//! `parking_lot::RwLock` alone does not guarantee writer preference, so
//! this wraps one with a fair admission gate: a waiting writer blocks new
//! readers from being admitted, even if the underlying `RwLock` would
//! otherwise let them proceed. Existing readers are allowed to finish.

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};

#[derive(Default)]
struct Admission {
    active_readers: usize,
    waiting_writers: usize,
    writer_active: bool,
}

pub struct GraphLock<T> {
    admission: Mutex<Admission>,
    admitted: Condvar,
    data: RwLock<T>,
}

impl<T> GraphLock<T> {
    pub fn new(value: T) -> Self {
        GraphLock {
            admission: Mutex::new(Admission::default()),
            admitted: Condvar::new(),
            data: RwLock::new(value),
        }
    }

    /// Acquire the read lock. Blocks while a writer is active or waiting.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut adm = self.admission.lock();
        while adm.writer_active || adm.waiting_writers > 0 {
            self.admitted.wait(&mut adm);
        }
        adm.active_readers += 1;
        drop(adm);

        ReadGuard { inner: self.data.read(), lock: self }
    }

    /// Acquire the write lock. Blocks until all active readers (and any
    /// earlier-arriving writer) have released.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut adm = self.admission.lock();
        adm.waiting_writers += 1;
        while adm.writer_active || adm.active_readers > 0 {
            self.admitted.wait(&mut adm);
        }
        adm.waiting_writers -= 1;
        adm.writer_active = true;
        drop(adm);

        WriteGuard { inner: self.data.write(), lock: self }
    }
}

pub struct ReadGuard<'a, T> {
    inner: RwLockReadGuard<'a, T>,
    lock: &'a GraphLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        let mut adm = self.lock.admission.lock();
        adm.active_readers -= 1;
        if adm.active_readers == 0 {
            self.lock.admitted.notify_all();
        }
    }
}

pub struct WriteGuard<'a, T> {
    inner: RwLockWriteGuard<'a, T>,
    lock: &'a GraphLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        let mut adm = self.lock.admission.lock();
        adm.writer_active = false;
        self.lock.admitted.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn multiple_readers_proceed_concurrently() {
        let lock = Arc::new(GraphLock::new(0_i32));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            handles.push(thread::spawn(move || {
                let _guard = lock.read();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = Arc::new(GraphLock::new(0_i32));
        {
            let mut guard = lock.write();
            *guard = 42;
        }
        let guard = lock.read();
        assert_eq!(*guard, 42);
    }

    #[test]
    fn waiting_writer_blocks_new_readers() {
        let lock = Arc::new(GraphLock::new(0_i32));
        let first_reader = lock.read();

        let lock2 = Arc::clone(&lock);
        let writer_done = Arc::new(AtomicUsize::new(0));
        let writer_done2 = Arc::clone(&writer_done);
        let writer = thread::spawn(move || {
            let mut guard = lock2.write();
            *guard = 7;
            writer_done2.store(1, Ordering::SeqCst);
        });

        // Give the writer a chance to register as waiting.
        thread::sleep(Duration::from_millis(30));
        drop(first_reader);
        writer.join().unwrap();
        assert_eq!(writer_done.load(Ordering::SeqCst), 1);
        assert_eq!(*lock.read(), 7);
    }
}
