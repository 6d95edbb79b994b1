//! Lock-guarded buffer handle shared between graph walks and interrupt-side code.
//!
//! A [`SharedBuffer`] is a cloneable handle to one [`CircularBuffer`]. Every
//! cursor mutation takes the lock, updates the cursors and derived counts,
//! publishes the notification and only then releases the lock, so a
//! concurrent producer on another thread never observes a half-updated
//! control block. The lock is released on every exit path by the guard.
//!
//! Buffers flagged [`shared`](crate::BufferCaps::shared) publish with
//! [`NotifyScope::AllCores`]; all others stay core-local.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::{CircularBuffer, Transaction};
use crate::error::BufferError;
use crate::format::StreamParams;
use crate::notify::{BufferEvent, Notifier, NotifyScope};

/// Cloneable, lock-guarded handle to a [`CircularBuffer`].
#[derive(Clone)]
pub struct SharedBuffer {
    id: u32,
    inner: Arc<Mutex<CircularBuffer>>,
    notifier: Arc<dyn Notifier>,
}

impl SharedBuffer {
    /// Wraps `buffer` under host id `id`, publishing through `notifier`.
    pub fn new(id: u32, buffer: CircularBuffer, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(buffer)),
            notifier,
        }
    }

    /// Host id used in notifications.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Locks the buffer for direct inspection.
    ///
    /// Cursor changes made through the guard are not published; use
    /// [`produce`](Self::produce) and [`consume`](Self::consume) for that.
    pub fn lock(&self) -> MutexGuard<'_, CircularBuffer> {
        self.inner.lock()
    }

    /// Advances the write cursor and publishes the transaction.
    pub fn produce(&self, bytes: usize) -> Option<Transaction> {
        let mut buf = self.inner.lock();
        let txn = buf.produce(bytes)?;
        self.publish(&buf, BufferEvent::Produce {
            buffer: self.id,
            begin: txn.begin,
            bytes: txn.bytes,
        });
        Some(txn)
    }

    /// Advances the read cursor and publishes the transaction.
    pub fn consume(&self, bytes: usize) -> Option<Transaction> {
        let mut buf = self.inner.lock();
        let txn = buf.consume(bytes)?;
        self.publish(&buf, BufferEvent::Consume {
            buffer: self.id,
            begin: txn.begin,
            bytes: txn.bytes,
        });
        Some(txn)
    }

    /// Writes as much of `data` as fits and produces it. Returns bytes written.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut buf = self.inner.lock();
        let bytes = buf.fill(data);
        if let Some(txn) = buf.produce(bytes) {
            self.publish(&buf, BufferEvent::Produce {
                buffer: self.id,
                begin: txn.begin,
                bytes: txn.bytes,
            });
        }
        bytes
    }

    /// Reads up to `out.len()` available bytes and consumes them. Returns bytes read.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut buf = self.inner.lock();
        let bytes = buf.peek(out);
        if let Some(txn) = buf.consume(bytes) {
            self.publish(&buf, BufferEvent::Consume {
                buffer: self.id,
                begin: txn.begin,
                bytes: txn.bytes,
            });
        }
        bytes
    }

    /// Bytes ready to be read.
    pub fn avail(&self) -> usize {
        self.inner.lock().avail()
    }

    /// Bytes ready to be written.
    pub fn free(&self) -> usize {
        self.inner.lock().free()
    }

    /// Snapshot of the stream format metadata.
    pub fn params(&self) -> StreamParams {
        *self.inner.lock().params()
    }

    /// Replaces the stream format metadata.
    pub fn set_params(&self, params: StreamParams) {
        self.inner.lock().set_params(params);
    }

    /// Rewinds the cursors and clears the contents.
    pub fn reset_pos(&self) {
        self.inner.lock().reset_pos();
    }

    /// Resizes the underlying buffer.
    pub fn resize(&self, capacity: usize) -> Result<(), BufferError> {
        self.inner.lock().resize(capacity)
    }

    /// Publishes the "about to be freed" event and detaches every observer.
    pub(crate) fn announce_free(&self) {
        let scope = self.scope(&self.inner.lock());
        self.notifier.publish(&BufferEvent::Free { buffer: self.id }, scope);
        self.notifier.unregister_all(self.id);
    }

    fn publish(&self, buf: &CircularBuffer, event: BufferEvent) {
        self.notifier.publish(&event, self.scope(buf));
    }

    fn scope(&self, buf: &CircularBuffer) -> NotifyScope {
        if buf.caps().shared {
            NotifyScope::AllCores
        } else {
            NotifyScope::CoreLocal
        }
    }
}

impl core::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.id)
            .field("buffer", &*self.inner.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationBus;

    fn shared(capacity: usize) -> (SharedBuffer, Arc<NotificationBus>) {
        let bus = NotificationBus::shared();
        let buf = CircularBuffer::allocate(capacity, 8).unwrap();
        (SharedBuffer::new(5, buf, bus.clone()), bus)
    }

    #[test]
    fn test_produce_publishes_transaction() {
        let (buf, bus) = shared(64);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe(Some(5), move |ev, scope| s.lock().push((*ev, scope)));

        buf.produce(16);
        buf.consume(8);
        buf.produce(0);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            (
                BufferEvent::Produce { buffer: 5, begin: 0, bytes: 16 },
                NotifyScope::CoreLocal
            )
        );
        assert!(matches!(seen[1].0, BufferEvent::Consume { begin: 0, bytes: 8, .. }));
    }

    #[test]
    fn test_shared_flag_widens_scope() {
        let (buf, bus) = shared(64);
        buf.lock().set_shared(true);
        let scopes = Arc::new(Mutex::new(Vec::new()));
        let s = scopes.clone();
        bus.subscribe(None, move |_, scope| s.lock().push(scope));

        buf.write(&[1, 2, 3]);
        assert_eq!(scopes.lock().as_slice(), &[NotifyScope::AllCores]);
    }

    #[test]
    fn test_write_then_read() {
        let (buf, _bus) = shared(8);
        assert_eq!(buf.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9]), 8);
        assert_eq!(buf.free(), 0);

        let mut out = [0u8; 5];
        assert_eq!(buf.read(&mut out), 5);
        assert_eq!(out, [1, 2, 3, 4, 5]);
        assert_eq!(buf.avail(), 3);
    }

    #[test]
    fn test_announce_free_detaches_observers() {
        let (buf, bus) = shared(8);
        let freed = Arc::new(Mutex::new(false));
        let f = freed.clone();
        bus.subscribe(Some(5), move |ev, _| {
            if matches!(ev, BufferEvent::Free { .. }) {
                *f.lock() = true;
            }
        });

        buf.announce_free();
        assert!(*freed.lock());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let (buf, _bus) = shared(32);
        let other = buf.clone();
        other.produce(12);
        assert_eq!(buf.avail(), 12);
    }
}
