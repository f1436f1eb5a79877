//! Fixed pool of reusable text buffers
//!
//! Background producers (receive loop, status timer) check a message out,
//! write into it and hand it to the UI thread through the render queue.
//! The UI thread reads the text and releases the message. Buffers are
//! allocated once at construction and never grow.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of messages in the pool
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Default capacity of a single message in bytes
pub const DEFAULT_MESSAGE_CAPACITY: usize = 1024;

struct Slot {
    in_use: AtomicBool,
    text: Mutex<String>,
}

struct PoolInner {
    slots: Vec<Slot>,
    capacity: usize,
    dropped: AtomicUsize,
}

/// A fixed-size set of text buffers shared between producer threads and the UI
#[derive(Clone)]
pub struct MessagePool {
    inner: Arc<PoolInner>,
}

impl MessagePool {
    /// Create a pool of `size` messages, each able to hold `capacity` bytes
    pub fn new(size: usize, capacity: usize) -> Self {
        let slots = (0..size.max(1))
            .map(|_| Slot {
                in_use: AtomicBool::new(false),
                text: Mutex::new(String::with_capacity(capacity)),
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                slots,
                capacity,
                dropped: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out the first free message.
    ///
    /// Returns `None` when every message is outstanding. Callers treat that as
    /// a dropped update; the pool counts it for diagnostics.
    pub fn checkout(&self) -> Option<PooledMessage> {
        for (id, slot) in self.inner.slots.iter().enumerate() {
            if slot
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                slot.text.lock().clear();
                return Some(PooledMessage {
                    pool: self.inner.clone(),
                    id,
                    released: false,
                });
            }
        }

        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("message pool exhausted, update dropped");
        None
    }

    /// Return a message to the pool
    pub fn release(&self, mut msg: PooledMessage) {
        msg.release_slot();
    }

    /// Number of messages in the pool
    pub fn size(&self) -> usize {
        self.inner.slots.len()
    }

    /// Capacity of each message in bytes
    pub fn message_capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of messages currently checked out
    pub fn outstanding(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|s| s.in_use.load(Ordering::Acquire))
            .count()
    }

    /// Number of updates dropped because the pool was exhausted
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// A message checked out of a [`MessagePool`].
///
/// Only the holder can write to it. Dropping the message releases it.
pub struct PooledMessage {
    pool: Arc<PoolInner>,
    id: usize,
    released: bool,
}

impl PooledMessage {
    /// Identity of the underlying buffer
    pub fn id(&self) -> usize {
        self.id
    }

    /// Replace the content, truncating at the message capacity.
    ///
    /// Returns the number of bytes of `text` that were stored.
    pub fn write(&mut self, text: &str) -> usize {
        let mut buf = self.pool.slots[self.id].text.lock();
        buf.clear();
        let n = floor_char_boundary(text, self.pool.capacity);
        buf.push_str(&text[..n]);
        n
    }

    /// Append to the content, truncating at the message capacity.
    ///
    /// Returns the number of bytes of `text` that were stored.
    pub fn append(&mut self, text: &str) -> usize {
        let mut buf = self.pool.slots[self.id].text.lock();
        let room = self.pool.capacity.saturating_sub(buf.len());
        let n = floor_char_boundary(text, room);
        buf.push_str(&text[..n]);
        n
    }

    /// Copy of the current content
    pub fn text(&self) -> String {
        self.pool.slots[self.id].text.lock().clone()
    }

    /// Run `f` with the content borrowed
    pub fn with_text<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let buf = self.pool.slots[self.id].text.lock();
        f(buf.as_str())
    }

    fn release_slot(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.slots[self.id].in_use.store(false, Ordering::Release);
        }
    }
}

impl Drop for PooledMessage {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl std::fmt::Debug for PooledMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledMessage").field("id", &self.id).finish()
    }
}

/// Largest index `<= max` that lies on a char boundary of `s`
pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_checkout_exhausts_pool() {
        let pool = MessagePool::new(3, 16);
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        let c = pool.checkout().unwrap();
        assert!(pool.checkout().is_none());
        assert_eq!(pool.dropped(), 1);
        assert_eq!(pool.outstanding(), 3);

        let ids: HashSet<usize> = [a.id(), b.id(), c.id()].into_iter().collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_release_makes_message_available_again() {
        let pool = MessagePool::new(2, 16);
        let a = pool.checkout().unwrap();
        let _b = pool.checkout().unwrap();
        let id = a.id();
        pool.release(a);

        let again = pool.checkout().unwrap();
        assert_eq!(again.id(), id);
        assert!(pool.checkout().is_none());
    }

    #[test]
    fn test_checkout_clears_previous_content() {
        let pool = MessagePool::new(1, 16);
        let mut msg = pool.checkout().unwrap();
        msg.write("stale");
        drop(msg);

        let msg = pool.checkout().unwrap();
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_write_truncates_on_char_boundary() {
        let pool = MessagePool::new(1, 5);
        let mut msg = pool.checkout().unwrap();
        // 'é' is two bytes; the third one would straddle the limit
        assert_eq!(msg.write("abcé!"), 5);
        assert_eq!(msg.text(), "abcé");

        let mut msg2 = pool.checkout();
        assert!(msg2.is_none());
        drop(msg);
        msg2 = pool.checkout();
        let mut msg2 = msg2.unwrap();
        assert_eq!(msg2.write("ab"), 2);
        assert_eq!(msg2.append("cdefg"), 3);
        assert_eq!(msg2.text(), "abcde");
    }

    #[test]
    fn test_outstanding_ids_never_collide_across_threads() {
        let pool = MessagePool::new(4, 8);
        let seen = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let seen = seen.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(msg) = pool.checkout() {
                            assert!(seen.lock().insert(msg.id()), "buffer handed out twice");
                            seen.lock().remove(&msg.id());
                            drop(msg);
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_random_checkout_release_sequence() {
        let pool = MessagePool::new(4, 8);
        let mut held: Vec<PooledMessage> = Vec::new();
        // Deterministic pseudo-random walk over checkout/release
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..1000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 == 0 && !held.is_empty() {
                let idx = (seed as usize / 3) % held.len();
                pool.release(held.swap_remove(idx));
            } else if let Some(msg) = pool.checkout() {
                assert!(held.iter().all(|m| m.id() != msg.id()));
                held.push(msg);
            } else {
                assert_eq!(held.len(), pool.size());
            }
        }
    }
}
