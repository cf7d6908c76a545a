// crates/sync-types/src/queue.rs
//
// Fixed-capacity FIFO shared between a demuxer/decoder producer and a
// decoder/pull-API consumer (spec.md §4.1).
//
// Deliberately asymmetric: `write` blocks the caller when full, but `read`
// and `peek` never block on emptiness — they return `None` immediately.
// Video and audio pull APIs are called from host callbacks (the audio
// device thread, the vsync/refresh thread) that must never stall; the
// demuxer, by contrast, is allowed to sleep indefinitely waiting for a slow
// decoder to drain.
//
// The original C implementation threaded a free-callback through every
// buffer so `clear()` could release pointers it didn't understand the
// layout of. Rust's `Drop` does that automatically — `clear()` below is
// just `VecDeque::clear()` — so no callback parameter is needed here.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    Partial,
    Full,
}

struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
}

pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
            }),
            not_full: Condvar::new(),
        }
    }

    /// Blocks on the "not-full" condition while the queue is at capacity,
    /// then enqueues. Returns `false` only if the mutex was poisoned.
    pub fn write(&self, item: T) -> bool {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return false,
        };
        while guard.items.len() >= guard.capacity {
            guard = match self.not_full.wait(guard) {
                Ok(g) => g,
                Err(_) => return false,
            };
        }
        guard.items.push_back(item);
        true
    }

    /// Like `write`, but gives up and returns the item back if the queue
    /// stays full past `wake`'s next check — used by writers that must be
    /// interruptible by a lifecycle transition to `Closing` rather than
    /// block forever on a queue nobody will ever drain again. Re-checks
    /// `should_continue` each time it wakes from the condvar.
    pub fn write_while(&self, item: T, should_continue: impl Fn() -> bool) -> Result<bool, T> {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return Err(item),
        };
        while guard.items.len() >= guard.capacity {
            if !should_continue() {
                return Err(item);
            }
            let (g, timeout) = match self
                .not_full
                .wait_timeout(guard, std::time::Duration::from_millis(20))
            {
                Ok(r) => r,
                Err(_) => return Err(item),
            };
            guard = g;
            let _ = timeout;
        }
        guard.items.push_back(item);
        Ok(true)
    }

    /// Never blocks. Returns `None` on an empty queue.
    pub fn read(&self) -> Option<T> {
        let mut guard = self.inner.lock().ok()?;
        let item = guard.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Non-destructive head read. Never blocks. `f` runs under the lock so
    /// it can report whether a head item exists without cloning it.
    pub fn peek_front<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.inner.lock().expect("BoundedQueue mutex poisoned");
        f(guard.items.front())
    }

    /// Non-destructive, *mutable* head access. The audio pull API (spec.md
    /// §4.3 step 5) needs this: after copying part of a packet's ring
    /// buffer out, it advances that packet's PTS in place so the next peek
    /// reflects the consumed portion, without dequeuing it.
    pub fn with_front_mut<R>(&self, f: impl FnOnce(Option<&mut T>) -> R) -> R {
        let mut guard = self.inner.lock().expect("BoundedQueue mutex poisoned");
        f(guard.items.front_mut())
    }

    /// Equivalent to `read()` but discards the item.
    pub fn advance(&self) {
        self.read();
    }

    /// Drops every queued item (via normal `Drop`) and wakes any writer
    /// blocked on `write`.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.items.clear();
        }
        self.not_full.notify_all();
    }

    /// Wakes every writer blocked on `write` without touching contents.
    /// Used during teardown (spec.md §4.2/§5): broadcast before join so a
    /// writer parked on a full queue observes the `Closing` state instead
    /// of blocking forever.
    pub fn notify_all(&self) {
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> QueueState {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return QueueState::Empty,
        };
        if guard.items.is_empty() {
            QueueState::Empty
        } else if guard.items.len() >= guard.capacity {
            QueueState::Full
        } else {
            QueueState::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn count_invariant_holds_through_write_read() {
        let q: BoundedQueue<i32> = BoundedQueue::new(3);
        assert_eq!(q.state(), QueueState::Empty);
        q.write(1);
        q.write(2);
        assert_eq!(q.state(), QueueState::Partial);
        q.write(3);
        assert_eq!(q.state(), QueueState::Full);
        assert_eq!(q.read(), Some(1));
        assert_eq!(q.state(), QueueState::Partial);
    }

    #[test]
    fn read_and_peek_never_block_on_empty() {
        let q: BoundedQueue<i32> = BoundedQueue::new(1);
        assert_eq!(q.read(), None);
        assert_eq!(q.peek_front(|h| h.copied()), None);
    }

    #[test]
    fn with_front_mut_edits_head_in_place() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.write(10);
        q.with_front_mut(|h| {
            if let Some(v) = h {
                *v += 5;
            }
        });
        assert_eq!(q.peek_front(|h| h.copied()), Some(15));
        assert_eq!(q.read(), Some(15));
    }

    #[test]
    fn clear_drops_everything_and_wakes_writer() {
        let q: BoundedQueue<i32> = BoundedQueue::new(1);
        q.write(42);

        let q = Arc::new(q);
        let q2 = Arc::clone(&q);
        let unblocked = Arc::new(AtomicBool::new(false));
        let unblocked2 = Arc::clone(&unblocked);

        let writer = thread::spawn(move || {
            q2.write(7); // blocks: queue already full
            unblocked2.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!unblocked.load(Ordering::SeqCst));

        q.clear();
        writer.join().unwrap();
        assert!(unblocked.load(Ordering::SeqCst));
    }

    #[test]
    fn full_producer_blocks_until_drained() {
        let q = Arc::new(BoundedQueue::<i32>::new(1));
        q.write(1);

        let q2 = Arc::clone(&q);
        let done = Arc::new(AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let writer = thread::spawn(move || {
            q2.write(2);
            done2.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!done.load(Ordering::SeqCst), "write should block while full");

        assert_eq!(q.read(), Some(1));
        writer.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(q.read(), Some(2));
    }

    #[test]
    fn write_while_gives_up_when_told_to_stop() {
        let q: BoundedQueue<i32> = BoundedQueue::new(1);
        q.write(1); // full — write_while below will never find room
        let result = q.write_while(2, || false);
        assert_eq!(result, Err(2));
    }
}
