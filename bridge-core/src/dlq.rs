//! The bounded dead-letter queue (C1).
//!
//! Generic over the envelope's id/target types so this crate stays
//! independent of `bridge-types`, the same way a small algorithmic crate
//! stays independent of the wire-types crate sitting above it.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// An envelope wrapping an undeliverable message.
#[derive(Debug, Clone)]
pub struct DeadLetter<Id, Target, Msg> {
    /// The id of the undeliverable message.
    pub message_id: Id,
    /// The routing target that could not be reached.
    pub target: Target,
    /// The message itself.
    pub message: Msg,
    /// Why delivery failed (e.g. `"Target not connected"`).
    pub reason: String,
    /// Number of delivery attempts recorded so far (starts at 1).
    pub attempts: u32,
    /// When this letter was first enqueued.
    pub enqueued_at: Instant,
}

/// Bounded FIFO of [`DeadLetter`]s with overflow eviction and
/// permanent-failure callbacks.
pub struct DeadLetterQueue<Id, Target, Msg> {
    inner: Mutex<VecDeque<DeadLetter<Id, Target, Msg>>>,
    capacity: usize,
    max_attempts: u32,
    overflow_dropped: Mutex<u64>,
    on_permanent_failure: Arc<dyn Fn(&DeadLetter<Id, Target, Msg>) + Send + Sync>,
}

impl<Id, Target, Msg> DeadLetterQueue<Id, Target, Msg>
where
    Id: Eq + Clone,
    Target: Eq + Hash + Clone,
{
    /// Creates a queue bounded to `capacity` letters, treating `max_attempts`
    /// as the threshold at which a letter is evicted and
    /// `on_permanent_failure` fires exactly once.
    pub fn new(
        capacity: usize,
        max_attempts: u32,
        on_permanent_failure: impl Fn(&DeadLetter<Id, Target, Msg>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            max_attempts,
            overflow_dropped: Mutex::new(0),
            on_permanent_failure: Arc::new(on_permanent_failure),
        }
    }

    /// Enqueues `message` addressed to `target`. If a letter for the same
    /// `(message_id, target)` pair already exists, increments its attempt
    /// counter instead of appending a duplicate; once attempts reach
    /// `max_attempts` the letter is evicted and the permanent-failure
    /// callback fires exactly once. On capacity overflow the oldest letter
    /// is dropped silently (tracked via [`DeadLetterQueue::overflow_dropped`]).
    pub fn enqueue(&self, message_id: Id, target: Target, message: Msg, reason: impl Into<String>)
    where
        Msg: Clone,
    {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner
            .iter()
            .position(|letter| letter.message_id == message_id && letter.target == target)
        {
            let exhausted = {
                let existing = &mut inner[pos];
                existing.attempts += 1;
                existing.reason = reason.into();
                existing.attempts >= self.max_attempts
            };
            if exhausted {
                let letter = inner.remove(pos).expect("position came from this deque");
                drop(inner);
                (self.on_permanent_failure)(&letter);
            }
            return;
        }

        if inner.len() == self.capacity {
            inner.pop_front();
            *self.overflow_dropped.lock() += 1;
        }
        inner.push_back(DeadLetter {
            message_id,
            target,
            message,
            reason: reason.into(),
            attempts: 1,
            enqueued_at: Instant::now(),
        });
    }

    /// Returns the number of letters currently enqueued.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if the queue holds no letters.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the number of letters dropped due to capacity overflow since
    /// construction.
    pub fn overflow_dropped(&self) -> u64 {
        *self.overflow_dropped.lock()
    }
}

impl<Id, Target, Msg: Clone> DeadLetterQueue<Id, Target, Msg> {
    /// Returns a snapshot of every currently enqueued letter, oldest first.
    pub fn snapshot(&self) -> Vec<DeadLetter<Id, Target, Msg>> {
        self.inner.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn enqueue_then_overflow_drops_oldest() {
        let dlq: DeadLetterQueue<&str, &str, &str> = DeadLetterQueue::new(2, 10, |_| {});
        dlq.enqueue("m1", "doctor", "payload-1", "Target not connected");
        dlq.enqueue("m2", "doctor", "payload-2", "Target not connected");
        dlq.enqueue("m3", "doctor", "payload-3", "Target not connected");
        assert_eq!(dlq.len(), 2);
        assert_eq!(dlq.overflow_dropped(), 1);
        let ids: Vec<_> = dlq.snapshot().into_iter().map(|l| l.message_id).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
    }

    #[test]
    fn repeated_enqueue_increments_attempts_and_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let dlq: DeadLetterQueue<&str, &str, &str> =
            DeadLetterQueue::new(10, 3, move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            });
        dlq.enqueue("m1", "doctor", "payload", "Target not connected");
        dlq.enqueue("m1", "doctor", "payload", "Target not connected");
        assert_eq!(dlq.len(), 1);
        dlq.enqueue("m1", "doctor", "payload", "Target not connected");
        assert_eq!(dlq.len(), 0, "letter evicted once attempts reach max");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_targets_do_not_share_a_letter() {
        let dlq: DeadLetterQueue<&str, &str, &str> = DeadLetterQueue::new(10, 5, |_| {});
        dlq.enqueue("m1", "doctor", "payload", "Target not connected");
        dlq.enqueue("m1", "igor", "payload", "Target not connected");
        assert_eq!(dlq.len(), 2);
    }
}
