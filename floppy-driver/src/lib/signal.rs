//! A single-slot completion signal, in the manner of a task notification:
//! any number of `give`s before a `take` collapse into one, and `give` never
//! blocks, so it is safe from interrupt context.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};

/// The giving half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: SyncSender<()>,
}

/// The taking half, owned by the single task that waits on it.
#[derive(Debug)]
pub struct Waiter {
    rx: Receiver<()>,
}

/// Create a connected notifier/waiter pair.
pub fn completion() -> (Notifier, Waiter) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Notifier { tx }, Waiter { rx })
}

impl Notifier {
    /// Give the signal. Returns true if this made the signal pending, i.e. a
    /// waiter may need rescheduling; false if it was already pending or the
    /// waiter has gone away.
    pub fn give(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// Every notifier was dropped without a pending signal.
#[derive(Debug, PartialEq, Eq)]
pub struct TakeError;

impl Waiter {
    /// Block until the signal is given, then consume it.
    pub fn take(&self) -> Result<(), TakeError> {
        self.rx.recv().map_err(|_| TakeError)
    }

    /// Consume a pending signal without blocking. Returns whether there was one.
    pub fn try_take(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ntest::timeout;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_gives_collapse() {
        let (notifier, waiter) = completion();
        assert!(notifier.give());
        assert!(!notifier.give());
        assert!(!notifier.clone().give());
        waiter.take().unwrap();
        // Only one signal was held.
        assert!(!waiter.try_take());
    }

    #[test]
    #[timeout(1000)]
    fn test_cross_thread() {
        let (notifier, waiter) = completion();
        let giver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.give()
        });
        waiter.take().unwrap();
        assert!(giver.join().unwrap());
    }

    #[test]
    fn test_disconnected() {
        let (notifier, waiter) = completion();
        drop(waiter);
        assert!(!notifier.give());

        let (notifier, waiter) = completion();
        drop(notifier);
        assert_eq!(waiter.take(), Err(TakeError));
    }
}
