// Single-slot, latest-wins hand-off between the capture thread and a session task

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Result of a `publish` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Slot was empty
    Stored,
    /// An unconsumed value was overwritten
    Replaced,
    /// The consumer side is gone; the value was dropped
    Closed,
}

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

struct SlotInner<T> {
    state: Mutex<SlotState<T>>,
    notify: Notify,
}

/// Latest-wins slot with one writer and one reader.
///
/// `publish` never blocks and may be called from a plain OS thread. `take`
/// suspends the calling task until a value is published or the slot closes.
pub struct FrameSlot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for FrameSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                state: Mutex::new(SlotState {
                    value: None,
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // Critical sections never panic mid-update
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, replacing anything the reader has not taken yet
    pub fn publish(&self, value: T) -> Publish {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Publish::Closed;
            }
            match state.value.replace(value) {
                Some(_) => Publish::Replaced,
                None => Publish::Stored,
            }
        };
        self.inner.notify.notify_one();
        outcome
    }

    /// Wait for the next value.
    ///
    /// Returns `None` once the slot is closed and drained. Never returns
    /// before the first publish.
    pub async fn take(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.lock();
                if let Some(value) = state.value.take() {
                    return Some(value);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the current value without waiting
    pub fn try_take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Close the slot. A pending value can still be taken once.
    pub fn close(&self) {
        self.lock().closed = true;
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_latest_value_wins() {
        let slot = FrameSlot::new();
        assert_eq!(slot.publish(1), Publish::Stored);
        assert_eq!(slot.publish(2), Publish::Replaced);

        assert_eq!(slot.take().await, Some(2));
        // The overwritten value is never observable
        assert_eq!(slot.try_take(), None);
    }

    #[tokio::test]
    async fn test_take_waits_for_first_publish() {
        let slot: FrameSlot<u32> = FrameSlot::new();
        let early = tokio::time::timeout(Duration::from_millis(50), slot.take()).await;
        assert!(early.is_err(), "take returned before anything was published");

        let producer = slot.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.publish(7);
        });

        let value = tokio::time::timeout(Duration::from_secs(2), slot.take()).await;
        assert_eq!(value.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let slot = FrameSlot::new();
        slot.publish("last");
        slot.close();

        assert!(slot.is_closed());
        assert_eq!(slot.publish("late"), Publish::Closed);
        assert_eq!(slot.take().await, Some("last"));
        assert_eq!(slot.take().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_reader() {
        let slot: FrameSlot<u8> = FrameSlot::new();
        let reader = slot.clone();
        let waiter = tokio::spawn(async move { reader.take().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.close();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter).await;
        assert_eq!(result.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_arrive_in_publish_order() {
        let slot = FrameSlot::new();
        let producer = slot.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..500u32 {
                producer.publish(i);
            }
            producer.close();
        });

        let mut last = None;
        while let Some(value) = slot.take().await {
            if let Some(prev) = last {
                assert!(value > prev);
            }
            last = Some(value);
        }
        handle.join().unwrap();
        assert_eq!(last, Some(499));
    }
}
