//! Unbuffered handoff queue.
//!
//! A `send` completes only once a receiver has actually taken the item, so
//! a fast producer is throttled to the pace of its slowest consumer. Tokio
//! channels need a capacity of at least one, so the rendezvous is built the
//! other way round: a waiting receiver parks a oneshot slot on a shared
//! queue, and a sender fills the first slot whose owner is still waiting.
//!
//! `send` is cancellation safe: until it completes it holds the item, and
//! a slot it fills is never taken back. `recv` is not. A `recv` dropped
//! before any sender reached its slot loses nothing, since the next
//! sender skips the orphaned slot. But once a sender has filled the slot,
//! that `send` has already returned `Ok` and dropping the `recv` drops
//! the item with it. Only await `recv` to completion; never race it in
//! `select!`.

use crate::error::SendError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

type Slot<T> = oneshot::Sender<T>;

/// Create a connected sender/receiver pair.
pub fn handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (slots_tx, slots_rx) = async_channel::unbounded();
    (
        HandoffSender {
            shared: Arc::new(SenderShared { slots: slots_rx }),
        },
        HandoffReceiver { slots: slots_tx },
    )
}

struct SenderShared<T> {
    slots: async_channel::Receiver<Slot<T>>,
}

impl<T> SenderShared<T> {
    fn close(&self) -> bool {
        let newly_closed = self.slots.close();
        // Dropping the parked slots wakes every receiver still waiting.
        while self.slots.try_recv().is_ok() {}
        newly_closed
    }
}

impl<T> Drop for SenderShared<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Producer end. Cloning shares the same queue.
pub struct HandoffSender<T> {
    shared: Arc<SenderShared<T>>,
}

impl<T> HandoffSender<T> {
    /// Wait for a receiver and hand `item` to it.
    ///
    /// Fails, returning the item, once the queue is closed or every
    /// receiver has been dropped.
    pub async fn send(&self, mut item: T) -> Result<(), SendError<T>> {
        loop {
            let slot = match self.shared.slots.recv().await {
                Ok(slot) => slot,
                Err(_) => return Err(SendError(item)),
            };
            match slot.send(item) {
                Ok(()) => return Ok(()),
                // That receiver gave up; try the next one.
                Err(back) => item = back,
            }
        }
    }

    /// Close the queue. Pending and future receives yield `None`.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slots.is_closed()
    }
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for HandoffSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer end. Cloning shares the same queue.
pub struct HandoffReceiver<T> {
    slots: async_channel::Sender<Slot<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Wait for the next item. `None` once the queue is closed.
    ///
    /// Not cancellation safe: see the module docs.
    pub async fn recv(&self) -> Option<T> {
        let (slot, item) = oneshot::channel();
        self.slots.try_send(slot).ok()?;
        item.await.ok()
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<T> fmt::Debug for HandoffReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffReceiver")
            .field("closed", &self.is_closed())
            .finish()
    }
}
