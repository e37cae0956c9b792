//! Fixed-capacity pool of execution slots.

use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::error::{WorkerError, WorkerResult};

/// Signal delivered to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A job was enqueued
    Submitted,
    /// A slot was returned to the pool
    SlotReleased,
}

/// Bounds the number of simultaneous transcodes.
#[derive(Debug)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    wake: Option<mpsc::UnboundedSender<Wake>>,
}

impl SlotPool {
    /// Pool that does not notify anyone on release.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            wake: None,
        }
    }

    /// Pool whose slots send [`Wake::SlotReleased`] when dropped.
    pub fn with_wake(capacity: usize, wake: mpsc::UnboundedSender<Wake>) -> Self {
        Self {
            wake: Some(wake),
            ..Self::new(capacity)
        }
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Option<ExecutionSlot> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.slot(permit))
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> WorkerResult<ExecutionSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::DispatcherUnavailable)?;
        Ok(self.slot(permit))
    }

    fn slot(&self, permit: OwnedSemaphorePermit) -> ExecutionSlot {
        ExecutionSlot {
            permit: Some(permit),
            wake: self.wake.clone(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Stop handing out slots; pending `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// One unit of capacity. Returned to the pool exactly once, on drop.
#[derive(Debug)]
pub struct ExecutionSlot {
    permit: Option<OwnedSemaphorePermit>,
    wake: Option<mpsc::UnboundedSender<Wake>>,
}

impl ExecutionSlot {
    /// Return the slot without waking the dispatcher.
    pub fn release_quietly(mut self) {
        self.wake = None;
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        // Free capacity before the dispatcher looks for it.
        drop(self.permit.take());
        if let Some(wake) = self.wake.take() {
            let _ = wake.send(Wake::SlotReleased);
        }
    }
}
