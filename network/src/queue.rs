//! Bounded message queues with observable depth.
//!
//! Admission control and resend throttling read queue depth, so every
//! queue counts what it holds. A queue has exactly one consumer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::NetworkError;

/// Producer half. Cheap to clone.
pub struct QueueSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
            capacity: self.capacity,
        }
    }
}

/// Consumer half.
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    depth: Arc<AtomicUsize>,
}

/// Create a named queue holding at most `capacity` items.
pub fn bounded<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            name,
            tx,
            depth: Arc::clone(&depth),
            capacity,
        },
        QueueReceiver { rx, depth },
    )
}

impl<T> QueueSender<T> {
    /// Enqueue without waiting.
    pub fn try_push(&self, item: T) -> Result<(), NetworkError> {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(NetworkError::QueueFull {
                queue: self.name,
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NetworkError::ChannelClosed),
        }
    }

    /// Enqueue, waiting for room.
    pub async fn push(&self, item: T) -> Result<(), NetworkError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        self.depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> QueueReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(item)
    }

    pub fn try_recv(&mut self) -> Option<T> {
        let item = self.rx.try_recv().ok()?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
