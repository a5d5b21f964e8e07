//! Delivery of opaque CRDT updates to collaborators.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Outbound side of the replication service. The binding never looks inside
/// the bytes it hands over.
pub trait UpdateTransport: Send + Sync {
    fn is_open(&self) -> bool;

    fn send(&self, update: Vec<u8>) -> Result<(), TransportError>;
}

/// In-process transport that keeps every update it is given.
#[derive(Debug)]
pub struct MemoryTransport {
    open: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    pub fn reopen(&self) {
        self.open.store(true, Ordering::Relaxed);
    }

    /// Drain the updates sent so far.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateTransport for MemoryTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn send(&self, update: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_transport_refuses_updates() {
        let transport = MemoryTransport::new();
        transport.send(vec![1]).unwrap();
        transport.close();
        assert_eq!(transport.send(vec![2]), Err(TransportError::Closed));
        transport.reopen();
        transport.send(vec![3]).unwrap();
        assert_eq!(transport.take(), vec![vec![1], vec![3]]);
        assert!(transport.is_empty());
    }
}
