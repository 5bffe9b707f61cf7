//! Delivery Channel: pushes shaped payloads to client connections.
//!
//! Each connection owns a bounded outbound queue. The transport task serving
//! the connection holds the receiving end and writes whatever arrives to the
//! wire, so per-connection order is the order payloads were queued in.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DeliveryError;
use crate::registry::{ConnectionId, SubscriptionHandle, SubscriptionId};

/// Push callback toward the transport layer.
pub trait DeliveryChannel: Send + Sync {
    fn deliver(
        &self,
        handle: SubscriptionHandle,
        payload: serde_json::Value,
    ) -> Result<(), DeliveryError>;
}

/// One payload queued for a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    pub subscription: SubscriptionId,
    pub payload: serde_json::Value,
}

/// Table of open connections and their outbound queues.
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::Sender<Outbound>>,
    buffer: usize,
}

impl ConnectionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Open a connection. The receiver belongs to the task serving it.
    pub fn open(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(id, tx);
        tracing::info!(connection = %id, buffer = self.buffer, "Connection opened");
        (id, rx)
    }

    /// Close a connection. Payloads still queued are dropped with the receiver.
    pub fn close(&self, id: ConnectionId) -> bool {
        let closed = self.connections.remove(&id).is_some();
        if closed {
            tracing::info!(connection = %id, "Connection closed");
        }
        closed
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl DeliveryChannel for ConnectionHub {
    fn deliver(
        &self,
        handle: SubscriptionHandle,
        payload: serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let tx = self
            .connections
            .get(&handle.connection)
            .map(|entry| entry.value().clone())
            .ok_or(DeliveryError::UnknownConnection(handle.connection))?;

        let outbound = Outbound {
            subscription: handle.id,
            payload,
        };
        match tx.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::QueueFull(handle.connection)),
            Err(TrySendError::Closed(_)) => {
                // The receiving task is gone; forget the connection.
                self.connections.remove(&handle.connection);
                Err(DeliveryError::Closed(handle.connection))
            }
        }
    }
}
