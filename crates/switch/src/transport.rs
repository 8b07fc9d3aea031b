//! Datagram transport
//!
//! Sends are fire-and-forget: [`Transport::send`] queues the datagram and
//! returns immediately. The UDP implementation drains the queue from a
//! single writer task.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::telex::Telex;

/// Outbound half of the network.
pub trait Transport: Send + Sync {
    /// Queue `payload` for delivery to `to`.
    fn send(&self, to: SocketAddr, payload: Vec<u8>);
}

/// UDP transport backed by a tokio socket.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    outbound: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl UdpTransport {
    /// Spawn the writer task for `socket`. Must be called within a tokio
    /// runtime.
    pub fn spawn(socket: Arc<UdpSocket>) -> Self {
        let (outbound, mut queue) = mpsc::unbounded_channel::<(SocketAddr, Vec<u8>)>();
        tokio::spawn(async move {
            while let Some((to, payload)) = queue.recv().await {
                match socket.send_to(&payload, to).await {
                    Ok(n) => trace!(to = %to, bytes = n, "Sent datagram"),
                    Err(e) => warn!(to = %to, error = %e, "Failed to send datagram"),
                }
            }
        });
        Self { outbound }
    }
}

impl Transport for UdpTransport {
    fn send(&self, to: SocketAddr, payload: Vec<u8>) {
        if self.outbound.send((to, payload)).is_err() {
            warn!(to = %to, "Transport writer stopped, dropping datagram");
        }
    }
}

/// In-memory transport that records every datagram.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain recorded datagrams.
    pub fn take(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }

    /// Drain recorded datagrams, decoding each as a telex.
    pub fn take_telexes(&self) -> Vec<(SocketAddr, Telex)> {
        self.take()
            .into_iter()
            .filter_map(|(to, payload)| Telex::decode(&payload).ok().map(|t| (to, t)))
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, to: SocketAddr, payload: Vec<u8>) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to, payload));
        }
    }
}
