//! Node runtime - binds the UDP socket and drives a [`Switch`]
//!
//! Two tasks run per node: a receive loop feeding datagrams into
//! [`Switch::receive`] and a timer running the liveness sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hashline_core::Config;

use crate::error::SwitchResult;
use crate::line::unix_now;
use crate::switch::Switch;
use crate::transport::UdpTransport;

/// Largest datagram accepted.
const RECV_BUFFER_LEN: usize = 64 * 1024;

/// A bound but not yet running switch.
pub struct Node {
    config: Config,
    socket: Arc<UdpSocket>,
    switch: Arc<Switch>,
}

impl Node {
    /// Bind the configured address and build a switch with the default
    /// handlers on top of it.
    pub async fn bind(config: Config) -> SwitchResult<Self> {
        let bind_addr = config.network.bind_socket_addr()?;
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let transport = Arc::new(UdpTransport::spawn(socket.clone()));
        let switch = Arc::new(Switch::from_config(transport, &config)?);
        info!(local_addr = %socket.local_addr()?, "Node bound");
        Ok(Self {
            config,
            socket,
            switch,
        })
    }

    pub fn local_addr(&self) -> SwitchResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn switch(&self) -> Arc<Switch> {
        self.switch.clone()
    }

    /// Seed and spawn the receive and sweep loops.
    ///
    /// Without a configured seed the node seeds itself and becomes the
    /// first switch of a new network. A wildcard bind address cannot be
    /// seeded against, so set `seed` explicitly when binding `0.0.0.0`.
    pub fn start(self) -> SwitchResult<NodeHandle> {
        let seed = match self.config.network.seed_socket_addr()? {
            Some(seed) => seed,
            None => self.local_addr()?,
        };
        self.switch.seed(seed)?;

        let receiver = tokio::spawn(receive_loop(self.socket.clone(), self.switch.clone()));

        let liveness = self.config.liveness.clone();
        let switch = self.switch.clone();
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(liveness.scan_interval_secs.max(1)));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = switch.scan_lines(unix_now(), liveness.line_timeout_secs) {
                    error!(error = %e, "Liveness sweep failed");
                }
            }
        });

        Ok(NodeHandle {
            switch: self.switch,
            local_addr: self.socket.local_addr()?,
            tasks: vec![receiver, sweeper],
        })
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, switch: Arc<Switch>) {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => match switch.receive(from, &buf[..len]) {
                Ok(disposition) => debug!(from = %from, ?disposition, "Handled datagram"),
                Err(e) => error!(from = %from, error = %e, "Failed to handle datagram"),
            },
            // ICMP unreachable surfaces here on some platforms.
            Err(e) => warn!(error = %e, "Receive failed"),
        }
    }
}

/// Running node. Dropping the handle leaves the tasks running; call
/// [`NodeHandle::shutdown`] to stop them.
pub struct NodeHandle {
    switch: Arc<Switch>,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn switch(&self) -> &Arc<Switch> {
        &self.switch
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(local_addr = %self.local_addr, "Node stopped");
    }
}
