//! Test utilities for loopback switch scenarios

use hashline_core::Config;
use hashline_switch::{Identifier, LineRef, Node, NodeHandle, Switch, SwitchStatus};
use std::net::SocketAddr;
use tokio::time::{sleep, Duration, Instant};

/// How long scenarios wait for the network to settle.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration binding an ephemeral loopback port.
pub fn loopback_config(seed: Option<SocketAddr>) -> Config {
    let mut config = Config::default_config();
    config.network.bind_addr = "127.0.0.1:0".to_string();
    config.network.seed = seed.map(|addr| addr.to_string());
    config
}

/// Bind and start a node, seeding against `seed` or itself.
pub async fn start_node(seed: Option<SocketAddr>) -> NodeHandle {
    hashline_core::logging::try_init_for_tests();
    Node::bind(loopback_config(seed))
        .await
        .expect("bind loopback node")
        .start()
        .expect("start node")
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

pub async fn wait_connected(switch: &Switch) -> bool {
    wait_until(SETTLE_TIMEOUT, || {
        matches!(switch.status(), Ok(SwitchStatus::Connected))
    })
    .await
}

/// The line `switch` keeps for `peer`, if any.
pub fn line_to(switch: &Switch, peer: SocketAddr) -> Option<LineRef> {
    switch.lines().get(&Identifier::of(&peer)).ok().flatten()
}

/// Established line id of `switch`'s line to `peer`, or 0.
pub fn line_id_to(switch: &Switch, peer: SocketAddr) -> u64 {
    line_to(switch, peer)
        .and_then(|line| line.lock().ok().map(|line| line.line_id()))
        .unwrap_or_default()
}
