//! Liveness and robustness scenarios

use crate::test_utils::*;
use hashline_switch::line::unix_now;
use hashline_switch::Identifier;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};

#[tokio::test]
async fn test_sweep_purges_silent_peers_and_keeps_own_line() {
    let seed = start_node(None).await;
    assert!(wait_connected(seed.switch()).await);
    let joiner = start_node(Some(seed.local_addr())).await;
    assert!(wait_connected(joiner.switch()).await);
    assert!(wait_until(SETTLE_TIMEOUT, || line_to(seed.switch(), joiner.local_addr()).is_some()).await);

    // Pretend the joiner has been silent for well past the timeout.
    let report = seed.switch().scan_lines(unix_now() + 1_000, 70).unwrap();
    assert!(report.purged >= 1);
    assert!(line_to(seed.switch(), joiner.local_addr()).is_none());
    assert!(line_to(seed.switch(), seed.local_addr()).is_some());

    seed.shutdown();
    joiner.shutdown();
}

#[tokio::test]
async fn test_garbage_is_dropped_and_queries_still_answered() {
    let seed = start_node(None).await;
    assert!(wait_connected(seed.switch()).await);
    let target = seed.local_addr();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"\x00\x01 not json", target).await.unwrap();
    client.send_to(b"[1,2,3]", target).await.unwrap();

    let query = json!({
        "_to": target.to_string(),
        "_ring": 77,
        "+end": Identifier::of(&target).to_string(),
    });
    client
        .send_to(&serde_json::to_vec(&query).unwrap(), target)
        .await
        .unwrap();

    let mut buf = vec![0u8; 64 * 1024];
    let (len, from) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("answer within timeout")
        .unwrap();
    assert_eq!(from, target);

    let answer: Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(answer["_to"], json!(client.local_addr().unwrap().to_string()));
    assert_eq!(answer[".see"], json!([target.to_string()]));
    let line = answer["_line"].as_i64().expect("line token");
    assert!(line > 0 && line % 77 == 0);

    seed.shutdown();
}
