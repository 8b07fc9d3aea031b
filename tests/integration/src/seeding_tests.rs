//! Seeding scenarios
//!
//! 1. **Self-seeding**: a node without a seed becomes the first switch
//! 2. **Two nodes**: the joiner learns its endpoint and both sides agree on
//!    the line id
//! 3. **Discovery**: a third node learns about the second through the seed

use crate::test_utils::*;
use hashline_switch::Identifier;

#[tokio::test]
async fn test_self_seeded_node_connects() {
    let seed = start_node(None).await;
    let switch = seed.switch().clone();

    assert!(wait_connected(&switch).await);
    assert_eq!(switch.self_endpoint().unwrap(), Some(seed.local_addr()));
    assert_eq!(
        switch.self_id().unwrap(),
        Some(Identifier::of(&seed.local_addr()))
    );

    let own = line_to(&switch, seed.local_addr()).expect("own line");
    assert!(own.lock().unwrap().is_visible());
    seed.shutdown();
}

#[tokio::test]
async fn test_joiner_converges_on_line_id() {
    let seed = start_node(None).await;
    assert!(wait_connected(seed.switch()).await);

    let joiner = start_node(Some(seed.local_addr())).await;
    assert!(wait_connected(joiner.switch()).await);
    assert_eq!(
        joiner.switch().self_endpoint().unwrap(),
        Some(joiner.local_addr())
    );

    let (a, b) = (seed.local_addr(), joiner.local_addr());
    let converged = wait_until(SETTLE_TIMEOUT, || {
        let left = line_id_to(seed.switch(), b);
        left != 0 && left == line_id_to(joiner.switch(), a)
    })
    .await;
    assert!(converged, "both sides should agree on the line id");

    // The seed listed itself in its answer, so the joiner sees it.
    let seed_line = line_to(joiner.switch(), a).expect("line to seed");
    assert!(wait_until(SETTLE_TIMEOUT, || seed_line.lock().unwrap().is_visible()).await);

    seed.shutdown();
    joiner.shutdown();
}

#[tokio::test]
async fn test_third_node_discovers_second_through_seed() {
    let seed = start_node(None).await;
    assert!(wait_connected(seed.switch()).await);

    let second = start_node(Some(seed.local_addr())).await;
    assert!(wait_connected(second.switch()).await);
    assert!(
        wait_until(SETTLE_TIMEOUT, || line_id_to(second.switch(), seed.local_addr()) != 0).await
    );

    // A sweep advertises the second node to the seed, which then counts it
    // among its own neighbors.
    let report = second
        .switch()
        .scan_lines(hashline_switch::line::unix_now(), 70)
        .unwrap();
    assert!(report.pinged >= 1);
    let advertised = wait_until(SETTLE_TIMEOUT, || {
        line_to(seed.switch(), second.local_addr())
            .map(|line| line.lock().unwrap().is_visible())
            .unwrap_or(false)
    })
    .await;
    assert!(advertised);

    let third = start_node(Some(seed.local_addr())).await;
    assert!(wait_connected(third.switch()).await);

    let discovered = wait_until(SETTLE_TIMEOUT, || {
        line_to(third.switch(), second.local_addr()).is_some()
            && line_to(second.switch(), third.local_addr()).is_some()
    })
    .await;
    assert!(discovered, "third node should dial the second");

    seed.shutdown();
    second.shutdown();
    third.shutdown();
}
