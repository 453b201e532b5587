//! Fan-out hub behavior: cached replay, cancellation, feed-gap survival

mod common;

use common::{frame, mock_upstream, value_of, StalledUpstream};
use std::time::Duration;
use tmtc_hub::hub::{ConnectionState, FanoutHub, HubConfig, TelemetrySubscription};
use tmtc_hub::upstream::TelemetryFrame;
use tokio::time::timeout;

fn test_hub_config() -> HubConfig {
    HubConfig {
        retry_interval: Duration::from_millis(10),
        subscriber_buffer: 8,
    }
}

async fn recv(sub: &mut TelemetrySubscription) -> TelemetryFrame {
    timeout(Duration::from_secs(1), sub.next())
        .await
        .expect("timed out waiting for frame")
        .expect("subscription ended unexpectedly")
}

#[tokio::test]
async fn subscriber_on_untouched_channel_waits_for_first_publish() {
    let (upstream, feeds) = mock_upstream();
    let feed = feeds.add_session();
    let hub = FanoutHub::spawn(upstream, test_hub_config());

    let mut sub = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    assert!(
        timeout(Duration::from_millis(50), sub.next()).await.is_err(),
        "nothing may be delivered before the first publish"
    );

    feed.send(frame("RT.OBC.TEMP", 21.5)).unwrap();
    assert_eq!(value_of(&recv(&mut sub).await), 21.5);
}

#[tokio::test]
async fn late_subscriber_sees_cached_value_before_live_updates() {
    let (upstream, feeds) = mock_upstream();
    let feed = feeds.add_session();
    let hub = FanoutHub::spawn(upstream, test_hub_config());

    feed.send(frame("RT.OBC.TEMP", 21.5)).unwrap();
    let mut a = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    assert_eq!(value_of(&recv(&mut a).await), 21.5);

    feed.send(frame("RT.OBC.TEMP", 22.0)).unwrap();
    assert_eq!(value_of(&recv(&mut a).await), 22.0);

    // B joins late: the cached 22.0 is already queued when subscribe
    // returns, and 21.5 is never seen.
    let mut b = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    let first = b.try_next().expect("cached value replayed synchronously");
    assert_eq!(value_of(&first), 22.0);
}

#[tokio::test]
async fn cancel_is_idempotent_and_stops_delivery() {
    let (upstream, feeds) = mock_upstream();
    let feed = feeds.add_session();
    let hub = FanoutHub::spawn(upstream, test_hub_config());

    let mut sub = hub.subscribe("RT.EPS.VOLT").await.unwrap();
    feed.send(frame("RT.EPS.VOLT", 3.3)).unwrap();
    assert_eq!(value_of(&recv(&mut sub).await), 3.3);

    let canceller = sub.canceller();
    canceller.cancel().await.unwrap();
    canceller.cancel().await.unwrap();

    feed.send(frame("RT.EPS.VOLT", 3.4)).unwrap();
    let ended = timeout(Duration::from_secs(1), sub.next()).await.unwrap();
    assert!(ended.is_none(), "no delivery may follow a cancel");

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.active_subscriptions, 0);
    // The cached value outlives its subscribers.
    assert_eq!(stats.cached_channels, 1);
}

#[tokio::test]
async fn cancelling_one_subscriber_leaves_others_untouched() {
    let (upstream, feeds) = mock_upstream();
    let feed = feeds.add_session();
    let hub = FanoutHub::spawn(upstream, test_hub_config());

    let mut a = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    let mut b = hub.subscribe("RT.OBC.TEMP").await.unwrap();

    feed.send(frame("RT.OBC.TEMP", 1.0)).unwrap();
    assert_eq!(value_of(&recv(&mut a).await), 1.0);
    assert_eq!(value_of(&recv(&mut b).await), 1.0);

    a.cancel().await.unwrap();

    feed.send(frame("RT.OBC.TEMP", 2.0)).unwrap();
    assert_eq!(value_of(&recv(&mut b).await), 2.0);

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.active_subscriptions, 1);
}

#[tokio::test]
async fn cache_and_subscribers_survive_feed_gap() {
    let (upstream, feeds) = mock_upstream();
    let session1 = feeds.add_session();
    let hub = FanoutHub::spawn(upstream, test_hub_config());

    let mut before_gap = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    session1.send(frame("RT.OBC.TEMP", 21.5)).unwrap();
    assert_eq!(value_of(&recv(&mut before_gap).await), 21.5);

    // Upstream connection lost
    drop(session1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Late joiners during the outage still get the cached value
    let mut during_gap = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    assert_eq!(value_of(&during_gap.try_next().unwrap()), 21.5);

    // Feed resumes; subscribers from both sides of the gap see the update
    let session2 = feeds.add_session();
    session2.send(frame("RT.OBC.TEMP", 23.0)).unwrap();
    assert_eq!(value_of(&recv(&mut before_gap).await), 23.0);
    assert_eq!(value_of(&recv(&mut during_gap).await), 23.0);
}

#[tokio::test]
async fn subscribe_and_cancel_work_while_connect_is_pending() {
    // A black-holed backend leaves the hub in Connecting indefinitely;
    // consumer commands must still be served during that window.
    let hub = FanoutHub::spawn(StalledUpstream, test_hub_config());

    let sub = timeout(Duration::from_millis(500), hub.subscribe("RT.OBC.TEMP"))
        .await
        .expect("subscribe must not wait for the upstream connect")
        .unwrap();

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.state, ConnectionState::Connecting);
    assert_eq!(stats.active_subscriptions, 1);

    timeout(Duration::from_millis(500), sub.cancel())
        .await
        .expect("cancel must not wait for the upstream connect")
        .unwrap();
    assert_eq!(hub.stats().await.unwrap().active_subscriptions, 0);
}

#[tokio::test]
async fn dropping_a_subscription_releases_its_table_entry() {
    let (upstream, feeds) = mock_upstream();
    let _feed = feeds.add_session();
    let hub = FanoutHub::spawn(upstream, test_hub_config());

    let sub = hub.subscribe("RT.OBC.TEMP").await.unwrap();
    assert_eq!(hub.stats().await.unwrap().active_subscriptions, 1);

    drop(sub);
    for _ in 0..100 {
        if hub.stats().await.unwrap().active_subscriptions == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("dropped subscription was never removed from the table");
}
