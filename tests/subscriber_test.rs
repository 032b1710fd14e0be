//! Tests for the subscriber receive loop.

mod common;

use common::{ChannelSource, notification, wait_for};
use pcap_dispatcher::error::{Error, Result};
use pcap_dispatcher::lifecycle::Lifecycle;
use pcap_dispatcher::model::WorkItem;
use pcap_dispatcher::queue::DispatchQueue;
use pcap_dispatcher::subscriber::{NotificationSource, Subscriber, ZmqSource};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

#[tokio::test]
async fn queues_valid_notifications_in_order() {
    let (tx, source) = ChannelSource::channel();
    let queue = DispatchQueue::new();
    let lifecycle = Lifecycle::new();
    let task = tokio::spawn(
        Subscriber::new(source, queue.clone(), lifecycle.clone())
            .recv_timeout(Duration::from_millis(50))
            .run(),
    );

    tx.send(notification(Path::new("/data/1.pcap"), &["a"])).unwrap();
    tx.send(b"{not json".to_vec()).unwrap();
    tx.send(br#"{"tags": ["orphan"]}"#.to_vec()).unwrap();
    tx.send(br#"["/data/array.pcap", ["a"]]"#.to_vec()).unwrap();
    tx.send(notification(Path::new("/data/2.pcap"), &[])).unwrap();

    assert!(wait_for(Duration::from_secs(5), || queue.len() == 2).await);
    lifecycle.shutdown();
    task.await.unwrap().unwrap();

    assert_eq!(
        queue.try_pop(),
        Some(WorkItem::new("/data/1.pcap", vec!["a".to_string()]))
    );
    assert_eq!(queue.try_pop(), Some(WorkItem::new("/data/2.pcap", vec![])));
    assert_eq!(queue.try_pop(), None);
}

#[tokio::test]
async fn idle_subscriber_stops_on_shutdown() {
    let (_tx, source) = ChannelSource::channel();
    let lifecycle = Lifecycle::new();
    let task = tokio::spawn(
        Subscriber::new(source, DispatchQueue::new(), lifecycle.clone())
            .recv_timeout(Duration::from_millis(20))
            .run(),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("subscriber should stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn snapshot_request_is_consumed_by_the_loop() {
    let (_tx, source) = ChannelSource::channel();
    let lifecycle = Lifecycle::new();
    let (control, _controller) = lifecycle.spawn_controller();
    let task = tokio::spawn(
        Subscriber::new(source, DispatchQueue::new(), lifecycle.clone())
            .recv_timeout(Duration::from_millis(20))
            .run(),
    );

    assert!(control.send(pcap_dispatcher::lifecycle::ControlCommand::Snapshot));
    // The loop clears the flag once it has logged the snapshot.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!lifecycle.take_snapshot_request());

    lifecycle.shutdown();
    task.await.unwrap().unwrap();
}

/// Fails once, then delivers a single payload, then stays idle.
struct FlakySource {
    calls: usize,
}

impl NotificationSource for FlakySource {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        self.calls += 1;
        match self.calls {
            1 => Err(Error::Other("connection reset".to_string())),
            2 => Ok(notification(Path::new("/data/after-error.pcap"), &[])),
            _ => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn transport_error_does_not_stop_the_loop() {
    let queue = DispatchQueue::new();
    let lifecycle = Lifecycle::new();
    let task = tokio::spawn(
        Subscriber::new(FlakySource { calls: 0 }, queue.clone(), lifecycle.clone())
            .recv_timeout(Duration::from_millis(50))
            .run(),
    );

    assert!(wait_for(Duration::from_secs(5), || queue.len() == 1).await);
    lifecycle.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(
        queue.try_pop().map(|item| item.path),
        Some("/data/after-error.pcap".into())
    );
}

/// A free local port for a throwaway publisher.
fn free_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("tcp://{}", listener.local_addr().unwrap())
}

async fn bind_publisher(endpoint: &str) -> PubSocket {
    for _ in 0..50 {
        let mut publisher = PubSocket::new();
        if publisher.bind(endpoint).await.is_ok() {
            return publisher;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("could not bind {endpoint}");
}

/// Publish `payload` until the source sees it or the attempts run out.
async fn deliver(publisher: &mut PubSocket, source: &mut ZmqSource, payload: &str) -> bool {
    for _ in 0..20 {
        publisher
            .send(ZmqMessage::from(payload.to_string()))
            .await
            .unwrap();
        if let Ok(Ok(received)) =
            tokio::time::timeout(Duration::from_millis(500), source.recv()).await
            && received == payload.as_bytes()
        {
            return true;
        }
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zmq_source_resubscribes_after_publisher_restart() {
    let endpoint = free_endpoint();
    let token = CancellationToken::new();

    let mut publisher = bind_publisher(&endpoint).await;
    let mut source = ZmqSource::connect(&endpoint, &token)
        .await
        .unwrap()
        .expect("connected before shutdown");
    assert!(deliver(&mut publisher, &mut source, "first").await);

    drop(publisher);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut publisher = bind_publisher(&endpoint).await;

    assert!(deliver(&mut publisher, &mut source, "second").await);
}
