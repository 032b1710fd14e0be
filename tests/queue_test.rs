//! Tests for the dispatch queue.

use pcap_dispatcher::model::WorkItem;
use pcap_dispatcher::queue::DispatchQueue;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn item(n: usize) -> WorkItem {
    WorkItem::new(format!("/data/{n}.pcap"), vec![])
}

#[test]
fn try_pop_on_empty_queue_returns_none() {
    let queue = DispatchQueue::new();
    assert!(queue.try_pop().is_none());
    assert!(queue.is_empty());
}

#[test]
fn items_come_out_in_arrival_order() {
    let queue = DispatchQueue::new();
    for n in 0..5 {
        queue.push(item(n)).unwrap();
    }
    assert_eq!(queue.len(), 5);

    for n in 0..5 {
        assert_eq!(queue.try_pop().unwrap(), item(n));
    }
    assert!(queue.try_pop().is_none());
}

#[tokio::test]
async fn pop_waits_for_push() {
    let queue = DispatchQueue::new();
    let token = CancellationToken::new();

    let producer = queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.push(item(7)).unwrap();
    });

    let popped = tokio::time::timeout(Duration::from_secs(5), queue.pop(&token))
        .await
        .expect("pop should wake on push");
    assert_eq!(popped, Some(item(7)));
}

#[tokio::test]
async fn pop_returns_none_once_cancelled() {
    let queue = DispatchQueue::new();
    let token = CancellationToken::new();

    let waiter = {
        let queue = queue.clone();
        let token = token.clone();
        tokio::spawn(async move { queue.pop(&token).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
    assert_eq!(waiter.await.unwrap(), None);

    // Cancellation wins even when items are waiting.
    queue.push(item(1)).unwrap();
    assert_eq!(queue.pop(&token).await, None);
    assert_eq!(queue.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_item_goes_to_exactly_one_consumer() {
    let queue = DispatchQueue::new();
    let token = CancellationToken::new();
    const ITEMS: usize = 200;

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        let token = token.clone();
        consumers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = queue.pop(&token).await {
                seen.push(item);
            }
            seen
        }));
    }

    for n in 0..ITEMS {
        queue.push(item(n)).unwrap();
    }
    let drained = {
        let queue = queue.clone();
        async move {
            while !queue.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), drained)
        .await
        .unwrap();
    token.cancel();

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    assert_eq!(all.len(), ITEMS);
    let unique: HashSet<_> = all.iter().map(|item| item.path.clone()).collect();
    assert_eq!(unique.len(), ITEMS);
}
