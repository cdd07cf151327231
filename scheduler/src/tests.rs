use std::collections::HashSet;

use trawler_core::request::Request;
use trawler_core::spider::BasicSpider;

use crate::{FifoScheduler, PriorityScheduler, Scheduler};

#[tokio::test]
async fn test_fifo_order() {
    let scheduler = FifoScheduler::new();

    for path in ["a", "b", "c"] {
        let request = Request::get(format!("https://example.com/{}", path)).unwrap();
        assert!(scheduler.enqueue_request(request).await.unwrap());
    }

    let urls: Vec<String> = [
        scheduler.next_request().await.unwrap(),
        scheduler.next_request().await.unwrap(),
        scheduler.next_request().await.unwrap(),
    ]
    .iter()
    .map(|r| r.url.path().to_string())
    .collect();

    assert_eq!(urls, vec!["/a", "/b", "/c"]);
    assert!(scheduler.next_request().await.is_none());
}

#[tokio::test]
async fn test_priority_order() {
    let scheduler = PriorityScheduler::new();

    let low = Request::get("https://example.com/low")
        .unwrap()
        .with_priority(1);
    let high = Request::get("https://example.com/high")
        .unwrap()
        .with_priority(10);

    scheduler.enqueue_request(low).await.unwrap();
    scheduler.enqueue_request(high).await.unwrap();

    assert_eq!(
        scheduler.next_request().await.unwrap().url.path(),
        "/high"
    );
    assert_eq!(scheduler.next_request().await.unwrap().url.path(), "/low");
}

#[tokio::test]
async fn test_dedupe_by_fingerprint() {
    let scheduler = FifoScheduler::new();

    let first = Request::get("https://example.com/page").unwrap();
    let duplicate = Request::get("https://example.com/page").unwrap();

    assert!(scheduler.enqueue_request(first).await.unwrap());
    assert!(!scheduler.enqueue_request(duplicate).await.unwrap());
    assert_eq!(scheduler.len().await, 1);
}

#[tokio::test]
async fn test_dont_filter_bypasses_dedupe() {
    let scheduler = FifoScheduler::new();

    let first = Request::get("https://example.com/page").unwrap();
    let again = Request::get("https://example.com/page")
        .unwrap()
        .with_dont_filter(true);

    assert!(scheduler.enqueue_request(first).await.unwrap());
    assert!(scheduler.enqueue_request(again).await.unwrap());
    assert_eq!(scheduler.len().await, 2);
}

#[tokio::test]
async fn test_caller_supplied_fingerprint_dedupe() {
    let scheduler = PriorityScheduler::new();

    let a = Request::get("https://example.com/a")
        .unwrap()
        .with_fingerprint("same");
    let b = Request::get("https://example.com/b")
        .unwrap()
        .with_fingerprint("same");

    assert!(scheduler.enqueue_request(a).await.unwrap());
    assert!(!scheduler.enqueue_request(b).await.unwrap());
}

/// Every accepted request comes back out exactly once.
#[tokio::test]
async fn test_no_request_loss() {
    let scheduler = FifoScheduler::new();
    let total = 100;

    for i in 0..total {
        let request = Request::get(format!("https://example.com/page/{}", i)).unwrap();
        assert!(scheduler.enqueue_request(request).await.unwrap());
    }

    let mut seen = HashSet::new();
    while let Some(request) = scheduler.next_request().await {
        assert!(seen.insert(request.fingerprint()), "duplicate dequeue");
    }

    assert_eq!(seen.len(), total);
    assert!(!scheduler.has_pending_requests().await);
}

#[tokio::test]
async fn test_open_close_lifecycle() {
    let spider = BasicSpider::new("lifecycle", vec![]);
    let scheduler = FifoScheduler::new();

    scheduler.open(&spider).await.unwrap();

    let request = Request::get("https://example.com").unwrap();
    scheduler.enqueue_request(request).await.unwrap();
    assert!(scheduler.has_pending_requests().await);

    scheduler.close("finished").await.unwrap();
    assert!(!scheduler.has_pending_requests().await);
    assert!(scheduler.is_empty().await);
}
