//! Integration tests for the in-memory queue manager.

use std::sync::Arc;

use pricewatcher::domain::DomainRegistry;
use pricewatcher::error::Error;
use pricewatcher::model::{Watcher, WatcherId};
use pricewatcher::queue::{QueueManager, SubmitResult};

fn watcher(id: u64) -> Watcher {
    Watcher::new(WatcherId(id), "bol.com", format!("http://bol.com/p/{id}"))
}

fn ids(watchers: &[Watcher]) -> Vec<u64> {
    watchers.iter().map(|w| w.id.0).collect()
}

#[test]
fn create_submit_pop_pop() {
    let queues = QueueManager::new();
    queues.create_queue("queue_bol_com").unwrap();

    assert_eq!(
        queues.submit("queue_bol_com", watcher(3)).unwrap(),
        SubmitResult::Enqueued
    );

    let popped = queues.pop("queue_bol_com").unwrap().expect("one job");
    assert_eq!(popped.id, WatcherId(3));
    assert!(queues.pop("queue_bol_com").unwrap().is_none());
}

#[test]
fn creating_a_queue_twice_fails_and_keeps_contents() {
    let queues = QueueManager::new();
    queues.create_queue("x").unwrap();
    queues.submit("x", watcher(1)).unwrap();

    let err = queues.create_queue("x").unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)), "got {err:?}");
    assert_eq!(queues.len("x").unwrap(), 1);
}

#[test]
fn pop_distinguishes_empty_from_missing() {
    let queues = QueueManager::new();
    queues.create_queue("empty").unwrap();

    assert!(queues.pop("empty").unwrap().is_none());

    let err = queues.pop("nope").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    let err = queues.submit("nope", watcher(1)).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    assert!(queues.peek("nope").is_err());
    assert!(queues.len("nope").is_err());
}

#[test]
fn submit_deduplicates_by_id() {
    let queues = QueueManager::new();
    queues.create_queue("q").unwrap();

    assert_eq!(queues.submit("q", watcher(7)).unwrap(), SubmitResult::Enqueued);

    // A newer copy of the same watcher does not replace the waiting one.
    let mut newer = watcher(7);
    newer.name = "renamed".to_string();
    assert_eq!(queues.submit("q", newer).unwrap(), SubmitResult::AlreadyQueued);

    let waiting = queues.peek("q").unwrap();
    assert_eq!(ids(&waiting), vec![7]);
    assert!(waiting[0].name.is_empty());
}

#[test]
fn popped_watcher_can_be_queued_again() {
    let queues = QueueManager::new();
    queues.create_queue("q").unwrap();

    queues.submit("q", watcher(1)).unwrap();
    queues.pop("q").unwrap();
    assert_eq!(queues.submit("q", watcher(1)).unwrap(), SubmitResult::Enqueued);
}

#[test]
fn pop_order_is_first_in_first_out() {
    let queues = QueueManager::new();
    queues.create_queue("q").unwrap();
    for id in [4, 2, 9, 1] {
        queues.submit("q", watcher(id)).unwrap();
    }
    queues.submit("q", watcher(2)).unwrap();

    let mut popped = Vec::new();
    while let Some(w) = queues.pop("q").unwrap() {
        popped.push(w.id.0);
    }
    assert_eq!(popped, vec![4, 2, 9, 1]);
}

#[test]
fn peek_does_not_consume() {
    let queues = QueueManager::new();
    queues.create_queue("q").unwrap();
    queues.submit("q", watcher(1)).unwrap();
    queues.submit("q", watcher(2)).unwrap();

    assert_eq!(ids(&queues.peek("q").unwrap()), vec![1, 2]);
    assert_eq!(ids(&queues.peek("q").unwrap()), vec![1, 2]);
    assert_eq!(queues.len("q").unwrap(), 2);
}

#[test]
fn queues_are_independent() {
    let queues = QueueManager::new();
    queues.create_queue("a").unwrap();
    queues.create_queue("b").unwrap();

    queues.submit("a", watcher(1)).unwrap();
    assert_eq!(queues.submit("b", watcher(1)).unwrap(), SubmitResult::Enqueued);

    queues.pop("a").unwrap();
    assert_eq!(queues.len("a").unwrap(), 0);
    assert_eq!(queues.len("b").unwrap(), 1);
}

#[test]
fn for_registry_creates_one_queue_per_domain() {
    let queues = QueueManager::for_registry(&DomainRegistry::default()).unwrap();
    let names: Vec<String> = queues.queue_names().into_iter().collect();
    assert_eq!(
        names,
        vec!["queue_bol_com", "queue_coolblue_nl", "queue_ebay_nl"]
    );
}

#[test]
fn concurrent_submits_keep_each_id_once() {
    let queues = Arc::new(QueueManager::new());
    queues.create_queue("q").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queues = Arc::clone(&queues);
            std::thread::spawn(move || {
                for id in 0..50 {
                    queues.submit("q", watcher(id)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut waiting = ids(&queues.peek("q").unwrap());
    assert_eq!(waiting.len(), 50);
    waiting.sort_unstable();
    assert_eq!(waiting, (0..50).collect::<Vec<_>>());
}
