//! Broadcast behaviour across the registry, streams and the todo list.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use livelist_core::{ChannelRegistry, Snapshot, Todo, TodoList, TODOS_CHANNEL};

fn new_list() -> (Arc<ChannelRegistry<Snapshot>>, Arc<TodoList>) {
    let registry = Arc::new(ChannelRegistry::new());
    let list = Arc::new(TodoList::new(Arc::clone(&registry)));
    (registry, list)
}

#[tokio::test]
async fn listener_observes_publishes_in_order() {
    let registry: ChannelRegistry<usize> = ChannelRegistry::new();
    let mut listener = registry.subscribe("events");

    for i in 1..=100 {
        registry.publish("events", i);
    }

    for i in 1..=100 {
        assert_eq!(listener.recv().await, Some(i));
    }
}

#[tokio::test]
async fn publish_without_listeners_is_a_no_op() {
    let (registry, list) = new_list();

    list.add_todo("nobody is watching");

    assert_eq!(registry.channel_count(), 0);
    assert_eq!(list.len(), 1);
}

#[tokio::test]
async fn stream_starts_with_current_state() {
    let (_registry, list) = new_list();
    list.add_todo("a");
    list.add_todo("b");

    let mut stream = list.subscribe().unwrap();
    let first = stream.next().await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first[1], Todo::new("2", "b"));
}

#[tokio::test]
async fn no_deliveries_after_cancel() {
    let (registry, list) = new_list();
    let mut stream = list.subscribe().unwrap();
    assert!(stream.next().await.unwrap().is_empty());

    stream.cancel();
    for i in 0..10 {
        list.add_todo(format!("todo {}", i));
    }

    assert_eq!(stream.next().await, None);
    assert_eq!(registry.listeners_on(TODOS_CHANNEL), 0);
}

#[tokio::test]
async fn subscribers_are_independent() {
    let (_registry, list) = new_list();
    let mut fast = list.subscribe().unwrap();
    let mut slow = list.subscribe().unwrap();

    for i in 0..5 {
        list.add_todo(format!("todo {}", i));
    }

    let fast_lengths: Vec<usize> = (&mut fast).take(6).map(|s| s.len()).collect().await;
    assert_eq!(fast_lengths, vec![0, 1, 2, 3, 4, 5]);

    // The slow subscriber has not consumed anything yet and still gets every snapshot.
    let slow_lengths: Vec<usize> = (&mut slow).take(6).map(|s| s.len()).collect().await;
    assert_eq!(slow_lengths, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_subscribe_never_sees_stale_snapshots() {
    const WRITES: usize = 200;
    let (_registry, list) = new_list();

    let writer = {
        let list = Arc::clone(&list);
        tokio::spawn(async move {
            for i in 0..WRITES {
                list.add_todo(format!("todo {}", i));
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let list = Arc::clone(&list);
        readers.push(tokio::spawn(async move {
            let mut stream = list.subscribe().unwrap();
            let mut last = 0usize;
            let mut first = true;
            while let Ok(Some(snapshot)) =
                tokio::time::timeout(Duration::from_millis(500), stream.next()).await
            {
                let len = snapshot.len();
                if first {
                    first = false;
                } else {
                    // A mutation racing the subscribe may be delivered twice.
                    assert!(len >= last, "stale snapshot: {} after {}", len, last);
                }
                last = len;
                if len == WRITES {
                    break;
                }
            }
            last
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        assert_eq!(reader.await.unwrap(), WRITES);
    }
}

#[tokio::test]
async fn failed_mutation_is_not_broadcast() {
    let (_registry, list) = new_list();
    let mut stream = list.subscribe().unwrap();
    assert!(stream.next().await.unwrap().is_empty());

    assert!(list.set_done("7", true).is_err());
    list.add_todo("after failure");

    let next = stream.next().await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].text, "after failure");
}

#[tokio::test]
async fn end_to_end_snapshots() {
    let (_registry, list) = new_list();
    let mut stream = list.subscribe().unwrap();

    assert_eq!(*stream.next().await.unwrap(), Vec::<Todo>::new());

    list.add_todo("a");
    assert_eq!(*stream.next().await.unwrap(), vec![Todo::new("1", "a")]);

    list.set_done("1", true).unwrap();
    let toggled = stream.next().await.unwrap();
    assert_eq!(
        *toggled,
        vec![Todo {
            id: "1".to_string(),
            text: "a".to_string(),
            done: true
        }]
    );
}
