use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use todolist_core::{Item, ObservableList, Snapshot, WorkerExecutor};

fn snapshot(version: u64, ids: &[&str]) -> Snapshot {
    Snapshot::new(
        version,
        ids.iter()
            .map(|id| Item::new(*id, format!("text {id}"), false))
            .collect(),
    )
}

fn ids(list: &ObservableList) -> Vec<String> {
    list.items().into_iter().map(|item| item.id).collect()
}

#[test]
fn increasing_versions_replace_content_in_delivery_order() {
    let list = ObservableList::new();
    assert!(list.set(snapshot(1, &["c", "a", "b"])));
    assert_eq!(ids(&list), vec!["c", "a", "b"]);

    assert!(list.set(snapshot(2, &["b", "c"])));
    assert_eq!(ids(&list), vec!["b", "c"]);
    assert_eq!(list.version(), 2);
}

#[test]
fn stale_versions_are_ignored() {
    let list = ObservableList::new();
    let notified = Arc::new(Mutex::new(Vec::new()));
    let sink = notified.clone();
    list.subscribe(Arc::new(move |snapshot: &Snapshot| {
        sink.lock().expect("notified").push(snapshot.version())
    }));

    assert!(list.set(snapshot(1, &["a"])));
    assert!(list.set(snapshot(2, &["a", "b"])));
    assert!(!list.set(snapshot(1, &["a"])));
    assert!(!list.set(snapshot(2, &[])));

    assert_eq!(ids(&list), vec!["a", "b"]);
    assert_eq!(*notified.lock().expect("notified"), vec![1, 2]);
}

#[test]
fn callbacks_run_in_subscription_order() {
    let list = ObservableList::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        list.subscribe(Arc::new(move |_: &Snapshot| {
            order.lock().expect("order").push(name)
        }));
    }

    list.set(snapshot(1, &[]));
    assert_eq!(
        *order.lock().expect("order"),
        vec!["first", "second", "third"]
    );
}

#[test]
fn subscriber_added_during_notification_waits_for_next_change() {
    let list = Arc::new(ObservableList::new());
    let late_calls = Arc::new(Mutex::new(Vec::new()));
    let added = Arc::new(Mutex::new(false));

    let list_ref = list.clone();
    let late_ref = late_calls.clone();
    let added_ref = added.clone();
    list.subscribe(Arc::new(move |_: &Snapshot| {
        let mut added = added_ref.lock().expect("added");
        if !*added {
            *added = true;
            let late = late_ref.clone();
            list_ref.subscribe(Arc::new(move |snapshot: &Snapshot| {
                late.lock().expect("late").push(snapshot.version())
            }));
        }
    }));

    list.set(snapshot(1, &["a"]));
    assert!(late_calls.lock().expect("late").is_empty());

    list.set(snapshot(2, &["a"]));
    assert_eq!(*late_calls.lock().expect("late"), vec![2]);
}

#[test]
fn concurrent_sets_keep_the_newest_snapshot() {
    let list = Arc::new(ObservableList::new());
    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let list = list.clone();
            thread::spawn(move || {
                for step in 0..25u64 {
                    let version = step * 4 + worker + 1;
                    list.set(snapshot(version, &["x"]));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }
    assert_eq!(list.version(), 100);
}

#[test]
fn callbacks_can_run_on_a_chosen_executor() {
    let list = ObservableList::new();
    let executor = Arc::new(WorkerExecutor::spawn("todolist-ui").expect("spawn executor"));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    list.subscribe_on(
        executor,
        Arc::new(move |snapshot: &Snapshot| {
            tx.lock()
                .expect("sender")
                .send((
                    snapshot.version(),
                    thread::current().name().map(str::to_string),
                ))
                .expect("receiver alive");
        }),
    );

    list.set(snapshot(3, &["a"]));
    let (version, thread_name) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback should run");
    assert_eq!(version, 3);
    assert_eq!(thread_name.as_deref(), Some("todolist-ui"));
}

#[test]
fn rows_project_done_state() {
    let list = ObservableList::new();
    list.set(Snapshot::new(
        1,
        vec![
            Item::new("a", "buy milk", true),
            Item::new("b", "walk dog", false),
        ],
    ));
    let rows = list.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].struck_through);
    assert!(!rows[1].struck_through);
    assert_eq!(rows[1].text, "walk dog");
}
