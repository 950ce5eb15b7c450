use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use todolist_core::{
    Item, LocalPrincipalProvider, LogErrorSink, MemoryRemoteStore, PrincipalProvider,
    SessionStatus, SignInRequest, Snapshot, SqliteRemoteStore, TodoError, TodoSession,
    WorkerExecutor,
};

fn memory_session() -> (Arc<MemoryRemoteStore>, TodoSession) {
    let store = Arc::new(MemoryRemoteStore::new());
    let auth = Arc::new(LocalPrincipalProvider::with_principal(
        "u1@example.com",
        "u1",
    ));
    let session = TodoSession::new(store.clone(), auth);
    (store, session)
}

#[test]
fn add_toggle_delete_flow_through_the_list() {
    let (store, session) = memory_session();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session
        .list()
        .subscribe(Arc::new(move |snapshot: &Snapshot| {
            sink.lock()
                .expect("seen")
                .push((snapshot.version(), snapshot.items().to_vec()))
        }));

    let principal = session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");
    assert_eq!(principal, "u1");
    assert_eq!(session.status(), SessionStatus::Live);

    store.queue_ids(["abc"]);
    session.service().add("buy milk").expect("add");
    assert_eq!(
        session.list().items(),
        vec![Item::new("abc", "buy milk", false)]
    );
    assert_eq!(session.list().version(), 1);

    session.service().toggle("abc").expect("toggle");
    assert_eq!(session.list().version(), 2);
    assert_eq!(
        session.list().items(),
        vec![Item::new("abc", "buy milk", true)]
    );

    session.service().delete("abc").expect("delete");
    assert_eq!(session.list().version(), 3);
    assert!(session.list().is_empty());

    let versions: Vec<u64> = seen
        .lock()
        .expect("seen")
        .iter()
        .map(|(version, _)| *version)
        .collect();
    assert_eq!(versions, vec![0, 1, 2, 3]);
}

#[test]
fn start_attaches_only_when_already_signed_in() {
    let (_, session) = memory_session();
    assert_eq!(session.start(), Ok(false));
    assert_eq!(session.status(), SessionStatus::SignedOut);

    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");
    assert_eq!(session.start(), Ok(true));
    assert_eq!(session.status(), SessionStatus::Live);
}

#[test]
fn attach_is_idempotent_per_principal() {
    let (store, session) = memory_session();
    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");
    session.attach().expect("attach again");
    session.attach().expect("attach again");
    assert_eq!(store.listener_count("u1"), 1);
}

#[test]
fn sign_out_clears_list_and_stops_delivery() {
    let (store, session) = memory_session();
    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");
    session.service().add("buy milk").expect("add");
    assert_eq!(session.list().len(), 1);

    session.sign_out().expect("sign out");
    assert!(session.list().is_empty());
    assert_eq!(session.status(), SessionStatus::SignedOut);
    assert_eq!(store.listener_count("u1"), 0);
    assert_eq!(
        session.service().add("after"),
        Err(TodoError::NotAuthenticated)
    );

    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign back in");
    assert_eq!(session.list().len(), 1);
}

#[test]
fn users_only_see_their_own_partition() {
    let store = Arc::new(MemoryRemoteStore::new());
    let auth = Arc::new(LocalPrincipalProvider::new());
    let session = TodoSession::new(store.clone(), auth.clone());

    session
        .sign_in(&SignInRequest::email("alice@example.com"))
        .expect("alice");
    session.service().add("alice's item").expect("add");
    session.sign_out().expect("sign out");

    session
        .sign_in(&SignInRequest::email("bob@example.com"))
        .expect("bob");
    assert!(session.list().is_empty());
    session.service().add("bob's item").expect("add");
    assert_eq!(session.list().items()[0].text, "bob's item");
    assert_eq!(session.list().len(), 1);
}

#[test]
fn revoked_access_leaves_list_frozen_until_caller_reattaches() {
    let (store, session) = memory_session();
    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");
    session.service().add("buy milk").expect("add");

    store.revoke("u1");
    assert!(matches!(
        session.status(),
        SessionStatus::Stale(TodoError::SubscriptionError(_))
    ));
    assert_eq!(session.list().len(), 1);

    assert_eq!(session.attach(), Err(TodoError::NotAuthenticated));
    assert!(matches!(session.status(), SessionStatus::Stale(_)));

    store.restore("u1");
    session.attach().expect("reattach");
    assert_eq!(session.status(), SessionStatus::Live);
    assert_eq!(session.list().len(), 1);
}

#[test]
fn offline_attach_is_retryable() {
    let (store, session) = memory_session();
    store.set_reachable(false);

    let err = session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect_err("store offline");
    assert_eq!(err.to_string(), "connection error: memory store offline");
    assert!(session.current_principal().is_some());
    assert!(matches!(
        session.status(),
        SessionStatus::Stale(TodoError::ConnectionError(_))
    ));

    store.set_reachable(true);
    session.attach().expect("retry");
    assert_eq!(session.status(), SessionStatus::Live);
}

#[test]
fn retry_reattaches_only_after_the_session_goes_stale() {
    let (store, session) = memory_session();
    assert_eq!(session.retry(), Ok(false));

    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");
    assert_eq!(session.retry(), Ok(false));
    assert_eq!(store.listener_count("u1"), 1);

    store.revoke("u1");
    assert_eq!(store.listener_count("u1"), 0);
    assert_eq!(session.retry(), Err(TodoError::NotAuthenticated));
    assert!(matches!(session.status(), SessionStatus::Stale(_)));

    store.restore("u1");
    assert_eq!(session.retry(), Ok(true));
    assert_eq!(session.status(), SessionStatus::Live);
    assert_eq!(store.listener_count("u1"), 1);
    assert_eq!(session.retry(), Ok(false));
}

#[test]
fn background_writes_reach_the_list_asynchronously() {
    let store = Arc::new(MemoryRemoteStore::new());
    let auth = Arc::new(LocalPrincipalProvider::with_principal("u1@example.com", "u1"));
    let writer = Arc::new(WorkerExecutor::spawn("todolist-writer").expect("writer"));
    let session =
        TodoSession::with_executor(store, auth, writer.clone(), Arc::new(LogErrorSink));
    session
        .sign_in(&SignInRequest::email("u1@example.com"))
        .expect("sign in");

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    session.list().subscribe(Arc::new(move |snapshot: &Snapshot| {
        let _ = tx.lock().expect("sender").send(snapshot.len());
    }));

    session.service().add("buy milk").expect("add");
    let len = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("snapshot delivered");
    assert_eq!(len, 1);
    writer.shutdown();
}

#[test]
fn sqlite_store_persists_across_sessions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("todolist.sqlite3");
    let auth = Arc::new(LocalPrincipalProvider::with_principal("u1@example.com", "u1"));

    {
        let store = Arc::new(SqliteRemoteStore::open(&path).expect("open store"));
        let session = TodoSession::new(store, auth.clone());
        session
            .sign_in(&SignInRequest::email("u1@example.com"))
            .expect("sign in");
        session.service().add("first").expect("add");
        session.service().add("second").expect("add");
        let first_id = session.list().items()[0].id.clone();
        session.service().toggle(&first_id).expect("toggle");
        assert_eq!(session.list().version(), 3);
    }

    let store = Arc::new(SqliteRemoteStore::open(&path).expect("reopen store"));
    let session = TodoSession::new(store, auth.clone());
    assert_eq!(session.start(), Ok(true));
    let items = session.list().items();
    assert_eq!(
        items.iter().map(|item| item.text.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );
    assert!(items[0].done);
    assert!(!items[1].done);
    assert_eq!(session.list().version(), 3);
    assert!(auth.current_principal().is_some());
}
