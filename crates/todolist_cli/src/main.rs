//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `todolist_core` linkage without the Flutter runtime.
//! - Walk one add / toggle / delete cycle against the in-memory store.

use std::process::ExitCode;
use std::sync::Arc;
use todolist_core::{
    LocalPrincipalProvider, MemoryRemoteStore, SessionError, SignInRequest, Snapshot,
    TodoSession,
};

fn main() -> ExitCode {
    println!("todolist_core ping={}", todolist_core::ping());
    println!("todolist_core version={}", todolist_core::core_version());

    match run_demo() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_demo() -> Result<(), SessionError> {
    let store = Arc::new(MemoryRemoteStore::new());
    let session = TodoSession::new(store, Arc::new(LocalPrincipalProvider::new()));
    session.list().subscribe(Arc::new(|snapshot: &Snapshot| {
        let rendered: Vec<String> = snapshot
            .items()
            .iter()
            .map(|item| format!("[{}] {}", if item.done { "x" } else { " " }, item.text))
            .collect();
        println!("v{} {:?}", snapshot.version(), rendered);
    }));

    session.sign_in(&SignInRequest::email("demo@example.com"))?;
    session.service().add("buy milk")?;
    let id = session
        .list()
        .items()
        .first()
        .map(|item| item.id.clone())
        .unwrap_or_default();
    session.service().toggle(&id)?;
    session.service().delete(&id)?;
    session.sign_out()?;
    Ok(())
}
