//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose sign-in and to-do operations as sync, never-panicking calls.
//! - Own the process-wide `TodoSession` built from `CoreConfig`.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Configuration is fixed once the session has been created.

use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use todolist_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CoreConfig, Executor, InlineExecutor, ListRow, LocalPrincipalProvider, LogErrorSink,
    SessionStatus, SignInRequest, SqliteRemoteStore, TodoResult, TodoSession, WorkerExecutor,
    WriteDispatch,
};

static CONFIG: OnceLock<CoreConfig> = OnceLock::new();
static SESSION: Mutex<Option<Arc<TodoSession>>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and an error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Installs the core configuration from a JSON document.
///
/// # FFI contract
/// - Must run before the first to-do call; later calls are rejected.
/// - Returns empty string on success and an error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(config_json: String) -> String {
    let config = match CoreConfig::from_json(config_json.as_str()) {
        Ok(config) => config,
        Err(err) => return err.to_string(),
    };
    match CONFIG.set(config) {
        Ok(()) => String::new(),
        Err(_) => "core already configured".to_string(),
    }
}

/// Result envelope for sign-in and write calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoActionResponse {
    pub ok: bool,
    /// Stable error code (`not_authenticated`, `invalid_input`, ...); empty on success.
    pub error_code: String,
    pub message: String,
}

impl TodoActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            error_code: String::new(),
            message: message.into(),
        }
    }

    fn failure(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_code: error_code.into(),
            message: message.into(),
        }
    }

    fn from_result(result: TodoResult<()>, success_message: &str) -> Self {
        match result {
            Ok(()) => Self::success(success_message),
            Err(err) => Self::failure(err.code(), err.to_string()),
        }
    }
}

/// One rendered to-do row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoRowView {
    pub id: String,
    pub text: String,
    pub done: bool,
    pub struck_through: bool,
}

/// Current list contents plus sync health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListResponse {
    pub items: Vec<TodoRowView>,
    pub version: u64,
    /// `signed_out|connecting|live|stale`.
    pub status: String,
    /// Failure detail while `status == "stale"`, otherwise empty.
    pub message: String,
}

/// Signs in with an email identity and attaches the user's list.
#[flutter_rust_bridge::frb(sync)]
pub fn sign_in(email: String) -> TodoActionResponse {
    let session = match session() {
        Ok(session) => session,
        Err(err) => return TodoActionResponse::failure("session_unavailable", err),
    };
    match session.sign_in(&SignInRequest::email(email)) {
        Ok(_) => TodoActionResponse::success("Signed in."),
        Err(err) => TodoActionResponse::failure("sign_in_failed", err.to_string()),
    }
}

/// Signs out and clears the visible list.
#[flutter_rust_bridge::frb(sync)]
pub fn sign_out() -> TodoActionResponse {
    let session = match session() {
        Ok(session) => session,
        Err(err) => return TodoActionResponse::failure("session_unavailable", err),
    };
    match session.sign_out() {
        Ok(()) => TodoActionResponse::success("Signed out."),
        Err(err) => TodoActionResponse::failure("sign_out_failed", err.to_string()),
    }
}

/// Re-attaches the list after a connection or subscription failure.
#[flutter_rust_bridge::frb(sync)]
pub fn reconnect() -> TodoActionResponse {
    with_session(|session| session.attach(), "Reconnected.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn add_todo(text: String) -> TodoActionResponse {
    with_session(|session| session.service().add(text.as_str()), "Todo submitted.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn toggle_todo(item_id: String) -> TodoActionResponse {
    with_session(
        |session| session.service().toggle(item_id.as_str()),
        "Toggle submitted.",
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn delete_todo(item_id: String) -> TodoActionResponse {
    with_session(
        |session| session.service().delete(item_id.as_str()),
        "Delete submitted.",
    )
}

/// Returns the latest list snapshot for rendering.
#[flutter_rust_bridge::frb(sync)]
pub fn list_todos() -> TodoListResponse {
    let session = match session() {
        Ok(session) => session,
        Err(err) => {
            return TodoListResponse {
                items: Vec::new(),
                version: 0,
                status: "signed_out".to_string(),
                message: err,
            };
        }
    };
    let (status, message) = status_label(session.status());
    let snapshot = session.list().snapshot();
    TodoListResponse {
        items: snapshot
            .items()
            .iter()
            .map(|item| to_row_view(ListRow::from(item)))
            .collect(),
        version: snapshot.version(),
        status: status.to_string(),
        message,
    }
}

fn with_session(
    f: impl FnOnce(&TodoSession) -> TodoResult<()>,
    success_message: &str,
) -> TodoActionResponse {
    match session() {
        Ok(session) => TodoActionResponse::from_result(f(&session), success_message),
        Err(err) => TodoActionResponse::failure("session_unavailable", err),
    }
}

fn session() -> Result<Arc<TodoSession>, String> {
    let mut slot = lock_session();
    if let Some(session) = slot.as_ref() {
        return Ok(session.clone());
    }

    let config = resolve_config();
    init_configured_logging(config);
    let store = SqliteRemoteStore::open(&config.db_path)
        .map_err(|err| format!("todo store open failed: {err}"))?;
    let writer: Arc<dyn Executor> = match config.write_dispatch {
        WriteDispatch::Background => Arc::new(
            WorkerExecutor::spawn("todolist-writer")
                .map_err(|err| format!("writer thread spawn failed: {err}"))?,
        ),
        WriteDispatch::Inline => Arc::new(InlineExecutor),
    };
    let session = Arc::new(TodoSession::with_executor(
        Arc::new(store),
        Arc::new(LocalPrincipalProvider::new()),
        writer,
        Arc::new(LogErrorSink),
    ));
    match session.start() {
        Ok(attached) => info!(
            "event=ffi_session_start module=ffi status=ok attached={attached} dispatch={:?}",
            config.write_dispatch
        ),
        // The session stays usable; `reconnect` retries the attach.
        Err(err) => warn!(
            "event=ffi_session_start module=ffi status=error error_code={}",
            err.code()
        ),
    }
    *slot = Some(session.clone());
    Ok(session)
}

/// Starts file logging when the config names a log directory.
///
/// Failures are logged and ignored; the session works without file logs.
fn init_configured_logging(config: &CoreConfig) {
    let Some(log_dir) = config.log_dir.as_deref() else {
        return;
    };
    let Some(log_dir) = log_dir.to_str() else {
        warn!("event=ffi_logging module=ffi status=error error=non_utf8_log_dir");
        return;
    };
    if let Err(err) = init_logging_inner(config.log_level.as_str(), log_dir) {
        warn!("event=ffi_logging module=ffi status=error error={err}");
    }
}

fn lock_session() -> MutexGuard<'static, Option<Arc<TodoSession>>> {
    SESSION
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn resolve_config() -> &'static CoreConfig {
    CONFIG.get_or_init(|| match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!("event=ffi_config module=ffi status=fallback error={err}");
            CoreConfig::default()
        }
    })
}

fn status_label(status: SessionStatus) -> (&'static str, String) {
    match status {
        SessionStatus::SignedOut => ("signed_out", String::new()),
        SessionStatus::Connecting => ("connecting", String::new()),
        SessionStatus::Live => ("live", String::new()),
        SessionStatus::Stale(err) => ("stale", err.to_string()),
    }
}

fn to_row_view(row: ListRow) -> TodoRowView {
    TodoRowView {
        id: row.id,
        text: row.text,
        done: row.done,
        struck_through: row.struck_through,
    }
}
