//! Signed-in session wiring: auth, sync channel, list and service.
//!
//! # Responsibility
//! - Attach the signed-in principal's partition to the shared list.
//! - Tear subscriptions down and reset the list on sign-out.
//! - Expose a status the presentation layer can render as a staleness
//!   indicator.
//!
//! # Invariants
//! - At most one live subscription per session.
//! - After a terminal subscription failure the list stays frozen at its last
//!   state until the caller re-attaches.

use crate::auth::{AuthError, PrincipalId, PrincipalProvider, SignInRequest};
use crate::error::{TodoError, TodoResult};
use crate::exec::{Executor, InlineExecutor};
use crate::list::ObservableList;
use crate::locks::lock_or_recover;
use crate::service::todo_service::{LogErrorSink, TodoService, WriteErrorSink};
use crate::store::RemoteStore;
use crate::sync::{SubscriptionHandle, SyncChannel, SyncEvent, SyncSink};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

/// Session-level view of synchronization health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    /// Subscribed, first snapshot not yet delivered.
    Connecting,
    Live,
    /// Last attach or delivery failed; the list shows its last known state.
    Stale(TodoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Auth(AuthError),
    Todo(TodoError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::Todo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Todo(err) => Some(err),
        }
    }
}

impl From<AuthError> for SessionError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<TodoError> for SessionError {
    fn from(value: TodoError) -> Self {
        Self::Todo(value)
    }
}

/// To-do session for one app process.
pub struct TodoSession {
    auth: Arc<dyn PrincipalProvider>,
    channel: SyncChannel,
    list: Arc<ObservableList>,
    service: TodoService,
    attached: Mutex<Option<SubscriptionHandle>>,
    status: Arc<Mutex<SessionStatus>>,
}

impl TodoSession {
    /// Builds a session whose writes run inline and whose write failures go
    /// to the log.
    pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn PrincipalProvider>) -> Self {
        Self::with_executor(
            store,
            auth,
            Arc::new(InlineExecutor),
            Arc::new(LogErrorSink),
        )
    }

    pub fn with_executor(
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn PrincipalProvider>,
        writer: Arc<dyn Executor>,
        errors: Arc<dyn WriteErrorSink>,
    ) -> Self {
        let list = Arc::new(ObservableList::new());
        Self {
            channel: SyncChannel::new(store.clone(), auth.clone()),
            service: TodoService::new(store, auth.clone(), list.clone(), writer, errors),
            auth,
            list,
            attached: Mutex::new(None),
            status: Arc::new(Mutex::new(SessionStatus::SignedOut)),
        }
    }

    /// Attaches if a principal is already signed in.
    ///
    /// Returns whether the session is attached.
    pub fn start(&self) -> TodoResult<bool> {
        if self.auth.current_principal().is_none() {
            self.set_status(SessionStatus::SignedOut);
            return Ok(false);
        }
        self.attach()?;
        Ok(true)
    }

    /// Signs in and attaches the principal's partition.
    pub fn sign_in(&self, request: &SignInRequest) -> Result<PrincipalId, SessionError> {
        let principal = self.auth.sign_in(request)?;
        self.attach()?;
        Ok(principal)
    }

    /// Detaches, clears the list, and signs out.
    pub fn sign_out(&self) -> Result<(), SessionError> {
        self.detach();
        self.auth.sign_out()?;
        info!("event=session_sign_out module=session status=ok");
        Ok(())
    }

    /// Subscribes the signed-in principal's partition into the list.
    ///
    /// No-op while a live subscription for the same principal exists. Also
    /// used to resubscribe after `SessionStatus::Stale`.
    ///
    /// # Errors
    /// - `NotAuthenticated` when nobody is signed in.
    /// - `ConnectionError` when the store is unreachable.
    pub fn attach(&self) -> TodoResult<()> {
        let principal = self
            .auth
            .current_principal()
            .ok_or(TodoError::NotAuthenticated)?;

        let mut attached = lock_or_recover(&self.attached);
        if let Some(existing) = attached.as_ref() {
            if existing.is_active() && existing.partition() == principal {
                return Ok(());
            }
            let same_partition = existing.partition() == principal;
            self.channel.unsubscribe(existing);
            if !same_partition {
                self.list.clear();
            }
        }
        *attached = None;

        self.set_status(SessionStatus::Connecting);
        match self.channel.subscribe(&principal, self.sink()) {
            Ok(handle) => {
                info!(
                    "event=session_attach module=session status=ok subscription_id={}",
                    handle.id().0
                );
                *attached = Some(handle);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=session_attach module=session status=error error_code={}",
                    err.code()
                );
                self.set_status(SessionStatus::Stale(err.clone()));
                Err(err)
            }
        }
    }

    /// Re-attaches only when the session is `Stale`; otherwise a no-op.
    ///
    /// Returns whether a re-attach was attempted and succeeded.
    pub fn retry(&self) -> TodoResult<bool> {
        if !matches!(self.status(), SessionStatus::Stale(_)) {
            return Ok(false);
        }
        info!("event=session_retry module=session status=start");
        self.attach()?;
        Ok(true)
    }

    /// Drops the current subscription and resets the list.
    pub fn detach(&self) {
        let handle = lock_or_recover(&self.attached).take();
        if let Some(handle) = handle {
            self.channel.unsubscribe_partition(handle.partition());
            self.channel.unsubscribe(&handle);
        }
        self.list.clear();
        self.set_status(SessionStatus::SignedOut);
    }

    pub fn status(&self) -> SessionStatus {
        lock_or_recover(&self.status).clone()
    }

    pub fn list(&self) -> &Arc<ObservableList> {
        &self.list
    }

    pub fn service(&self) -> &TodoService {
        &self.service
    }

    pub fn current_principal(&self) -> Option<PrincipalId> {
        self.auth.current_principal()
    }

    fn set_status(&self, status: SessionStatus) {
        *lock_or_recover(&self.status) = status;
    }

    fn sink(&self) -> SyncSink {
        let list = self.list.clone();
        let status = self.status.clone();
        Arc::new(move |event| match event {
            SyncEvent::Snapshot(snapshot) => {
                list.set(snapshot);
                *lock_or_recover(&status) = SessionStatus::Live;
            }
            SyncEvent::Failed(err) => {
                *lock_or_recover(&status) = SessionStatus::Stale(err);
            }
        })
    }
}
