//! In-process email identity provider.

use super::{AuthError, PrincipalId, PrincipalProvider, SignInRequest};
use crate::locks::lock_or_recover;
use log::info;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct LocalAuthState {
    principals_by_email: HashMap<String, PrincipalId>,
    current: Option<PrincipalId>,
}

/// Email-keyed provider holding one active session per process.
///
/// The same (case-insensitive) email always resolves to the same principal
/// id, so a user sees their partition again after signing back in.
#[derive(Default)]
pub struct LocalPrincipalProvider {
    state: Mutex<LocalAuthState>,
}

impl LocalPrincipalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-registers `email` with a fixed principal id.
    pub fn with_principal(email: &str, principal_id: impl Into<PrincipalId>) -> Self {
        let provider = Self::new();
        if let Ok(normalized) = normalize_email(email) {
            provider
                .lock_state()
                .principals_by_email
                .insert(normalized, principal_id.into());
        }
        provider
    }

    fn lock_state(&self) -> MutexGuard<'_, LocalAuthState> {
        lock_or_recover(&self.state)
    }
}

impl PrincipalProvider for LocalPrincipalProvider {
    fn current_principal(&self) -> Option<PrincipalId> {
        self.lock_state().current.clone()
    }

    fn sign_in(&self, request: &SignInRequest) -> Result<PrincipalId, AuthError> {
        let email = normalize_email(&request.email)?;
        let mut state = self.lock_state();
        let principal = state
            .principals_by_email
            .entry(email)
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        state.current = Some(principal.clone());
        info!("event=sign_in module=auth status=ok");
        Ok(principal)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.lock_state().current.take();
        if previous.is_some() {
            info!("event=sign_out module=auth status=ok");
        }
        Ok(())
    }
}

fn normalize_email(value: &str) -> Result<String, AuthError> {
    let trimmed = value.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !trimmed.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AuthError::InvalidEmail(trimmed.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}
