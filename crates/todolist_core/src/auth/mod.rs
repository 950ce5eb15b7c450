//! Principal (signed-in identity) collaborator contracts.
//!
//! # Responsibility
//! - Expose the current principal id used as the partition key.
//! - Keep credential handling outside core.
//!
//! # Invariants
//! - Core only reads `current_principal()`; it never inspects credentials.

mod local;

pub use local::LocalPrincipalProvider;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Unique id of an authenticated principal; doubles as its partition id.
pub type PrincipalId = String;

/// Sign-in input accepted by principal providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    pub email: String,
}

impl SignInRequest {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidEmail(String),
    Unavailable(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmail(value) => write!(f, "invalid email: `{value}`"),
            Self::Unavailable(message) => write!(f, "identity provider unavailable: {message}"),
        }
    }
}

impl Error for AuthError {}

/// Identity provider contract consumed by sync and service layers.
pub trait PrincipalProvider: Send + Sync {
    fn current_principal(&self) -> Option<PrincipalId>;
    fn sign_in(&self, request: &SignInRequest) -> Result<PrincipalId, AuthError>;
    fn sign_out(&self) -> Result<(), AuthError>;
}
