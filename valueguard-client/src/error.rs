use form_schema::FieldErrors;
use thiserror::Error;
use valueguard_core::error::{IdentityError, StoreError};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Blocked locally because nobody is signed in; carries the prompt to show.
    #[error("{0}")]
    SignInRequired(&'static str),
    #[error("form has {} invalid field(s)", .0.len())]
    Validation(FieldErrors),
    #[error("{0}")]
    Rejected(String),
    #[error("not allowed while {phase}")]
    InvalidPhase { phase: &'static str },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
