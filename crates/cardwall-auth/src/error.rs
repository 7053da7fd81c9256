//! Fault types raised by the actors and their collaborators.
//!
//! Every fault that can end a run is expressed as an [`AuthFault`]. The
//! collaborator-specific error types ([`CardError`], [`HttpCallError`],
//! [`SecureElementError`], [`BusError`]) convert into it with `?`.

use crate::card::ResponseStatus;
use crate::state::AuthenticationOutcome;

/// Errors raised by a card connection or its secure channel.
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    /// The NFC tag left the field.
    #[error("Tag lost")]
    TagLost,

    /// Transport-level failure talking to the card.
    #[error("Card I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The card answered with an unexpected status word.
    #[error("Card responded with status {0}")]
    Status(ResponseStatus),

    /// No card connection became available.
    #[error("No card connection available: {0}")]
    Unavailable(String),
}

impl CardError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns `true` if the connection to the card was lost.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::TagLost | Self::Io(_))
    }
}

/// A failed HTTP call to the IdP, with the raw error body if one was sent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("IdP call failed with HTTP {status}")]
pub struct HttpCallError {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Option<String>,
}

impl HttpCallError {
    /// Creates an error with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: Some(body.into()),
        }
    }

    /// Creates an error without a response body.
    #[must_use]
    pub fn without_body(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Errors raised by the device secure element.
#[derive(Debug, thiserror::Error)]
pub enum SecureElementError {
    /// Biometric authentication is required but failed or is locked out.
    #[error("User not authenticated")]
    UserNotAuthenticated,

    /// The key was invalidated, e.g. by a new biometric enrollment.
    #[error("Secure element key permanently invalidated")]
    KeyInvalidated,

    /// Key generation failed.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing or another cryptographic operation failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

impl SecureElementError {
    /// Creates a new `KeyGeneration` error.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration(message.into())
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Returns `true` if the user has to re-authenticate or re-pair.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::UserNotAuthenticated | Self::KeyInvalidated)
    }
}

/// Errors raised by a rendezvous lane.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The peer end of the lane was dropped.
    #[error("{0} lane closed by peer")]
    Closed(&'static str),
}

/// A fault that can end an authentication run.
#[derive(Debug, thiserror::Error)]
pub enum AuthFault {
    /// The run was cancelled; never classified.
    #[error("Cancelled")]
    Cancelled,

    /// The fault already names its outcome.
    #[error("{0}")]
    Outcome(AuthenticationOutcome),

    /// A card connection or secure-channel error.
    #[error("Card error: {0}")]
    Card(#[from] CardError),

    /// An HTTP call to the IdP failed.
    #[error("{0}")]
    Http(#[from] HttpCallError),

    /// The insurance identifier is already bound to another profile.
    #[error("Insurance identifier {insurance_identifier} already assigned to {profile_name}")]
    InsuranceIdentifierAlreadyAssigned {
        /// Whether the conflicting profile is the active one.
        in_active_profile: bool,
        /// Name of the conflicting profile.
        profile_name: String,
        /// The insurance identifier (KVNR).
        insurance_identifier: String,
    },

    /// A secure-element error.
    #[error("Secure element error: {0}")]
    SecureElement(#[from] SecureElementError),

    /// A handoff lane closed unexpectedly.
    #[error("Handshake bus error: {0}")]
    Bus(#[from] BusError),

    /// The IdP protocol asked for more than the flow allows.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A join-level fault with the originating faults attached.
    #[error("{fault} ({} suppressed)", .suppressed.len())]
    Aggregate {
        /// The top-level fault.
        fault: Box<AuthFault>,
        /// Faults attached to it, in attachment order.
        suppressed: Vec<AuthFault>,
    },

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuthFault {
    /// Creates a fault that already carries its outcome.
    #[must_use]
    pub fn outcome(outcome: AuthenticationOutcome) -> Self {
        Self::Outcome(outcome)
    }

    /// Creates a new `Protocol` fault.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates a new `InsuranceIdentifierAlreadyAssigned` fault.
    #[must_use]
    pub fn insurance_identifier_already_assigned(
        in_active_profile: bool,
        profile_name: impl Into<String>,
        insurance_identifier: impl Into<String>,
    ) -> Self {
        Self::InsuranceIdentifierAlreadyAssigned {
            in_active_profile,
            profile_name: profile_name.into(),
            insurance_identifier: insurance_identifier.into(),
        }
    }

    /// Wraps a fault with suppressed causes.
    #[must_use]
    pub fn aggregate(fault: AuthFault, suppressed: Vec<AuthFault>) -> Self {
        Self::Aggregate {
            fault: Box::new(fault),
            suppressed,
        }
    }

    /// Returns `true` if this fault, or anything nested in it, is a cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Aggregate { fault, suppressed } => {
                fault.is_cancellation() || suppressed.iter().any(AuthFault::is_cancellation)
            }
            _ => false,
        }
    }
}

/// Marker returned by the classifier when a fault is a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("authentication run cancelled")]
pub struct Cancelled;
