//! Health card ports and the card session actor.
//!
//! The orchestrator talks to the card only through these traits:
//!
//! - [`CardConnectionSource`] yields connected cards (e.g. NFC tags entering the field)
//! - [`CardConnection`] establishes the PACE secure channel from the CAN
//! - [`SecureChannel`] reads the certificate, verifies the PIN and signs challenges
//!
//! APDU encoding and the PACE key agreement live behind these traits.

pub mod actor;

use std::fmt;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::CardError;

pub use actor::CardSessionActor;

/// Status words the orchestrator cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    /// `9000`
    Success,
    /// `6300`, PACE rejected the CAN.
    AuthenticationFailure,
    /// `63C2`
    WrongSecretWarningCount02,
    /// `63C1`
    WrongSecretWarningCount01,
    /// `6983`
    PasswordBlocked,
    /// Any other status word.
    Other(u16),
}

impl ResponseStatus {
    /// Maps a raw ISO 7816 status word.
    #[must_use]
    pub fn from_status_word(sw: u16) -> Self {
        match sw {
            0x9000 => Self::Success,
            0x6300 => Self::AuthenticationFailure,
            0x63C2 => Self::WrongSecretWarningCount02,
            0x63C1 => Self::WrongSecretWarningCount01,
            0x6983 => Self::PasswordBlocked,
            other => Self::Other(other),
        }
    }

    /// Returns the raw status word.
    #[must_use]
    pub fn status_word(&self) -> u16 {
        match self {
            Self::Success => 0x9000,
            Self::AuthenticationFailure => 0x6300,
            Self::WrongSecretWarningCount02 => 0x63C2,
            Self::WrongSecretWarningCount01 => 0x63C1,
            Self::PasswordBlocked => 0x6983,
            Self::Other(sw) => *sw,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.status_word())
    }
}

/// Result of verifying the card holder PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinVerificationStatus {
    Success,
    TwoRetriesLeft,
    OneRetryLeft,
    Blocked,
}

impl PinVerificationStatus {
    /// Maps the status word of a VERIFY command.
    ///
    /// Anything other than success or a retry warning means the PIN can no
    /// longer be used.
    #[must_use]
    pub fn from_status_word(sw: u16) -> Self {
        match ResponseStatus::from_status_word(sw) {
            ResponseStatus::Success => Self::Success,
            ResponseStatus::WrongSecretWarningCount02 => Self::TwoRetriesLeft,
            ResponseStatus::WrongSecretWarningCount01 => Self::OneRetryLeft,
            _ => Self::Blocked,
        }
    }
}

/// Secure messaging channel to the card, established with PACE.
#[async_trait]
pub trait SecureChannel: Send {
    /// Reads the authentication certificate (C.CH.AUT) from the card.
    async fn retrieve_certificate(&mut self) -> Result<Vec<u8>, CardError>;

    /// Verifies the card holder PIN.
    async fn verify_pin(&mut self, pin: &str) -> Result<PinVerificationStatus, CardError>;

    /// Signs a challenge with the card's authentication key.
    async fn sign_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>, CardError>;
}

/// A connected card session handle.
#[async_trait]
pub trait CardConnection: Send {
    /// Secure channel type produced by PACE.
    type Channel: SecureChannel;

    /// Runs PACE with the card access number.
    async fn establish_trusted_channel(&mut self, can: &str) -> Result<Self::Channel, CardError>;

    /// Releases the underlying connection. Called exactly once per run.
    fn release(&mut self) {}
}

/// Supplies card connections.
#[async_trait]
pub trait CardConnectionSource: Send + 'static {
    /// Connection type yielded by this source.
    type Connection: CardConnection + 'static;

    /// Waits for the first usable connection.
    async fn first_available(&mut self) -> Result<Self::Connection, CardError>;
}

/// Adapts a stream of connections into a [`CardConnectionSource`].
///
/// Only the first item is ever taken; an exhausted stream yields
/// [`CardError::Unavailable`].
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S> {
    /// Wraps a stream of card connections.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S, C> CardConnectionSource for StreamSource<S>
where
    S: Stream<Item = C> + Unpin + Send + 'static,
    C: CardConnection + 'static,
{
    type Connection = C;

    async fn first_available(&mut self) -> Result<C, CardError> {
        self.inner
            .next()
            .await
            .ok_or_else(|| CardError::unavailable("card connection source ended"))
    }
}

/// Owns a card connection for one run and releases it when dropped.
///
/// Dropping covers every way a run can end: completion, failure, and the
/// stream being dropped mid-flight.
pub(crate) struct ConnectionGuard<C: CardConnection> {
    connection: C,
}

impl<C: CardConnection> ConnectionGuard<C> {
    pub(crate) fn new(connection: C) -> Self {
        Self { connection }
    }

    pub(crate) fn connection(&mut self) -> &mut C {
        &mut self.connection
    }
}

impl<C: CardConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        self.connection.release();
        tracing::debug!("card connection released");
    }
}
