//! Remote IdP ports and the IdP session actor.

pub mod actor;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::bus::{Certificate, Challenge, Signature};
use crate::secure_element::SecureElementKey;

pub use actor::IdpSessionActor;

/// The three authentication variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Health card authentication, one signature round.
    HealthCard,
    /// Health card authentication that also registers a secure-element key,
    /// two signature rounds.
    Pairing,
    /// Passwordless authentication with a paired secure-element key.
    SecureElement,
}

impl FlowKind {
    /// Number of challenge/signature rounds the card takes part in.
    #[must_use]
    pub fn signature_rounds(self) -> usize {
        match self {
            Self::HealthCard => 1,
            Self::Pairing => 2,
            Self::SecureElement => 0,
        }
    }

    /// Returns `true` if the flow needs a health card.
    #[must_use]
    pub fn uses_card(self) -> bool {
        self.signature_rounds() > 0
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HealthCard => write!(f, "health_card"),
            Self::Pairing => write!(f, "pairing"),
            Self::SecureElement => write!(f, "secure_element"),
        }
    }
}

/// The card as the remote protocol sees it.
///
/// Implementations enforce the flow's round budget: the certificate can be
/// taken once and `sign` fails once every round has been used.
#[async_trait]
pub trait CardHandshake: Send {
    /// Returns the card's authentication certificate.
    async fn certificate(&mut self) -> AuthResult<Certificate>;

    /// Has the card sign `challenge`.
    async fn sign(&mut self, challenge: Challenge) -> AuthResult<Signature>;
}

/// Remote identity provider.
///
/// Implementations speak the IdP's REST protocol. Failed calls are reported as
/// [`AuthFault::Http`](crate::error::AuthFault::Http) carrying the response
/// body, so the error code can be read from it.
#[async_trait]
pub trait IdpRemote: Send + Sync {
    /// Authenticates with the health card.
    async fn authenticate_with_health_card(
        &self,
        card: &mut dyn CardHandshake,
    ) -> AuthResult<()>;

    /// Authenticates with the health card and registers `key` for later
    /// passwordless logins.
    async fn pair_with_secure_element(
        &self,
        key: &SecureElementKey,
        card: &mut dyn CardHandshake,
    ) -> AuthResult<()>;

    /// Authenticates with the secure-element key paired to `profile_name`.
    async fn authenticate_with_secure_element(&self, profile_name: &str) -> AuthResult<()>;
}
