//! # cardwall-auth
//!
//! Mutual authentication of a health card and a remote identity provider.
//!
//! This crate provides:
//! - A card session actor and an IdP session actor coupled by rendezvous lanes
//! - An orchestrator that runs both under a fail-fast join and reports an
//!   ordered progress stream
//! - Pairing of a device secure-element key, and passwordless login with it
//! - A classifier mapping low-level faults to a closed set of outcomes
//!
//! ## Modules
//!
//! - [`orchestrator`] - Flow entry points producing a [`ProgressStream`]
//! - [`card`] - Health card ports and the card session actor
//! - [`idp`] - Remote IdP ports and the IdP session actor
//! - [`bus`] - Zero-capacity handoff lanes between the actors
//! - [`classifier`] - Fault to [`AuthenticationOutcome`] mapping
//! - [`secure_element`] - Device key store port
//! - [`observer`] - Event sink for logging
//! - [`config`] - Orchestrator configuration
//!
//! ## Example
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use cardwall_auth::prelude::*;
//!
//! let orchestrator = Orchestrator::new(remote, secure_element);
//! let mut progress = orchestrator.authenticate_with_health_card(
//!     HealthCardCredentials::new("123123", "123456"),
//!     StreamSource::new(nfc_tags),
//! );
//! while let Some(state) = progress.next().await {
//!     println!("{state}");
//! }
//! ```

pub mod bus;
pub mod card;
pub mod classifier;
pub mod config;
pub mod error;
pub mod idp;
pub mod observer;
pub mod orchestrator;
pub mod progress;
pub mod secure_element;
pub mod state;

pub use card::{
    CardConnection, CardConnectionSource, PinVerificationStatus, ResponseStatus, SecureChannel,
    StreamSource,
};
pub use classifier::{Branch, ClassifyContext, GematikErrorCode, classify, parse_gematik_code};
pub use config::{CardwallConfig, ConfigError};
pub use error::{AuthFault, BusError, Cancelled, CardError, HttpCallError, SecureElementError};
pub use idp::{CardHandshake, FlowKind, IdpRemote};
pub use observer::{AuthEvent, AuthObserver, TracingObserver};
pub use orchestrator::{Flow, HealthCardCredentials, Orchestrator, SecureElementCredentials};
pub use progress::ProgressStream;
pub use secure_element::{SecureElement, SecureElementAlias, SecureElementKey};
pub use state::{AuthenticationOutcome, ProgressState};

/// Type alias for results of actors and collaborators.
pub type AuthResult<T> = Result<T, AuthFault>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use cardwall_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::bus::{Certificate, Challenge, Signature};
    pub use crate::card::{
        CardConnection, CardConnectionSource, PinVerificationStatus, SecureChannel, StreamSource,
    };
    pub use crate::config::CardwallConfig;
    pub use crate::error::{AuthFault, CardError, HttpCallError, SecureElementError};
    pub use crate::idp::{CardHandshake, IdpRemote};
    pub use crate::observer::{AuthEvent, AuthObserver};
    pub use crate::orchestrator::{
        Flow, HealthCardCredentials, Orchestrator, SecureElementCredentials,
    };
    pub use crate::secure_element::{SecureElement, SecureElementAlias, SecureElementKey};
    pub use crate::state::{AuthenticationOutcome, ProgressState};
}
