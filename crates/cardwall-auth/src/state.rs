//! Progress states and failure outcomes of an authentication run.
//!
//! A run emits [`ProgressState`] values in protocol order and ends with exactly
//! one terminal state: [`ProgressState::FlowFinished`] on success or
//! [`ProgressState::Failed`] carrying an [`AuthenticationOutcome`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// One point in the health card / IdP handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProgressState {
    /// The run has started.
    Initialized,
    /// A card connection has been acquired.
    ChannelReady,
    /// PACE completed and the secure channel to the card is up.
    TrustedChannelEstablished,
    /// The card certificate has been handed over to the IdP side.
    CertificateLoaded,
    /// The card answered every signing request.
    CardCommunicationFinished,
    /// The remote IdP protocol completed.
    IdpCommunicationFinished,
    /// Terminal success.
    FlowFinished,
    /// Terminal failure.
    Failed {
        /// Why the run failed.
        outcome: AuthenticationOutcome,
    },
}

impl ProgressState {
    /// Creates a terminal failure state.
    #[must_use]
    pub fn failed(outcome: AuthenticationOutcome) -> Self {
        Self::Failed { outcome }
    }

    /// Returns `true` if no further state follows this one.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FlowFinished | Self::Failed { .. })
    }

    /// Returns `true` for a terminal failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the failure outcome, if this is a failure state.
    #[must_use]
    pub fn outcome(&self) -> Option<&AuthenticationOutcome> {
        match self {
            Self::Failed { outcome } => Some(outcome),
            _ => None,
        }
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::ChannelReady => write!(f, "channel_ready"),
            Self::TrustedChannelEstablished => write!(f, "trusted_channel_established"),
            Self::CertificateLoaded => write!(f, "certificate_loaded"),
            Self::CardCommunicationFinished => write!(f, "card_communication_finished"),
            Self::IdpCommunicationFinished => write!(f, "idp_communication_finished"),
            Self::FlowFinished => write!(f, "flow_finished"),
            Self::Failed { outcome } => write!(f, "failed({})", outcome.code()),
        }
    }
}

/// Closed set of reasons an authentication run can fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AuthenticationOutcome {
    /// The card rejected the CAN while establishing the secure channel.
    #[error("Card access number is wrong")]
    CardAccessNumberWrong,

    /// Wrong PIN; two attempts remain.
    #[error("Wrong PIN, two retries left")]
    PinTwoRetriesLeft,

    /// Wrong PIN; one attempt remains.
    #[error("Wrong PIN, one retry left")]
    PinOneRetryLeft,

    /// The card PIN is blocked.
    #[error("Health card is blocked")]
    CardBlocked,

    /// Card I/O failed, the tag was lost, or the fault was not recognized.
    #[error("Health card communication interrupted")]
    CardCommunicationInterrupted,

    /// The remote IdP protocol failed.
    #[error("IdP communication failed")]
    IdpCommunicationFailed,

    /// The IdP rejected the secure-element authentication.
    #[error("IdP rejected alternate authentication")]
    IdpAltAuthNotSuccessful,

    /// The IdP rejected the card certificate.
    #[error("IdP rejected the health card certificate")]
    IdpInvalidCertificate,

    /// The IdP could not validate the OCSP response for the card certificate.
    #[error("IdP rejected the OCSP response of the health card certificate")]
    IdpInvalidOcspResponse,

    /// The secure-element key was invalidated or biometrics are locked out.
    #[error("User not authenticated for secure element use")]
    UserNotAuthenticated,

    /// Secure-element key generation or signing failed.
    #[error("Secure element cryptography failed")]
    SecureElementCryptographyFailed,

    /// The insurance identifier on the card is already bound to a profile.
    #[error("Insurance identifier {insurance_identifier} already assigned to profile {profile_name}")]
    InsuranceIdentifierAlreadyExists {
        /// Whether the conflicting profile is the active one.
        in_active_profile: bool,
        /// Name of the conflicting profile.
        profile_name: String,
        /// The insurance identifier (KVNR).
        insurance_identifier: String,
    },
}

impl AuthenticationOutcome {
    /// Stable identifier for logs and machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CardAccessNumberWrong => "card_access_number_wrong",
            Self::PinTwoRetriesLeft => "pin_two_retries_left",
            Self::PinOneRetryLeft => "pin_one_retry_left",
            Self::CardBlocked => "card_blocked",
            Self::CardCommunicationInterrupted => "card_communication_interrupted",
            Self::IdpCommunicationFailed => "idp_communication_failed",
            Self::IdpAltAuthNotSuccessful => "idp_alt_auth_not_successful",
            Self::IdpInvalidCertificate => "idp_invalid_certificate",
            Self::IdpInvalidOcspResponse => "idp_invalid_ocsp_response",
            Self::UserNotAuthenticated => "user_not_authenticated",
            Self::SecureElementCryptographyFailed => "secure_element_cryptography_failed",
            Self::InsuranceIdentifierAlreadyExists { .. } => "insurance_identifier_already_exists",
        }
    }

    /// Returns `true` for outcomes caused by the card or its PIN.
    #[must_use]
    pub fn is_card_failure(&self) -> bool {
        matches!(
            self,
            Self::CardAccessNumberWrong
                | Self::PinTwoRetriesLeft
                | Self::PinOneRetryLeft
                | Self::CardBlocked
                | Self::CardCommunicationInterrupted
        )
    }

    /// Returns `true` for outcomes reported by the remote IdP.
    #[must_use]
    pub fn is_idp_failure(&self) -> bool {
        matches!(
            self,
            Self::IdpCommunicationFailed
                | Self::IdpAltAuthNotSuccessful
                | Self::IdpInvalidCertificate
                | Self::IdpInvalidOcspResponse
        )
    }

    /// Returns `true` for outcomes caused by the device secure element.
    #[must_use]
    pub fn is_secure_element_failure(&self) -> bool {
        matches!(
            self,
            Self::UserNotAuthenticated | Self::SecureElementCryptographyFailed
        )
    }
}
