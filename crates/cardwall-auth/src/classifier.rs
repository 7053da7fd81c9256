//! Maps faults onto the closed [`AuthenticationOutcome`] taxonomy.
//!
//! [`classify`] is pure: the same fault in the same context always yields the
//! same outcome. Rules, highest priority first:
//!
//! 1. Cancellation is handed back as [`Cancelled`], wherever it is nested.
//! 2. An aggregate with suppressed causes is classified by its first suppressed cause.
//! 3. Faults that already carry an outcome pass through.
//! 4. HTTP failures are mapped by the `gematik_code` in their JSON error body.
//! 5. An insurance identifier conflict keeps its details.
//! 6. Secure-element faults map to `UserNotAuthenticated` or
//!    `SecureElementCryptographyFailed`.
//! 7. Card faults map to `CardAccessNumberWrong` (PACE rejected the CAN) or
//!    `CardCommunicationInterrupted`.
//! 8. Everything else falls back to the branch the fault came from.

use std::fmt;

use serde::Deserialize;

use crate::card::ResponseStatus;
use crate::error::{AuthFault, Cancelled, CardError, HttpCallError, SecureElementError};
use crate::state::AuthenticationOutcome;

/// Which actor raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// The card session actor, or the run itself before the actors start.
    Card,
    /// The IdP session actor.
    Idp,
}

impl Branch {
    /// Outcome used when a fault from this branch is not otherwise recognized.
    #[must_use]
    pub fn fallback(self) -> AuthenticationOutcome {
        match self {
            Self::Card => AuthenticationOutcome::CardCommunicationInterrupted,
            Self::Idp => AuthenticationOutcome::IdpCommunicationFailed,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::Idp => write!(f, "idp"),
        }
    }
}

/// Context a fault is classified in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyContext {
    /// Branch that raised the fault.
    pub branch: Branch,
    /// Whether the run authenticates with an already-paired secure element.
    pub alternate_authentication: bool,
}

impl ClassifyContext {
    /// Context for faults from the card actor.
    #[must_use]
    pub fn card() -> Self {
        Self {
            branch: Branch::Card,
            alternate_authentication: false,
        }
    }

    /// Context for faults from the IdP actor.
    #[must_use]
    pub fn idp() -> Self {
        Self {
            branch: Branch::Idp,
            alternate_authentication: false,
        }
    }

    /// Context for faults from the secure-element authentication flow.
    #[must_use]
    pub fn alternate_authentication() -> Self {
        Self {
            branch: Branch::Idp,
            alternate_authentication: true,
        }
    }
}

/// Error codes the IdP returns as `{ "gematik_code": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GematikErrorCode {
    /// `2000`: alternate authentication was not successful.
    AltAuthNotSuccessful,
    /// `2020`: the health card certificate is invalid.
    InvalidHealthCardCertificate,
    /// `2021`: the OCSP response for the health card certificate is invalid.
    InvalidOcspResponse,
    /// Any other code.
    Unknown(String),
}

impl GematikErrorCode {
    /// Parses a code value.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "2000" => Self::AltAuthNotSuccessful,
            "2020" => Self::InvalidHealthCardCertificate,
            "2021" => Self::InvalidOcspResponse,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct IdpErrorBody {
    gematik_code: Option<String>,
}

/// Extracts the `gematik_code` from an IdP error body.
///
/// Returns `None` for malformed JSON, a missing field, or a non-string value.
#[must_use]
pub fn parse_gematik_code(body: &str) -> Option<GematikErrorCode> {
    serde_json::from_str::<IdpErrorBody>(body)
        .ok()?
        .gematik_code
        .map(|code| GematikErrorCode::from_code(&code))
}

/// Classifies `fault` raised in `context`.
///
/// Returns `Err(Cancelled)` if the fault is, or contains, a cancellation.
pub fn classify(
    fault: &AuthFault,
    context: ClassifyContext,
) -> Result<AuthenticationOutcome, Cancelled> {
    if fault.is_cancellation() {
        return Err(Cancelled);
    }

    let outcome = match fault {
        AuthFault::Cancelled => return Err(Cancelled),
        AuthFault::Aggregate { fault, suppressed } => {
            return classify(suppressed.first().unwrap_or(fault.as_ref()), context);
        }
        AuthFault::Outcome(outcome) => outcome.clone(),
        AuthFault::Http(err) => classify_http(err, context),
        AuthFault::InsuranceIdentifierAlreadyAssigned {
            in_active_profile,
            profile_name,
            insurance_identifier,
        } => AuthenticationOutcome::InsuranceIdentifierAlreadyExists {
            in_active_profile: *in_active_profile,
            profile_name: profile_name.clone(),
            insurance_identifier: insurance_identifier.clone(),
        },
        AuthFault::SecureElement(err) => classify_secure_element(err),
        AuthFault::Card(err) => classify_card(err),
        AuthFault::Bus(_) | AuthFault::Protocol(_) | AuthFault::Other(_) => {
            context.branch.fallback()
        }
    };

    if context.alternate_authentication {
        return Ok(restrict_to_alternate_authentication(outcome));
    }
    Ok(outcome)
}

/// The secure-element flow never touches a card, so only its own outcomes
/// survive; everything else reports as a failed IdP call.
fn restrict_to_alternate_authentication(outcome: AuthenticationOutcome) -> AuthenticationOutcome {
    match outcome {
        AuthenticationOutcome::IdpCommunicationFailed
        | AuthenticationOutcome::IdpAltAuthNotSuccessful => outcome,
        outcome if outcome.is_secure_element_failure() => outcome,
        _ => AuthenticationOutcome::IdpCommunicationFailed,
    }
}

fn classify_http(err: &HttpCallError, context: ClassifyContext) -> AuthenticationOutcome {
    let code = err.body.as_deref().and_then(parse_gematik_code);

    match code {
        Some(GematikErrorCode::InvalidHealthCardCertificate) => {
            AuthenticationOutcome::IdpInvalidCertificate
        }
        Some(GematikErrorCode::InvalidOcspResponse) => AuthenticationOutcome::IdpInvalidOcspResponse,
        Some(GematikErrorCode::AltAuthNotSuccessful) if context.alternate_authentication => {
            AuthenticationOutcome::IdpAltAuthNotSuccessful
        }
        _ => context.branch.fallback(),
    }
}

fn classify_secure_element(err: &SecureElementError) -> AuthenticationOutcome {
    if err.is_authentication_error() {
        AuthenticationOutcome::UserNotAuthenticated
    } else {
        AuthenticationOutcome::SecureElementCryptographyFailed
    }
}

fn classify_card(err: &CardError) -> AuthenticationOutcome {
    match err {
        CardError::Status(ResponseStatus::AuthenticationFailure) => {
            AuthenticationOutcome::CardAccessNumberWrong
        }
        err if err.is_connection_lost() => {
            tracing::debug!(error = %err, "card left the field");
            AuthenticationOutcome::CardCommunicationInterrupted
        }
        CardError::TagLost | CardError::Io(_) | CardError::Status(_) | CardError::Unavailable(_) => {
            AuthenticationOutcome::CardCommunicationInterrupted
        }
    }
}
