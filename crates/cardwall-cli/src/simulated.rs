//! Simulated card reader, IdP and secure element driven by a [`Scenario`].

use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;

use cardwall_auth::ResponseStatus;
use cardwall_auth::prelude::*;

use crate::scenario::{CardScenario, FailureStage, IdpScenario, Scenario, SecureElementScenario};

const DUMMY_CERTIFICATE: &str = "3082010a0282010100c3a1";
const SIGNATURE_MASK: u8 = 0x5A;
/// Retry counter of the card holder PIN on an eGK.
const MAX_PIN_RETRIES: u8 = 3;

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// NFC reader that presents at most one card.
pub struct SimulatedReader {
    card: Option<SimulatedCard>,
    discovery_delay: Option<Duration>,
}

impl SimulatedReader {
    pub fn new(scenario: &CardScenario) -> Self {
        let card = (!scenario.absent).then(|| SimulatedCard {
            scenario: scenario.clone(),
        });
        Self {
            card,
            discovery_delay: scenario.discovery_delay,
        }
    }
}

#[async_trait]
impl CardConnectionSource for SimulatedReader {
    type Connection = SimulatedCard;

    async fn first_available(&mut self) -> Result<SimulatedCard, CardError> {
        pause(self.discovery_delay).await;
        let card = self
            .card
            .take()
            .ok_or_else(|| CardError::unavailable("no card presented to the reader"))?;
        tracing::info!("card discovered");
        Ok(card)
    }
}

pub struct SimulatedCard {
    scenario: CardScenario,
}

#[async_trait]
impl CardConnection for SimulatedCard {
    type Channel = SimulatedChannel;

    async fn establish_trusted_channel(&mut self, can: &str) -> Result<SimulatedChannel, CardError> {
        if can != self.scenario.can {
            return Err(CardError::Status(ResponseStatus::AuthenticationFailure));
        }
        Ok(SimulatedChannel {
            certificate: self.scenario.certificate.clone(),
            pin: self.scenario.pin.clone(),
            retry_limit: self.scenario.pin_retries.min(MAX_PIN_RETRIES),
            retries_left: self.scenario.pin_retries.min(MAX_PIN_RETRIES),
            tag_lost_on_signature: self.scenario.tag_lost_on_signature,
            signatures: 0,
        })
    }

    fn release(&mut self) {
        tracing::info!("card released");
    }
}

pub struct SimulatedChannel {
    certificate: Option<String>,
    pin: String,
    retry_limit: u8,
    retries_left: u8,
    tag_lost_on_signature: Option<usize>,
    signatures: usize,
}

impl SimulatedChannel {
    /// Status word a VERIFY command answers with.
    fn verify(&mut self, pin: &str) -> u16 {
        if self.retries_left == 0 {
            return ResponseStatus::PasswordBlocked.status_word();
        }
        if pin == self.pin {
            self.retries_left = self.retry_limit;
            return ResponseStatus::Success.status_word();
        }
        self.retries_left -= 1;
        match self.retries_left {
            0 => ResponseStatus::PasswordBlocked.status_word(),
            n => 0x63C0 | u16::from(n & 0x0F),
        }
    }
}

#[async_trait]
impl SecureChannel for SimulatedChannel {
    async fn retrieve_certificate(&mut self) -> Result<Vec<u8>, CardError> {
        let encoded = self.certificate.as_deref().unwrap_or(DUMMY_CERTIFICATE);
        hex::decode(encoded).map_err(|e| {
            CardError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    async fn verify_pin(&mut self, pin: &str) -> Result<PinVerificationStatus, CardError> {
        Ok(PinVerificationStatus::from_status_word(self.verify(pin)))
    }

    async fn sign_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>, CardError> {
        self.signatures += 1;
        if self.tag_lost_on_signature == Some(self.signatures) {
            return Err(CardError::TagLost);
        }
        Ok(challenge.iter().map(|b| b ^ SIGNATURE_MASK).collect())
    }
}

/// IdP that checks card signatures and fails where the scenario says so.
pub struct SimulatedIdp {
    scenario: IdpScenario,
    user_not_authenticated: bool,
}

impl SimulatedIdp {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            scenario: scenario.idp.clone(),
            user_not_authenticated: scenario.secure_element.user_not_authenticated,
        }
    }

    fn failure_at(&self, stage: FailureStage) -> AuthResult<()> {
        match &self.scenario.failure {
            Some(failure) if failure.stage == stage => Err(HttpCallError {
                status: failure.status,
                body: failure.body.clone(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn handshake(&self, card: &mut dyn CardHandshake, rounds: usize) -> AuthResult<()> {
        pause(self.scenario.latency).await;
        self.failure_at(FailureStage::BeforeHandshake)?;

        let Certificate(certificate) = card.certificate().await?;
        tracing::debug!(bytes = certificate.len(), "certificate received");

        for round in 1..=rounds {
            pause(self.scenario.latency).await;
            let challenge = random_bytes::<32>();
            let signature = card.sign(Challenge(challenge.to_vec())).await?;
            let valid = signature
                .0
                .iter()
                .zip(challenge.iter())
                .all(|(s, c)| s ^ SIGNATURE_MASK == *c);
            if !valid || signature.0.len() != challenge.len() {
                return Err(HttpCallError::new(400, r#"{"gematik_code":"2020"}"#).into());
            }
            tracing::debug!(round, "signature verified");
        }

        if let Some(conflict) = &self.scenario.insurance_conflict {
            return Err(AuthFault::insurance_identifier_already_assigned(
                conflict.in_active_profile,
                conflict.profile_name.clone(),
                conflict.insurance_identifier.clone(),
            ));
        }
        self.failure_at(FailureStage::AfterHandshake)
    }
}

#[async_trait]
impl IdpRemote for SimulatedIdp {
    async fn authenticate_with_health_card(&self, card: &mut dyn CardHandshake) -> AuthResult<()> {
        self.handshake(card, 1).await
    }

    async fn pair_with_secure_element(
        &self,
        key: &SecureElementKey,
        card: &mut dyn CardHandshake,
    ) -> AuthResult<()> {
        tracing::debug!(alias = %key.alias, "registering secure element key");
        self.handshake(card, 2).await
    }

    async fn authenticate_with_secure_element(&self, profile_name: &str) -> AuthResult<()> {
        pause(self.scenario.latency).await;
        self.failure_at(FailureStage::BeforeHandshake)?;
        if self.user_not_authenticated {
            return Err(SecureElementError::UserNotAuthenticated.into());
        }
        if !self.scenario.paired_profiles.iter().any(|p| p == profile_name) {
            return Err(HttpCallError::new(400, r#"{"gematik_code":"2000"}"#).into());
        }
        self.failure_at(FailureStage::AfterHandshake)
    }
}

pub struct SimulatedSecureElement {
    scenario: SecureElementScenario,
}

impl SimulatedSecureElement {
    pub fn new(scenario: &SecureElementScenario) -> Self {
        Self {
            scenario: scenario.clone(),
        }
    }
}

#[async_trait]
impl SecureElement for SimulatedSecureElement {
    async fn generate_key(
        &self,
        alias: &SecureElementAlias,
    ) -> Result<SecureElementKey, SecureElementError> {
        if self.scenario.fail_key_generation {
            return Err(SecureElementError::key_generation("no hardware-backed key store"));
        }
        let mut public_key = vec![0x04];
        public_key.extend_from_slice(&random_bytes::<64>());
        Ok(SecureElementKey {
            alias: alias.clone(),
            public_key,
        })
    }

    async fn delete_key(&self, alias: &SecureElementAlias) -> Result<(), SecureElementError> {
        tracing::info!(alias = %alias, "secure element key deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(retries: u8) -> SimulatedChannel {
        SimulatedChannel {
            certificate: None,
            pin: "123456".into(),
            retry_limit: retries,
            retries_left: retries,
            tag_lost_on_signature: None,
            signatures: 0,
        }
    }

    #[tokio::test]
    async fn test_pin_retry_counter() {
        let mut channel = channel(3);
        assert_eq!(
            channel.verify_pin("000000").await.unwrap(),
            PinVerificationStatus::TwoRetriesLeft
        );
        assert_eq!(
            channel.verify_pin("000000").await.unwrap(),
            PinVerificationStatus::OneRetryLeft
        );
        assert_eq!(
            channel.verify_pin("123456").await.unwrap(),
            PinVerificationStatus::Success
        );
        assert_eq!(
            channel.verify_pin("000000").await.unwrap(),
            PinVerificationStatus::Blocked
        );
        assert_eq!(
            channel.verify_pin("123456").await.unwrap(),
            PinVerificationStatus::Blocked
        );
    }

    #[tokio::test]
    async fn test_correct_pin_resets_retry_counter() {
        let mut channel = channel(3);
        channel.verify_pin("000000").await.unwrap();
        channel.verify_pin("000000").await.unwrap();
        assert_eq!(
            channel.verify_pin("123456").await.unwrap(),
            PinVerificationStatus::Success
        );
        assert_eq!(
            channel.verify_pin("000000").await.unwrap(),
            PinVerificationStatus::TwoRetriesLeft
        );
    }

    #[tokio::test]
    async fn test_generous_retry_budget_is_capped() {
        let mut card = SimulatedCard {
            scenario: CardScenario {
                pin_retries: 10,
                ..CardScenario::default()
            },
        };
        let mut channel = card.establish_trusted_channel("123123").await.unwrap();
        assert_eq!(
            channel.verify_pin("000000").await.unwrap(),
            PinVerificationStatus::TwoRetriesLeft
        );
    }

    #[tokio::test]
    async fn test_tag_lost_on_configured_signature() {
        let mut channel = channel(3);
        channel.tag_lost_on_signature = Some(2);
        assert!(channel.sign_challenge(&[1, 2]).await.is_ok());
        assert!(matches!(
            channel.sign_challenge(&[3]).await,
            Err(CardError::TagLost)
        ));
    }

    #[tokio::test]
    async fn test_reader_without_card() {
        let mut reader = SimulatedReader::new(&CardScenario {
            absent: true,
            ..CardScenario::default()
        });
        assert!(matches!(
            reader.first_available().await,
            Err(CardError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unpaired_profile_is_rejected() {
        let idp = SimulatedIdp::new(&Scenario::default());
        let err = idp.authenticate_with_secure_element("Anna").await.unwrap_err();
        match err {
            AuthFault::Http(call) => {
                assert_eq!(call.body.as_deref(), Some(r#"{"gematik_code":"2000"}"#));
            }
            other => panic!("unexpected fault {other}"),
        }
    }
}
