//! Mock collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, Iter};

use cardwall_auth::prelude::*;
use cardwall_auth::{ProgressStream, ResponseStatus};

pub const CAN: &str = "123123";
pub const PIN: &str = "123456";
pub const CERTIFICATE: &[u8] = &[0x30, 0x82, 0x01, 0x0A];

pub fn credentials() -> HealthCardCredentials {
    HealthCardCredentials::new(CAN, PIN)
}

pub async fn collect(stream: ProgressStream) -> Vec<ProgressState> {
    stream.collect().await
}

/// How the simulated card behaves.
#[derive(Debug, Clone)]
pub struct CardScript {
    pub can: String,
    pub pin_status: PinVerificationStatus,
    /// 1-based signature that fails with a lost tag.
    pub tag_lost_on_signature: Option<usize>,
    /// Signing never completes.
    pub hang_on_sign: bool,
}

impl Default for CardScript {
    fn default() -> Self {
        Self {
            can: CAN.to_string(),
            pin_status: PinVerificationStatus::Success,
            tag_lost_on_signature: None,
            hang_on_sign: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct CardStats {
    pub trusted_channels: AtomicUsize,
    pub certificates_read: AtomicUsize,
    pub signatures: AtomicUsize,
    pub released: AtomicUsize,
}

impl CardStats {
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn signatures(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }
}

pub struct MockCard {
    script: CardScript,
    stats: Arc<CardStats>,
}

pub struct MockChannel {
    script: CardScript,
    stats: Arc<CardStats>,
}

#[async_trait]
impl CardConnection for MockCard {
    type Channel = MockChannel;

    async fn establish_trusted_channel(&mut self, can: &str) -> Result<MockChannel, CardError> {
        if can != self.script.can {
            return Err(CardError::Status(ResponseStatus::AuthenticationFailure));
        }
        self.stats.trusted_channels.fetch_add(1, Ordering::SeqCst);
        Ok(MockChannel {
            script: self.script.clone(),
            stats: self.stats.clone(),
        })
    }

    fn release(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecureChannel for MockChannel {
    async fn retrieve_certificate(&mut self) -> Result<Vec<u8>, CardError> {
        self.stats.certificates_read.fetch_add(1, Ordering::SeqCst);
        Ok(CERTIFICATE.to_vec())
    }

    async fn verify_pin(&mut self, _pin: &str) -> Result<PinVerificationStatus, CardError> {
        Ok(self.script.pin_status)
    }

    async fn sign_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>, CardError> {
        if self.script.hang_on_sign {
            std::future::pending::<()>().await;
        }
        let n = self.stats.signatures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.script.tag_lost_on_signature == Some(n) {
            return Err(CardError::TagLost);
        }
        let mut signature = vec![0x5A];
        signature.extend_from_slice(challenge);
        Ok(signature)
    }
}

pub type MockSource = StreamSource<Iter<std::vec::IntoIter<MockCard>>>;

/// A source yielding one card scripted by `script`.
pub fn card_source(script: CardScript) -> (MockSource, Arc<CardStats>) {
    let stats = Arc::new(CardStats::default());
    let card = MockCard {
        script,
        stats: stats.clone(),
    };
    (StreamSource::new(stream::iter(vec![card])), stats)
}

pub fn empty_source() -> MockSource {
    StreamSource::new(stream::iter(Vec::new()))
}

/// How the simulated IdP behaves.
#[derive(Clone, Copy)]
pub struct IdpScript {
    /// Rounds signed in the health card flow.
    pub health_card_rounds: u8,
    /// Rounds signed in the pairing flow.
    pub pairing_rounds: u8,
    /// Asks for the certificate twice.
    pub double_certificate: bool,
    /// Fails before touching the card.
    pub fail_immediately: Option<fn() -> AuthFault>,
    /// Fails after the last signature.
    pub fail_after_handshake: Option<fn() -> AuthFault>,
    /// Result of secure-element authentication.
    pub secure_element_failure: Option<fn() -> AuthFault>,
}

impl Default for IdpScript {
    fn default() -> Self {
        Self {
            health_card_rounds: 1,
            pairing_rounds: 2,
            double_certificate: false,
            fail_immediately: None,
            fail_after_handshake: None,
            secure_element_failure: None,
        }
    }
}

#[derive(Default)]
pub struct IdpLog {
    pub certificates: Mutex<Vec<Certificate>>,
    pub signatures: Mutex<Vec<Signature>>,
    pub paired_aliases: Mutex<Vec<SecureElementAlias>>,
    pub profiles: Mutex<Vec<String>>,
}

impl IdpLog {
    pub fn signatures(&self) -> usize {
        self.signatures.lock().unwrap().len()
    }
}

pub struct ScriptedIdp {
    script: IdpScript,
    pub log: Arc<IdpLog>,
}

impl ScriptedIdp {
    pub fn new(script: IdpScript) -> Self {
        Self {
            script,
            log: Arc::new(IdpLog::default()),
        }
    }

    async fn handshake(&self, card: &mut dyn CardHandshake, rounds: u8) -> AuthResult<()> {
        if let Some(fault) = self.script.fail_immediately {
            return Err(fault());
        }
        let certificate = card.certificate().await?;
        self.log.certificates.lock().unwrap().push(certificate);
        if self.script.double_certificate {
            card.certificate().await?;
        }
        for round in 0..rounds {
            let signature = card.sign(Challenge(vec![0xC0, round])).await?;
            self.log.signatures.lock().unwrap().push(signature);
        }
        match self.script.fail_after_handshake {
            Some(fault) => Err(fault()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdpRemote for ScriptedIdp {
    async fn authenticate_with_health_card(&self, card: &mut dyn CardHandshake) -> AuthResult<()> {
        self.handshake(card, self.script.health_card_rounds).await
    }

    async fn pair_with_secure_element(
        &self,
        key: &SecureElementKey,
        card: &mut dyn CardHandshake,
    ) -> AuthResult<()> {
        self.log
            .paired_aliases
            .lock()
            .unwrap()
            .push(key.alias.clone());
        self.handshake(card, self.script.pairing_rounds).await
    }

    async fn authenticate_with_secure_element(&self, profile_name: &str) -> AuthResult<()> {
        self.log
            .profiles
            .lock()
            .unwrap()
            .push(profile_name.to_string());
        match self.script.secure_element_failure {
            Some(fault) => Err(fault()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MockSecureElement {
    pub fail_generation: bool,
    pub generated: Mutex<Vec<SecureElementAlias>>,
    pub deleted: Mutex<Vec<SecureElementAlias>>,
}

impl MockSecureElement {
    pub fn failing() -> Self {
        Self {
            fail_generation: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SecureElement for MockSecureElement {
    async fn generate_key(
        &self,
        alias: &SecureElementAlias,
    ) -> Result<SecureElementKey, SecureElementError> {
        if self.fail_generation {
            return Err(SecureElementError::key_generation("StrongBox unavailable"));
        }
        self.generated.lock().unwrap().push(alias.clone());
        Ok(SecureElementKey {
            alias: alias.clone(),
            public_key: vec![0x04; 65],
        })
    }

    async fn delete_key(&self, alias: &SecureElementAlias) -> Result<(), SecureElementError> {
        self.deleted.lock().unwrap().push(alias.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<AuthEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuthObserver for RecordingObserver {
    fn on_event(&self, event: &AuthEvent, _cause: Option<&AuthFault>) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Everything one test run needs.
pub struct Harness {
    pub idp: Arc<ScriptedIdp>,
    pub secure_element: Arc<MockSecureElement>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new(script: IdpScript) -> Self {
        Self::with_secure_element(script, MockSecureElement::default())
    }

    pub fn with_secure_element(script: IdpScript, secure_element: MockSecureElement) -> Self {
        Self {
            idp: Arc::new(ScriptedIdp::new(script)),
            secure_element: Arc::new(secure_element),
            observer: Arc::new(RecordingObserver::default()),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.idp.clone(), self.secure_element.clone())
            .with_observer(self.observer.clone())
    }
}
