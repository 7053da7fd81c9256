//! Runs the card and IdP actors against each other and reports progress.
//!
//! ```text
//! Initialized → ChannelReady ─┬─ card: TrustedChannelEstablished → CertificateLoaded → CardCommunicationFinished ─┬─ FlowFinished
//!                             └─ idp:  IdpCommunicationFinished ────────────────────────────────────────────────┘
//! ```
//!
//! Both actors run inside the stream's driver future under a fail-fast join.
//! The first fault drops the sibling, is classified in the context of the
//! branch that raised it, and ends the stream with a `Failed` state.

use std::fmt;
use std::sync::Arc;

use futures_util::TryFutureExt;
use tokio_util::sync::CancellationToken;

use crate::bus::handshake_bus;
use crate::card::{CardConnectionSource, CardSessionActor, ConnectionGuard};
use crate::classifier::{Branch, ClassifyContext, classify};
use crate::config::CardwallConfig;
use crate::error::{AuthFault, CardError};
use crate::idp::{FlowKind, IdpRemote, IdpSessionActor};
use crate::observer::{AuthEvent, AuthObserver, TracingObserver};
use crate::progress::{ProgressSink, ProgressStream};
use crate::secure_element::{SecureElement, SecureElementAlias, SecureElementKey};
use crate::state::{AuthenticationOutcome, ProgressState};

/// Card access number and PIN for one run.
#[derive(Clone, PartialEq, Eq)]
pub struct HealthCardCredentials {
    pub can: String,
    pub pin: String,
}

impl HealthCardCredentials {
    pub fn new(can: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            can: can.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Debug for HealthCardCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCardCredentials")
            .field("can", &"<redacted>")
            .field("pin", &"<redacted>")
            .finish()
    }
}

/// Identifies the profile whose paired key authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureElementCredentials {
    pub profile_name: String,
}

impl SecureElementCredentials {
    pub fn new(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
        }
    }
}

/// A flow together with its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    HealthCard(HealthCardCredentials),
    Pairing(HealthCardCredentials),
    SecureElement(SecureElementCredentials),
}

impl Flow {
    #[must_use]
    pub fn kind(&self) -> FlowKind {
        match self {
            Self::HealthCard(_) => FlowKind::HealthCard,
            Self::Pairing(_) => FlowKind::Pairing,
            Self::SecureElement(_) => FlowKind::SecureElement,
        }
    }
}

/// A fault tagged with the branch that raised it.
struct BranchFailure {
    branch: Branch,
    fault: AuthFault,
}

impl BranchFailure {
    fn card(fault: AuthFault) -> Self {
        Self {
            branch: Branch::Card,
            fault,
        }
    }

    fn idp(fault: AuthFault) -> Self {
        Self {
            branch: Branch::Idp,
            fault,
        }
    }
}

/// Collaborators shared by every run of an [`Orchestrator`].
#[derive(Clone)]
struct RunContext {
    remote: Arc<dyn IdpRemote>,
    secure_element: Arc<dyn SecureElement>,
    observer: Arc<dyn AuthObserver>,
    config: CardwallConfig,
}

impl RunContext {
    /// Classifies `failure` and emits the terminal state.
    ///
    /// Cancellation emits nothing.
    fn fail(&self, sink: &ProgressSink, failure: BranchFailure, alternate_authentication: bool) {
        let BranchFailure { branch, fault } = failure;
        self.observer
            .on_event(&AuthEvent::BranchFailed(branch), Some(&fault));

        let context = match branch {
            _ if alternate_authentication => ClassifyContext::alternate_authentication(),
            Branch::Card => ClassifyContext::card(),
            Branch::Idp => ClassifyContext::idp(),
        };
        match classify(&fault, context) {
            Ok(outcome) => {
                self.observer
                    .on_event(&AuthEvent::Classified(outcome.clone()), Some(&fault));
                sink.emit(ProgressState::failed(outcome));
            }
            Err(_) => self.observer.on_event(&AuthEvent::Cancelled, Some(&fault)),
        }
    }

    async fn acquire<S: CardConnectionSource>(
        &self,
        source: &mut S,
    ) -> Result<S::Connection, AuthFault> {
        let Some(timeout) = self.config.card.discovery_timeout else {
            return Ok(source.first_available().await?);
        };
        match tokio::time::timeout(timeout, source.first_available()).await {
            Ok(connection) => Ok(connection?),
            Err(_) => Err(CardError::unavailable(format!(
                "no card discovered within {timeout:?}"
            ))
            .into()),
        }
    }

    async fn generate_key(&self, sink: &ProgressSink) -> Option<SecureElementKey> {
        let alias = SecureElementAlias::generate();
        match self.secure_element.generate_key(&alias).await {
            Ok(key) => {
                self.observer.on_event(
                    &AuthEvent::KeyGenerated {
                        alias: alias.to_hex(),
                    },
                    None,
                );
                Some(key)
            }
            Err(err) => {
                self.observer
                    .on_event(&AuthEvent::KeyGenerationFailed, Some(&AuthFault::from(err)));
                sink.emit(ProgressState::failed(
                    AuthenticationOutcome::SecureElementCryptographyFailed,
                ));
                None
            }
        }
    }

    async fn delete_key(&self, key: &SecureElementKey) {
        let alias = key.alias.to_hex();
        match self.secure_element.delete_key(&key.alias).await {
            Ok(()) => self
                .observer
                .on_event(&AuthEvent::KeyDeleted { alias }, None),
            Err(err) => self
                .observer
                .on_event(&AuthEvent::KeyDeletionFailed { alias }, Some(&AuthFault::from(err))),
        }
    }

    async fn drive_card_flow<S: CardConnectionSource>(
        self,
        sink: ProgressSink,
        flow: Flow,
        mut source: S,
    ) {
        let (credentials, pairing) = match flow {
            Flow::HealthCard(credentials) => (credentials, false),
            Flow::Pairing(credentials) => (credentials, true),
            Flow::SecureElement(credentials) => {
                return self.drive_secure_element_flow(sink, credentials).await;
            }
        };

        sink.emit(ProgressState::Initialized);

        let connection = match self.acquire(&mut source).await {
            Ok(connection) => connection,
            Err(fault) => return self.fail(&sink, BranchFailure::card(fault), false),
        };
        let mut guard = ConnectionGuard::new(connection);
        sink.emit(ProgressState::ChannelReady);

        let key = if pairing {
            match self.generate_key(&sink).await {
                Some(key) => Some(key),
                None => return,
            }
        } else {
            None
        };

        let (card_end, idp_end) = handshake_bus();
        let card = CardSessionActor::new(guard.connection(), card_end, &sink)
            .run(&credentials.can, &credentials.pin)
            .map_err(BranchFailure::card);
        let idp = match &key {
            Some(key) => IdpSessionActor::pairing(idp_end, key, &sink),
            None => IdpSessionActor::health_card(idp_end, &sink),
        };
        let idp = idp.run(self.remote.as_ref()).map_err(BranchFailure::idp);

        let result = tokio::try_join!(card, idp);
        drop(guard);
        match result {
            Ok(((), ())) => sink.emit(ProgressState::FlowFinished),
            Err(failure) => {
                // The key goes before the terminal state; callers may stop
                // polling as soon as they see it.
                if let Some(key) = &key {
                    if !failure.fault.is_cancellation()
                        && self.config.pairing.delete_key_on_failure
                    {
                        self.delete_key(key).await;
                    }
                }
                self.fail(&sink, failure, false);
            }
        }
    }

    async fn drive_secure_element_flow(
        self,
        sink: ProgressSink,
        credentials: SecureElementCredentials,
    ) {
        sink.emit(ProgressState::Initialized);
        match self
            .remote
            .authenticate_with_secure_element(&credentials.profile_name)
            .await
        {
            Ok(()) => {
                sink.emit(ProgressState::IdpCommunicationFinished);
                sink.emit(ProgressState::FlowFinished);
            }
            Err(fault) => self.fail(&sink, BranchFailure::idp(fault), true),
        }
    }
}

/// Entry point for authentication runs.
///
/// Each call returns a fresh [`ProgressStream`]; nothing is shared between runs
/// except the injected collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    context: RunContext,
    cancellation: Option<CancellationToken>,
}

impl Orchestrator {
    pub fn new(remote: Arc<dyn IdpRemote>, secure_element: Arc<dyn SecureElement>) -> Self {
        Self {
            context: RunContext {
                remote,
                secure_element,
                observer: Arc::new(TracingObserver),
                config: CardwallConfig::default(),
            },
            cancellation: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn AuthObserver>) -> Self {
        self.context.observer = observer;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: CardwallConfig) -> Self {
        self.context.config = config;
        self
    }

    /// Runs started afterwards end silently once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &CardwallConfig {
        &self.context.config
    }

    /// Authenticates with the health card.
    pub fn authenticate_with_health_card<S: CardConnectionSource>(
        &self,
        credentials: HealthCardCredentials,
        source: S,
    ) -> ProgressStream {
        self.run(Flow::HealthCard(credentials), source)
    }

    /// Authenticates with the health card and pairs a new secure-element key.
    pub fn pair_with_secure_element<S: CardConnectionSource>(
        &self,
        credentials: HealthCardCredentials,
        source: S,
    ) -> ProgressStream {
        self.run(Flow::Pairing(credentials), source)
    }

    /// Authenticates with an already-paired secure-element key. No card is
    /// involved.
    pub fn authenticate_with_secure_element(
        &self,
        credentials: SecureElementCredentials,
    ) -> ProgressStream {
        let context = self.context.clone();
        self.start(FlowKind::SecureElement, move |sink| {
            context.drive_secure_element_flow(sink, credentials)
        })
    }

    /// Runs `flow`, taking the card from `source` if the flow needs one.
    pub fn run<S: CardConnectionSource>(&self, flow: Flow, source: S) -> ProgressStream {
        let context = self.context.clone();
        self.start(flow.kind(), move |sink| {
            context.drive_card_flow(sink, flow, source)
        })
    }

    fn start<F, Fut>(&self, kind: FlowKind, drive: F) -> ProgressStream
    where
        F: FnOnce(ProgressSink) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let observer = self.context.observer.clone();
        let cancellation = self.cancellation.clone();

        ProgressStream::new(self.context.observer.clone(), move |sink| async move {
            observer.on_event(&AuthEvent::FlowStarted(kind), None);
            let run = drive(sink);
            match cancellation {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            observer.on_event(&AuthEvent::Cancelled, None);
                        }
                        _ = run => {}
                    }
                }
                None => run.await,
            }
        })
    }
}
