//! The IdP side of the handshake.

use async_trait::async_trait;

use crate::bus::{Certificate, Challenge, IdpEnd, Signature};
use crate::error::AuthFault;
use crate::idp::{CardHandshake, FlowKind, IdpRemote};
use crate::progress::ProgressSink;
use crate::secure_element::SecureElementKey;
use crate::state::ProgressState;

/// [`CardHandshake`] backed by the rendezvous bus.
///
/// The default flow closes the sign-request lane as soon as its only challenge
/// has been handed over. The pairing flow keeps it open until the second
/// signature has come back.
struct BusHandshake {
    bus: IdpEnd,
    rounds: usize,
    budget: usize,
    close_after_response: bool,
    certificate_taken: bool,
}

impl BusHandshake {
    fn new(bus: IdpEnd, flow: FlowKind) -> Self {
        Self {
            bus,
            rounds: 0,
            budget: flow.signature_rounds(),
            close_after_response: flow == FlowKind::Pairing,
            certificate_taken: false,
        }
    }

    fn close_requests(&mut self) {
        if let Some(requests) = self.bus.sign_requests.take() {
            requests.close();
        }
    }
}

#[async_trait]
impl CardHandshake for BusHandshake {
    async fn certificate(&mut self) -> Result<Certificate, AuthFault> {
        if self.certificate_taken {
            return Err(AuthFault::protocol("certificate requested twice"));
        }
        self.certificate_taken = true;
        Ok(self.bus.certificate.expect().await?)
    }

    async fn sign(&mut self, challenge: Challenge) -> Result<Signature, AuthFault> {
        if self.rounds >= self.budget {
            return Err(AuthFault::protocol(format!(
                "signature round {} exceeds budget of {}",
                self.rounds + 1,
                self.budget
            )));
        }
        let requests = self
            .bus
            .sign_requests
            .as_ref()
            .ok_or_else(|| AuthFault::protocol("sign-request lane already closed"))?;

        requests.send(challenge).await?;
        self.rounds += 1;

        let last_round = self.rounds == self.budget;
        if last_round && !self.close_after_response {
            self.close_requests();
        }

        let signature = self.bus.sign_responses.expect().await?;

        if last_round && self.close_after_response {
            self.close_requests();
        }
        Ok(signature)
    }
}

/// Drives the remote protocol for the health card and pairing flows.
pub struct IdpSessionActor<'a> {
    handshake: BusHandshake,
    pairing_key: Option<&'a SecureElementKey>,
    progress: &'a ProgressSink,
}

impl<'a> IdpSessionActor<'a> {
    /// Actor for plain health card authentication.
    pub(crate) fn health_card(bus: IdpEnd, progress: &'a ProgressSink) -> Self {
        Self {
            handshake: BusHandshake::new(bus, FlowKind::HealthCard),
            pairing_key: None,
            progress,
        }
    }

    /// Actor for the pairing flow registering `key`.
    pub(crate) fn pairing(
        bus: IdpEnd,
        key: &'a SecureElementKey,
        progress: &'a ProgressSink,
    ) -> Self {
        Self {
            handshake: BusHandshake::new(bus, FlowKind::Pairing),
            pairing_key: Some(key),
            progress,
        }
    }

    /// Runs the remote protocol to completion.
    ///
    /// The bus is dropped on return, which ends the card's signing loop if the
    /// remote did not use every round.
    pub async fn run(mut self, remote: &dyn IdpRemote) -> Result<(), AuthFault> {
        match self.pairing_key {
            Some(key) => {
                remote
                    .pair_with_secure_element(key, &mut self.handshake)
                    .await?
            }
            None => {
                remote
                    .authenticate_with_health_card(&mut self.handshake)
                    .await?
            }
        }
        tracing::trace!(rounds = self.handshake.rounds, "remote protocol completed");

        self.progress.emit(ProgressState::IdpCommunicationFinished);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handshake_bus;

    #[tokio::test]
    async fn test_default_flow_closes_after_challenge() {
        let (mut card, idp) = handshake_bus();
        let mut handshake = BusHandshake::new(idp, FlowKind::HealthCard);

        let card_side = async {
            card.certificate.send(Certificate(vec![1])).await.unwrap();
            let challenge = card.sign_requests.recv().await.unwrap();
            // Closed before the signature has been sent back.
            assert!(card.sign_requests.recv().await.is_none());
            card.sign_responses
                .send(Signature(challenge.into_bytes()))
                .await
                .unwrap();
        };

        let idp_side = async {
            assert_eq!(handshake.certificate().await.unwrap(), Certificate(vec![1]));
            let signature = handshake.sign(Challenge(vec![5])).await.unwrap();
            assert_eq!(signature, Signature(vec![5]));
            assert!(matches!(
                handshake.sign(Challenge(vec![6])).await,
                Err(AuthFault::Protocol(_))
            ));
            assert!(matches!(
                handshake.certificate().await,
                Err(AuthFault::Protocol(_))
            ));
        };

        tokio::join!(card_side, idp_side);
    }

    #[tokio::test]
    async fn test_pairing_flow_closes_after_second_response() {
        let (mut card, idp) = handshake_bus();
        let mut handshake = BusHandshake::new(idp, FlowKind::Pairing);

        let card_side = async {
            for round in 0..2u8 {
                let challenge = card.sign_requests.recv().await.unwrap();
                assert_eq!(challenge, Challenge(vec![round]));
                card.sign_responses
                    .send(Signature(vec![round, 0xFF]))
                    .await
                    .unwrap();
            }
            assert!(card.sign_requests.recv().await.is_none());
        };

        let idp_side = async {
            let first = handshake.sign(Challenge(vec![0])).await.unwrap();
            assert!(handshake.bus.sign_requests.is_some());
            let second = handshake.sign(Challenge(vec![1])).await.unwrap();
            assert!(handshake.bus.sign_requests.is_none());
            (first, second)
        };

        let ((), (first, second)) = tokio::join!(card_side, idp_side);
        assert_eq!(first, Signature(vec![0, 0xFF]));
        assert_eq!(second, Signature(vec![1, 0xFF]));
    }
}
