//! The card side of the handshake.

use crate::bus::{CardEnd, Certificate, Signature};
use crate::card::{CardConnection, PinVerificationStatus, SecureChannel};
use crate::error::AuthFault;
use crate::progress::ProgressSink;
use crate::state::{AuthenticationOutcome, ProgressState};

/// Drives one card session: PACE, certificate handoff, PIN, signing loop.
///
/// The actor borrows the connection; whoever acquired it stays responsible for
/// releasing it.
pub struct CardSessionActor<'a, C: CardConnection> {
    connection: &'a mut C,
    bus: CardEnd,
    progress: &'a ProgressSink,
}

impl<'a, C: CardConnection> CardSessionActor<'a, C> {
    pub(crate) fn new(connection: &'a mut C, bus: CardEnd, progress: &'a ProgressSink) -> Self {
        Self {
            connection,
            bus,
            progress,
        }
    }

    /// Runs the session until the IdP side closes the sign-request lane.
    pub async fn run(self, can: &str, pin: &str) -> Result<(), AuthFault> {
        let Self {
            connection,
            mut bus,
            progress,
        } = self;

        let mut channel = connection.establish_trusted_channel(can).await?;
        progress.emit(ProgressState::TrustedChannelEstablished);

        let certificate = channel.retrieve_certificate().await?;
        bus.certificate.send(Certificate(certificate)).await?;
        progress.emit(ProgressState::CertificateLoaded);

        match channel.verify_pin(pin).await? {
            PinVerificationStatus::Success => {}
            PinVerificationStatus::TwoRetriesLeft => {
                return Err(AuthFault::outcome(AuthenticationOutcome::PinTwoRetriesLeft));
            }
            PinVerificationStatus::OneRetryLeft => {
                return Err(AuthFault::outcome(AuthenticationOutcome::PinOneRetryLeft));
            }
            PinVerificationStatus::Blocked => {
                return Err(AuthFault::outcome(AuthenticationOutcome::CardBlocked));
            }
        }

        let mut signed = 0usize;
        while let Some(challenge) = bus.sign_requests.recv().await {
            let signature = channel.sign_challenge(&challenge.0).await?;
            bus.sign_responses.send(Signature(signature)).await?;
            signed += 1;
        }
        tracing::trace!(signed, "sign-request lane closed");

        progress.emit(ProgressState::CardCommunicationFinished);
        Ok(())
    }
}
