//! Rendezvous channels coupling the card actor and the IdP actor.
//!
//! ```text
//!          ┌──────────────┐   certificate    ┌──────────────┐
//!          │              │ ───────────────▶ │              │
//!          │  Card actor  │   sign request   │  IdP actor   │
//!          │   (CardEnd)  │ ◀─────────────── │   (IdpEnd)   │
//!          │              │   sign response  │              │
//!          │              │ ───────────────▶ │              │
//!          └──────────────┘                  └──────────────┘
//! ```
//!
//! Every lane has zero effective capacity: [`RendezvousSender::send`] only
//! returns once the peer has taken the value out with
//! [`RendezvousReceiver::recv`]. A lane is an `mpsc` channel of one slot whose
//! items carry a `oneshot` acknowledgement the receiver fires on pickup.

use std::fmt;

use tokio::sync::{mpsc, oneshot};

use crate::error::BusError;

/// Kind of payload moving over a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Certificate,
    Challenge,
    Signature,
}

impl MessageKind {
    fn lane_name(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Challenge => "sign-request",
            Self::Signature => "sign-response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate => write!(f, "certificate"),
            Self::Challenge => write!(f, "challenge"),
            Self::Signature => write!(f, "signature"),
        }
    }
}

/// Payload carried by a rendezvous lane.
pub trait HandshakePayload: Send + 'static {
    /// Which lane this payload travels on.
    const KIND: MessageKind;

    /// Payload size in bytes, for logging.
    fn len(&self) -> usize;

    /// Returns `true` if the payload is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! payload {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(pub Vec<u8>);

        impl $name {
            /// Returns the raw bytes.
            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({} bytes)", stringify!($name), self.0.len())
            }
        }

        impl HandshakePayload for $name {
            const KIND: MessageKind = $kind;

            fn len(&self) -> usize {
                self.0.len()
            }
        }
    };
}

payload!(
    /// DER-encoded health card authentication certificate.
    Certificate,
    MessageKind::Certificate
);
payload!(
    /// Challenge the IdP wants signed by the card.
    Challenge,
    MessageKind::Challenge
);
payload!(
    /// Card signature over a [`Challenge`].
    Signature,
    MessageKind::Signature
);

struct Handoff<T> {
    value: T,
    ack: oneshot::Sender<()>,
}

/// Sending half of a rendezvous lane. Dropping it closes the lane.
pub struct RendezvousSender<T> {
    tx: mpsc::Sender<Handoff<T>>,
}

/// Receiving half of a rendezvous lane.
pub struct RendezvousReceiver<T> {
    rx: mpsc::Receiver<Handoff<T>>,
}

/// Creates a zero-capacity lane.
pub fn rendezvous<T: HandshakePayload>() -> (RendezvousSender<T>, RendezvousReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (RendezvousSender { tx }, RendezvousReceiver { rx })
}

impl<T: HandshakePayload> RendezvousSender<T> {
    /// Hands `value` to the receiver, waiting until it has been taken.
    pub async fn send(&self, value: T) -> Result<(), BusError> {
        let closed = || BusError::Closed(T::KIND.lane_name());
        let bytes = value.len();
        let (ack, picked_up) = oneshot::channel();

        self.tx
            .send(Handoff { value, ack })
            .await
            .map_err(|_| closed())?;
        // The receiver drops the handoff unacknowledged if it goes away first.
        picked_up.await.map_err(|_| closed())?;

        tracing::trace!(kind = %T::KIND, bytes, "handoff completed");
        Ok(())
    }

    /// Closes the lane; the receiver sees the end after draining.
    pub fn close(self) {}
}

impl<T: HandshakePayload> RendezvousReceiver<T> {
    /// Takes the next value, or `None` once the sender has closed the lane.
    pub async fn recv(&mut self) -> Option<T> {
        let Handoff { value, ack } = self.rx.recv().await?;
        if ack.send(()).is_err() {
            tracing::trace!(kind = %T::KIND, "sender gave up before the handoff was acknowledged");
        }
        Some(value)
    }

    /// Like [`recv`](Self::recv) but treats a closed lane as an error.
    pub async fn expect(&mut self) -> Result<T, BusError> {
        self.recv()
            .await
            .ok_or(BusError::Closed(T::KIND.lane_name()))
    }
}

/// The card actor's side of the bus.
pub struct CardEnd {
    pub(crate) certificate: RendezvousSender<Certificate>,
    pub(crate) sign_requests: RendezvousReceiver<Challenge>,
    pub(crate) sign_responses: RendezvousSender<Signature>,
}

/// The IdP actor's side of the bus.
pub struct IdpEnd {
    pub(crate) certificate: RendezvousReceiver<Certificate>,
    pub(crate) sign_requests: Option<RendezvousSender<Challenge>>,
    pub(crate) sign_responses: RendezvousReceiver<Signature>,
}

/// Creates the three lanes of one run, split by actor.
pub fn handshake_bus() -> (CardEnd, IdpEnd) {
    let (certificate_tx, certificate_rx) = rendezvous();
    let (request_tx, request_rx) = rendezvous();
    let (response_tx, response_rx) = rendezvous();

    (
        CardEnd {
            certificate: certificate_tx,
            sign_requests: request_rx,
            sign_responses: response_tx,
        },
        IdpEnd {
            certificate: certificate_rx,
            sign_requests: Some(request_tx),
            sign_responses: response_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_waits_for_receiver() {
        let (tx, mut rx) = rendezvous::<Challenge>();

        let send = tokio::spawn(async move { tx.send(Challenge(vec![1, 2, 3])).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send.is_finished(), "send returned before pickup");

        let value = rx.recv().await.unwrap();
        assert_eq!(value, Challenge(vec![1, 2, 3]));
        assert!(send.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_pending_send() {
        let (tx, rx) = rendezvous::<Certificate>();

        let send = tokio::spawn(async move { tx.send(Certificate(vec![0xAA])).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(rx);

        let err = send.await.unwrap().unwrap_err();
        assert_eq!(err, BusError::Closed("certificate"));
    }

    #[tokio::test]
    async fn test_abandoned_send_is_still_delivered() {
        let (tx, mut rx) = rendezvous::<Signature>();

        let send = tokio::spawn(async move { tx.send(Signature(vec![0x5A])).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        send.abort();
        assert!(send.await.unwrap_err().is_cancelled());

        // The queued value survives its sender; the lane then ends.
        assert_eq!(rx.recv().await, Some(Signature(vec![0x5A])));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_ends_receiver() {
        let (tx, mut rx) = rendezvous::<Challenge>();
        tx.close();
        assert!(rx.recv().await.is_none());
        assert_eq!(
            rx.expect().await.unwrap_err(),
            BusError::Closed("sign-request")
        );
    }

    #[tokio::test]
    async fn test_handshake_bus_lanes() {
        let (mut card, mut idp) = handshake_bus();

        let card_side = async {
            card.certificate.send(Certificate(vec![7])).await.unwrap();
            let challenge = card.sign_requests.recv().await.unwrap();
            card.sign_responses
                .send(Signature(challenge.into_bytes()))
                .await
                .unwrap();
            assert!(card.sign_requests.recv().await.is_none());
        };

        let idp_side = async {
            assert_eq!(idp.certificate.expect().await.unwrap(), Certificate(vec![7]));
            let requests = idp.sign_requests.take().unwrap();
            requests.send(Challenge(vec![9])).await.unwrap();
            assert_eq!(idp.sign_responses.expect().await.unwrap(), Signature(vec![9]));
            requests.close();
        };

        tokio::join!(card_side, idp_side);
    }

    #[test]
    fn test_payload_debug_hides_bytes() {
        assert_eq!(format!("{:?}", Signature(vec![1, 2, 3])), "Signature(3 bytes)");
    }
}
