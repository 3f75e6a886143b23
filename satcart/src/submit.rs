//! Order submission channel.
//!
//! Takes a built [`Order`], encrypts its payloads to the merchant, wraps
//! them in signed direct-message envelopes, and publishes them with a
//! bounded wait for network acceptance.
//!
//! The two representations (structured first, then human-readable) are sent
//! as independent envelopes with monotonically increasing timestamps, so
//! per-client display ordering is deterministic. Failure of the first
//! envelope fails the whole submission with no partial state — the order id
//! is generated before submission, so a retry is idempotent. Failure of the
//! second envelope is tolerated and recorded on the receipt instead of
//! rolling back the first.

use std::sync::Arc;
use std::time::Duration;

use crate::codec;
use crate::error::CheckoutError;
use crate::order::{Order, OrderId};
use crate::proto::{DM_KIND, RECIPIENT_TAG};
use crate::transport::{
    EventTemplate, EventTransport, SignerIdentity, TransportError, now_secs,
};

/// Default bound on waiting for the network to accept a publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a successful order submission.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    /// The submitted order's identifier.
    pub order_id: OrderId,
    /// Whether the human-readable companion envelope was also accepted.
    /// `false` means the structured order went through but the summary did
    /// not; the order itself stands.
    pub readable_delivered: bool,
}

/// Publishes orders and confirmations to the merchant as encrypted DMs.
pub struct OrderSubmitter {
    transport: Arc<dyn EventTransport>,
    signer: Arc<dyn SignerIdentity>,
    publish_timeout: Duration,
}

impl std::fmt::Debug for OrderSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSubmitter")
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}

impl OrderSubmitter {
    /// Creates a submitter for the given transport and signing identity.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::AuthenticationRequired`] if no identity is
    /// active, and [`CheckoutError::UnsupportedEncryption`] if the identity
    /// cannot encrypt direct messages. Both are checked up front so a
    /// checkout that cannot finish never starts.
    pub fn new(
        transport: Arc<dyn EventTransport>,
        signer: Option<Arc<dyn SignerIdentity>>,
    ) -> Result<Self, CheckoutError> {
        let signer = signer.ok_or(CheckoutError::AuthenticationRequired)?;
        if signer.dm_cipher().is_none() {
            return Err(CheckoutError::UnsupportedEncryption);
        }
        Ok(Self {
            transport,
            signer,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        })
    }

    /// Sets the publish acknowledgement bound.
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Returns the buyer's public key.
    #[must_use]
    pub fn pubkey(&self) -> &str {
        self.signer.pubkey()
    }

    /// Submits an order to the merchant.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::PublishTimeout`] if the network does not
    /// acknowledge the structured envelope within the bound; the caller may
    /// retry with the same [`Order`] (and therefore the same id).
    pub async fn submit(&self, order: &Order) -> Result<SubmitReceipt, CheckoutError> {
        let machine = serde_json::to_string(&codec::structured(order))
            .expect("order message serializes to JSON");
        let summary = codec::readable(order);

        let base_ts = now_secs();
        self.send_dm(&order.merchant_pubkey, &machine, base_ts)
            .await?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(order_id = %order.id, "structured order envelope accepted");

        // Second envelope is best-effort: the order already stands.
        let readable_delivered = match self
            .send_dm(&order.merchant_pubkey, &summary, base_ts + 1)
            .await
        {
            Ok(()) => true,
            Err(_err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    order_id = %order.id,
                    error = %_err,
                    "readable order envelope not delivered"
                );
                false
            }
        };

        Ok(SubmitReceipt {
            order_id: order.id.clone(),
            readable_delivered,
        })
    }

    /// Publishes a best-effort settlement confirmation DM.
    ///
    /// # Errors
    ///
    /// Returns the publish error; callers treat it as best-effort since the
    /// settlement itself already happened off-protocol.
    pub async fn send_confirmation(
        &self,
        order: &Order,
        amount_sats: u64,
    ) -> Result<(), CheckoutError> {
        let body = codec::confirmation(order, amount_sats);
        self.send_dm(&order.merchant_pubkey, &body, now_secs()).await
    }

    /// Encrypts, signs, and publishes a single DM envelope.
    async fn send_dm(
        &self,
        merchant_pubkey: &str,
        plaintext: &str,
        created_at: u64,
    ) -> Result<(), CheckoutError> {
        let cipher = self
            .signer
            .dm_cipher()
            .ok_or(CheckoutError::UnsupportedEncryption)?;
        let ciphertext = cipher.encrypt(merchant_pubkey, plaintext).await?;

        let event = self
            .signer
            .sign_event(EventTemplate {
                kind: DM_KIND,
                content: ciphertext,
                tags: vec![vec![RECIPIENT_TAG.to_owned(), merchant_pubkey.to_owned()]],
                created_at,
            })
            .await?;

        self.transport
            .publish(event, self.publish_timeout)
            .await
            .map_err(|e| match e {
                TransportError::Timeout(bound) => CheckoutError::PublishTimeout(bound),
                other => CheckoutError::Transport(other),
            })
    }
}
