//! Polling listener for merchant replies.
//!
//! The transport offers only request/response query semantics over
//! ephemeral connections, so merchant replies are observed by polling: a
//! bounded loop that queries recent DMs from the merchant, decrypts each,
//! and returns the first payload matching the sought type and order id.
//!
//! Transient query failures are swallowed and retried after the interval —
//! a false negative self-heals on the next round, whereas aborting the loop
//! would not. Only the deadline elapsing surfaces as an error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{CheckoutError, ListenTimeout};
use crate::order::OrderId;
use crate::proto::{CheckoutMessage, DM_KIND, OrderStatus, PaymentRequest};
use crate::transport::{EventTransport, Filter, SignerIdentity, now_secs};

/// Parameters for one polling wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Total wait before giving up.
    pub deadline: Duration,
    /// Pause between query rounds.
    pub interval: Duration,
    /// Bound on each individual network query.
    pub query_timeout: Duration,
    /// How far back each query looks for replies.
    pub lookback: Duration,
    /// Maximum events fetched per round.
    pub limit: usize,
}

impl PollConfig {
    /// Defaults for awaiting a merchant payment request after submitting an
    /// order.
    #[must_use]
    pub const fn payment_request() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            interval: Duration::from_secs(2),
            query_timeout: Duration::from_secs(10),
            lookback: Duration::from_secs(300),
            limit: 10,
        }
    }

    /// Defaults for awaiting an order status update after displaying an
    /// invoice.
    #[must_use]
    pub const fn order_status() -> Self {
        Self {
            deadline: Duration::from_secs(120),
            interval: Duration::from_secs(3),
            query_timeout: Duration::from_secs(10),
            lookback: Duration::from_secs(300),
            limit: 20,
        }
    }

    /// Sets the total wait.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the pause between rounds.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Polls the event network for merchant-originated checkout replies.
pub struct ReplyListener {
    transport: Arc<dyn EventTransport>,
    signer: Arc<dyn SignerIdentity>,
}

impl std::fmt::Debug for ReplyListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyListener").finish_non_exhaustive()
    }
}

impl ReplyListener {
    /// Creates a listener over the given transport and identity.
    #[must_use]
    pub fn new(transport: Arc<dyn EventTransport>, signer: Arc<dyn SignerIdentity>) -> Self {
        Self { transport, signer }
    }

    /// Waits for the merchant's payment request (type `1`) for an order.
    ///
    /// Returns the first matching request observed; the remainder of the
    /// window is not waited out.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Timeout`] if the deadline elapses with no match,
    /// [`CheckoutError::Cancelled`] if `cancel` fires first.
    pub async fn await_payment_request(
        &self,
        merchant_pubkey: &str,
        order_id: &OrderId,
        config: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<PaymentRequest, CheckoutError> {
        self.poll(merchant_pubkey, config, cancel, "payment request", |msg| {
            match msg {
                CheckoutMessage::PaymentRequest(req) if req.id == *order_id => Some(req),
                _ => None,
            }
        })
        .await
    }

    /// Waits for an order status update (type `2`) for an order.
    ///
    /// # Errors
    ///
    /// Same as [`Self::await_payment_request`].
    pub async fn await_order_status(
        &self,
        merchant_pubkey: &str,
        order_id: &OrderId,
        config: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<OrderStatus, CheckoutError> {
        self.poll(merchant_pubkey, config, cancel, "order status", |msg| {
            match msg {
                CheckoutMessage::Status(status) if status.id == *order_id => Some(status),
                _ => None,
            }
        })
        .await
    }

    /// The poll loop shared by both waits. First match wins.
    async fn poll<T, F>(
        &self,
        merchant_pubkey: &str,
        config: PollConfig,
        cancel: &CancellationToken,
        waiting_for: &'static str,
        matcher: F,
    ) -> Result<T, CheckoutError>
    where
        F: Fn(CheckoutMessage) -> Option<T>,
    {
        let cipher = self
            .signer
            .dm_cipher()
            .ok_or(CheckoutError::UnsupportedEncryption)?;
        let deadline = tokio::time::Instant::now() + config.deadline;

        loop {
            if cancel.is_cancelled() {
                return Err(CheckoutError::Cancelled);
            }

            let filter = Filter::kinds([DM_KIND])
                .with_authors([merchant_pubkey.to_owned()])
                .with_recipient(self.signer.pubkey().to_owned())
                .with_since(now_secs().saturating_sub(config.lookback.as_secs()))
                .with_limit(config.limit);

            match self
                .transport
                .query(vec![filter], config.query_timeout)
                .await
            {
                Ok(events) => {
                    for event in events {
                        // Decryption or parse failure means the DM is not
                        // ours or not a protocol message; skip, never abort.
                        let Ok(plaintext) = cipher.decrypt(merchant_pubkey, &event.content).await
                        else {
                            continue;
                        };
                        let Some(message) = CheckoutMessage::from_plaintext(&plaintext) else {
                            continue;
                        };
                        if let Some(matched) = matcher(message) {
                            return Ok(matched);
                        }
                    }
                }
                Err(_err) => {
                    // Transient: treated as an empty round.
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(
                        waiting_for,
                        error = %_err,
                        "reply query failed, retrying after interval"
                    );
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(CheckoutError::Timeout(ListenTimeout::new(
                    waiting_for,
                    config.deadline,
                )));
            }

            // Clamp the last sleep so the final round lands at the deadline
            // rather than a whole interval short of it.
            let pause = config.interval.min(deadline - now);
            tokio::select! {
                () = cancel.cancelled() => return Err(CheckoutError::Cancelled),
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}
