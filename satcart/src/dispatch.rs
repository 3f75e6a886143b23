//! Settlement dispatch across the available payment channels.
//!
//! A dispatcher owns the busy flag that serializes settlement attempts: a
//! second attempt while one is in flight returns [`CheckoutError::Busy`]
//! rather than double-paying. On any successful settlement it fires exactly
//! one best-effort confirmation DM through the [`OrderSubmitter`]; a publish
//! failure there is logged and never reverts the paid outcome.
//!
//! Channel priority is surfaced, not auto-selected: callers read
//! [`PaymentDispatcher::available_channels`] and pick, because the manual
//! channel is always a legitimate choice even when a wallet is present.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CheckoutError;
use crate::order::Order;
use crate::submit::OrderSubmitter;
use crate::wallet::{self, WalletAgent, WalletConnection};

/// A way to settle an invoice, in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChannel {
    /// Persistent wallet connection paying on the buyer's behalf.
    Connection,
    /// In-context wallet agent.
    Agent,
    /// Manual payment from the invoice string or QR.
    Manual,
}

/// A completed settlement.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// The channel that settled the invoice.
    pub channel: PaymentChannel,
    /// Preimage or proof, when the channel produces one.
    pub proof: Option<String>,
    /// Whether the confirmation DM reached the network.
    pub confirmation_delivered: bool,
}

/// Outcome of an agent settlement attempt.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// The agent paid the invoice.
    Paid(Settlement),
    /// No agent, or it declined or failed. The caller falls back to the
    /// remaining channels.
    Unavailable,
}

/// Drives invoice settlement and the terminal confirmation DM.
pub struct PaymentDispatcher {
    submitter: Arc<OrderSubmitter>,
    connection: Option<Arc<dyn WalletConnection>>,
    agent: Option<Arc<dyn WalletAgent>>,
    busy: AtomicBool,
}

impl std::fmt::Debug for PaymentDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentDispatcher")
            .field("has_connection", &self.connection.is_some())
            .field("has_agent", &self.agent.is_some())
            .field("busy", &self.busy.load(Ordering::SeqCst))
            .finish()
    }
}

impl PaymentDispatcher {
    /// Creates a dispatcher with only the manual channel.
    #[must_use]
    pub fn new(submitter: Arc<OrderSubmitter>) -> Self {
        Self {
            submitter,
            connection: None,
            agent: None,
            busy: AtomicBool::new(false),
        }
    }

    /// Adds a persistent wallet connection.
    #[must_use]
    pub fn with_connection(mut self, connection: Arc<dyn WalletConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Adds an in-context wallet agent.
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn WalletAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// The channels this dispatcher can drive, in descending priority.
    /// Manual is always last and always present.
    #[must_use]
    pub fn available_channels(&self) -> Vec<PaymentChannel> {
        let mut channels = Vec::with_capacity(3);
        if self.connection.is_some() {
            channels.push(PaymentChannel::Connection);
        }
        if self.agent.is_some() {
            channels.push(PaymentChannel::Agent);
        }
        channels.push(PaymentChannel::Manual);
        channels
    }

    /// Settles through the wallet connection.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Busy`] if another attempt is in flight,
    /// [`CheckoutError::Settlement`] if no connection is configured or the
    /// wallet reports a hard failure.
    pub async fn pay_with_connection(
        &self,
        order: &Order,
        bolt11: &str,
        amount_sats: u64,
    ) -> Result<Settlement, CheckoutError> {
        let _guard = self.acquire()?;
        let connection = self.connection.as_ref().ok_or_else(|| {
            CheckoutError::Settlement(
                crate::error::SettlementFailure::new("no_connection")
                    .with_message("no wallet connection is configured"),
            )
        })?;
        let proof = connection.send_payment(bolt11).await?;
        let confirmed = self.confirm(order, amount_sats).await;
        Ok(Settlement {
            channel: PaymentChannel::Connection,
            proof: Some(proof),
            confirmation_delivered: confirmed,
        })
    }

    /// Settles through the wallet agent, if any.
    ///
    /// Agent absence, refusal, and failure all come back as
    /// [`AgentOutcome::Unavailable`] so the caller can fall through to
    /// manual payment.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Busy`] if another attempt is in flight.
    pub async fn pay_with_agent(
        &self,
        order: &Order,
        bolt11: &str,
        amount_sats: u64,
    ) -> Result<AgentOutcome, CheckoutError> {
        let _guard = self.acquire()?;
        let outcome = wallet::pay_with_agent(self.agent.as_deref(), bolt11).await;
        if !outcome.success {
            return Ok(AgentOutcome::Unavailable);
        }
        let confirmed = self.confirm(order, amount_sats).await;
        Ok(AgentOutcome::Paid(Settlement {
            channel: PaymentChannel::Agent,
            proof: outcome.preimage,
            confirmation_delivered: confirmed,
        }))
    }

    /// Records a manual settlement (the merchant's status message said
    /// paid) and fires the confirmation DM.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Busy`] if another attempt is in flight.
    pub async fn acknowledge_manual(
        &self,
        order: &Order,
        amount_sats: u64,
    ) -> Result<Settlement, CheckoutError> {
        let _guard = self.acquire()?;
        let confirmed = self.confirm(order, amount_sats).await;
        Ok(Settlement {
            channel: PaymentChannel::Manual,
            proof: None,
            confirmation_delivered: confirmed,
        })
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, CheckoutError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CheckoutError::Busy);
        }
        Ok(BusyGuard { flag: &self.busy })
    }

    /// Best-effort confirmation DM. The settlement already happened, so a
    /// publish failure must not surface as an error.
    async fn confirm(&self, order: &Order, amount_sats: u64) -> bool {
        match self.submitter.send_confirmation(order, amount_sats).await {
            Ok(()) => true,
            Err(_err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    order = %order.id,
                    error = %_err,
                    "settlement confirmation DM failed"
                );
                false
            }
        }
    }
}

struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
