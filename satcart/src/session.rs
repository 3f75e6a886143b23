//! Checkout session state machine.
//!
//! A [`CheckoutSession`] walks `Details → Payment → Success` and owns the
//! active order, the active invoice, and the cancellation token that tears
//! down any live poll loop when the session closes.
//!
//! Invoice preparation is asynchronous, and the triggering amount can
//! change while a request is in flight. The invoice slot is therefore
//! guarded by a generation counter: [`CheckoutSession::begin_invoice`]
//! hands out a ticket, and [`CheckoutSession::install_invoice`] ignores
//! results carrying a stale ticket so a slow fetch never overwrites a
//! newer invoice.

use std::sync::Arc;

use async_trait::async_trait;

use tokio_util::sync::CancellationToken;

use crate::error::CheckoutError;
use crate::listen::{PollConfig, ReplyListener};
use crate::order::Order;
use crate::proto::PaymentRequest;
use crate::submit::{OrderSubmitter, SubmitReceipt};

/// Boxed error from an invoice source.
pub type InvoiceSourceError = Box<dyn std::error::Error + Send + Sync>;

/// A Lightning invoice ready to be settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// BOLT11 payment request.
    pub pr: String,
    /// Amount the invoice was requested for.
    pub amount_sats: u64,
    /// Lower sendable bound inherited from the pay parameters, if any.
    pub min_sendable_msats: Option<u64>,
    /// Upper sendable bound inherited from the pay parameters, if any.
    pub max_sendable_msats: Option<u64>,
}

/// Produces an invoice for an order.
///
/// Implemented by the LNURL rail and by [`MerchantInvoiceSource`], which
/// waits for the merchant to send one directly.
#[async_trait]
pub trait InvoiceSource: Send + Sync {
    /// Obtains an invoice covering `amount_sats` for the order.
    async fn invoice_for(
        &self,
        order: &Order,
        amount_sats: u64,
    ) -> Result<Invoice, InvoiceSourceError>;
}

/// The merchant's payment request carried no Lightning option.
#[derive(Debug, thiserror::Error)]
#[error("merchant payment request carried no lightning option")]
pub struct NoLightningOption;

/// Invoice source that waits for the merchant's own payment request DM.
pub struct MerchantInvoiceSource {
    listener: ReplyListener,
    config: PollConfig,
    cancel: CancellationToken,
}

impl MerchantInvoiceSource {
    /// Creates a source polling with [`PollConfig::payment_request`]
    /// defaults.
    #[must_use]
    pub fn new(listener: ReplyListener, cancel: CancellationToken) -> Self {
        Self {
            listener,
            config: PollConfig::payment_request(),
            cancel,
        }
    }

    /// Overrides the polling parameters.
    #[must_use]
    pub const fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl InvoiceSource for MerchantInvoiceSource {
    async fn invoice_for(
        &self,
        order: &Order,
        amount_sats: u64,
    ) -> Result<Invoice, InvoiceSourceError> {
        let request = self
            .listener
            .await_payment_request(&order.merchant_pubkey, &order.id, self.config, &self.cancel)
            .await?;
        invoice_from_payment_request(&request, amount_sats).ok_or_else(|| NoLightningOption.into())
    }
}

/// Adapts a merchant [`PaymentRequest`] into an [`Invoice`].
///
/// Returns `None` when the request carries no `ln` option. Merchant
/// invoices come with no sendable bounds; the merchant priced them.
#[must_use]
pub fn invoice_from_payment_request(
    request: &PaymentRequest,
    amount_sats: u64,
) -> Option<Invoice> {
    request.lightning_invoice().map(|pr| Invoice {
        pr: pr.to_owned(),
        amount_sats,
        min_sendable_msats: None,
        max_sendable_msats: None,
    })
}

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Collecting order details; nothing sent yet.
    Details,
    /// Order submitted (or invoice being prepared); awaiting settlement.
    Payment,
    /// Settlement confirmed.
    Success,
}

/// Session-level failure, distinguished by whether an order already exists.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Failed before any order was confirmed; the session is back at the
    /// details step and the whole checkout can be retried.
    #[error("checkout failed: {0}")]
    Checkout(#[source] InvoiceSourceError),

    /// Failed after the order was confirmed; the session stays at the
    /// payment step and only the payment setup should be retried.
    #[error("payment setup failed: {0}")]
    PaymentSetup(#[source] InvoiceSourceError),

    /// The operation does not apply to the current step.
    #[error("operation not valid at the {0:?} step")]
    WrongStep(Step),
}

/// Ticket tying an in-flight invoice request to the state that triggered
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTicket(u64);

/// One buyer checkout, from details to settlement.
pub struct CheckoutSession {
    submitter: Arc<OrderSubmitter>,
    step: Step,
    order: Option<Order>,
    invoice: Option<Invoice>,
    generation: u64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CheckoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("step", &self.step)
            .field("order", &self.order.as_ref().map(|o| o.id.clone()))
            .field("has_invoice", &self.invoice.is_some())
            .finish_non_exhaustive()
    }
}

impl CheckoutSession {
    /// Opens a session at the details step.
    #[must_use]
    pub fn new(submitter: Arc<OrderSubmitter>) -> Self {
        Self {
            submitter,
            step: Step::Details,
            order: None,
            invoice: None,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    /// The confirmed order, once one exists.
    #[must_use]
    pub const fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// The current invoice, if one is installed.
    #[must_use]
    pub const fn invoice(&self) -> Option<&Invoice> {
        self.invoice.as_ref()
    }

    /// Token cancelled when the session closes. Hand this to poll loops.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Submits the order, advancing `Details → Payment` on success.
    ///
    /// # Errors
    ///
    /// [`FlowError::WrongStep`] outside the details step;
    /// [`FlowError::Checkout`] if submission fails (the session stays at
    /// details and the same order may be resubmitted — its id is stable).
    pub async fn submit_order(&mut self, order: Order) -> Result<SubmitReceipt, FlowError> {
        if self.step != Step::Details {
            return Err(FlowError::WrongStep(self.step));
        }
        match self.submitter.submit(&order).await {
            Ok(receipt) => {
                self.order = Some(order);
                self.step = Step::Payment;
                Ok(receipt)
            }
            Err(err) => Err(FlowError::Checkout(Box::new(err))),
        }
    }

    /// Starts a new invoice request, invalidating any in-flight one.
    ///
    /// The current invoice is cleared; the returned ticket must accompany
    /// the eventual [`Self::install_invoice`].
    pub fn begin_invoice(&mut self) -> InvoiceTicket {
        self.generation += 1;
        self.invoice = None;
        InvoiceTicket(self.generation)
    }

    /// Installs a fetched invoice, unless a newer request superseded it.
    ///
    /// Returns whether the invoice was accepted.
    pub fn install_invoice(&mut self, ticket: InvoiceTicket, invoice: Invoice) -> bool {
        if ticket.0 != self.generation {
            #[cfg(feature = "telemetry")]
            tracing::debug!(
                stale = ticket.0,
                current = self.generation,
                "discarding stale invoice result"
            );
            return false;
        }
        self.invoice = Some(invoice);
        true
    }

    /// Fetches and installs an invoice for the active order.
    ///
    /// # Errors
    ///
    /// [`FlowError::WrongStep`] outside the payment step. On source
    /// failure: [`FlowError::PaymentSetup`] (the step is sticky once an
    /// order exists, so the caller offers a retry) or, in the order-less
    /// edge where payment was entered without a confirmed order,
    /// [`FlowError::Checkout`] with the session reverted to details.
    pub async fn request_invoice(
        &mut self,
        source: &dyn InvoiceSource,
        amount_sats: u64,
    ) -> Result<&Invoice, FlowError> {
        if self.step != Step::Payment {
            return Err(FlowError::WrongStep(self.step));
        }
        let Some(order) = self.order.clone() else {
            self.step = Step::Details;
            return Err(FlowError::Checkout(Box::new(CheckoutError::Cancelled)));
        };

        let ticket = self.begin_invoice();
        match source.invoice_for(&order, amount_sats).await {
            Ok(invoice) => {
                self.install_invoice(ticket, invoice);
                // Just installed under the same exclusive borrow.
                self.invoice
                    .as_ref()
                    .ok_or(FlowError::WrongStep(Step::Payment))
            }
            Err(err) => Err(FlowError::PaymentSetup(err)),
        }
    }

    /// Records the settlement, advancing `Payment → Success`.
    ///
    /// # Errors
    ///
    /// [`FlowError::WrongStep`] outside the payment step. Success is
    /// terminal; the session never leaves it.
    pub fn mark_paid(&mut self) -> Result<(), FlowError> {
        if self.step != Step::Payment {
            return Err(FlowError::WrongStep(self.step));
        }
        self.step = Step::Success;
        Ok(())
    }

    /// Closes the session: cancels any live poll loop and discards pending
    /// invoice state.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.generation += 1;
        self.invoice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryTransport, PlainSigner, merchant_dm, order_fixture};

    struct FixedSource(Invoice);

    #[async_trait]
    impl InvoiceSource for FixedSource {
        async fn invoice_for(
            &self,
            _order: &Order,
            _amount_sats: u64,
        ) -> Result<Invoice, InvoiceSourceError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl InvoiceSource for FailingSource {
        async fn invoice_for(
            &self,
            _order: &Order,
            _amount_sats: u64,
        ) -> Result<Invoice, InvoiceSourceError> {
            Err("rate oracle unreachable".into())
        }
    }

    fn invoice(pr: &str) -> Invoice {
        Invoice {
            pr: pr.to_owned(),
            amount_sats: 50_000,
            min_sendable_msats: Some(1_000),
            max_sendable_msats: Some(100_000_000),
        }
    }

    fn session(transport: &Arc<MemoryTransport>) -> CheckoutSession {
        let submitter = OrderSubmitter::new(
            Arc::clone(transport) as Arc<dyn crate::transport::EventTransport>,
            Some(Arc::new(PlainSigner::new("buyer-pk"))),
        )
        .expect("submitter");
        CheckoutSession::new(Arc::new(submitter))
    }

    #[tokio::test]
    async fn happy_path_walks_details_payment_success() {
        let transport = Arc::new(MemoryTransport::default());
        let mut session = session(&transport);
        assert_eq!(session.step(), Step::Details);

        session.submit_order(order_fixture()).await.expect("submit");
        assert_eq!(session.step(), Step::Payment);

        let source = FixedSource(invoice("lnbc500u1p..."));
        let installed = session
            .request_invoice(&source, 50_000)
            .await
            .expect("invoice")
            .clone();
        assert_eq!(installed.pr, "lnbc500u1p...");

        session.mark_paid().expect("paid");
        assert_eq!(session.step(), Step::Success);
    }

    #[tokio::test]
    async fn failed_submission_keeps_the_details_step() {
        let transport = Arc::new(MemoryTransport::default());
        transport.fail_publishes(1);
        let mut session = session(&transport);

        let err = session
            .submit_order(order_fixture())
            .await
            .expect_err("publish timed out");
        assert!(matches!(err, FlowError::Checkout(_)));
        assert_eq!(session.step(), Step::Details);
        assert!(session.order().is_none());
    }

    #[tokio::test]
    async fn invoice_failure_after_order_is_sticky() {
        let transport = Arc::new(MemoryTransport::default());
        let mut session = session(&transport);
        session.submit_order(order_fixture()).await.expect("submit");

        let err = session
            .request_invoice(&FailingSource, 50_000)
            .await
            .expect_err("source down");
        assert!(matches!(err, FlowError::PaymentSetup(_)));
        // No silent reversal once the order exists.
        assert_eq!(session.step(), Step::Payment);
        assert!(session.order().is_some());

        // Retry succeeds in place.
        session
            .request_invoice(&FixedSource(invoice("lnbc1...")), 50_000)
            .await
            .expect("retry");
    }

    #[tokio::test]
    async fn stale_invoice_result_is_discarded() {
        let transport = Arc::new(MemoryTransport::default());
        let mut session = session(&transport);
        session.submit_order(order_fixture()).await.expect("submit");

        let stale = session.begin_invoice();
        let fresh = session.begin_invoice();
        assert!(!session.install_invoice(stale, invoice("lnbc-old...")));
        assert!(session.invoice().is_none());
        assert!(session.install_invoice(fresh, invoice("lnbc-new...")));
        assert_eq!(session.invoice().map(|i| i.pr.as_str()), Some("lnbc-new..."));
    }

    #[tokio::test]
    async fn wrong_step_operations_are_rejected() {
        let transport = Arc::new(MemoryTransport::default());
        let mut session = session(&transport);

        assert!(matches!(
            session.mark_paid(),
            Err(FlowError::WrongStep(Step::Details))
        ));
        assert!(matches!(
            session.request_invoice(&FailingSource, 1).await,
            Err(FlowError::WrongStep(Step::Details))
        ));

        session.submit_order(order_fixture()).await.expect("submit");
        session.mark_paid().expect("paid");
        // Success is terminal.
        assert!(matches!(
            session.submit_order(order_fixture()).await,
            Err(FlowError::WrongStep(Step::Success))
        ));
        assert!(matches!(
            session.mark_paid(),
            Err(FlowError::WrongStep(Step::Success))
        ));
    }

    #[tokio::test]
    async fn close_cancels_the_token_and_drops_invoice_state() {
        let transport = Arc::new(MemoryTransport::default());
        let mut session = session(&transport);
        session.submit_order(order_fixture()).await.expect("submit");
        session
            .request_invoice(&FixedSource(invoice("lnbc1...")), 50_000)
            .await
            .expect("invoice");
        let token = session.cancel_token();

        session.close();
        assert!(token.is_cancelled());
        assert!(session.invoice().is_none());
    }

    #[tokio::test]
    async fn merchant_source_adapts_a_payment_request() {
        let transport = Arc::new(MemoryTransport::default());
        let order = order_fixture();
        transport.push_reply(merchant_dm(
            "merchant-pk",
            "buyer-pk",
            &format!(
                r#"{{"id":"{}","type":1,"payment_options":[{{"type":"ln","link":"lnbc42..."}}]}}"#,
                order.id
            ),
        ));
        let listener = ReplyListener::new(
            Arc::clone(&transport) as Arc<dyn crate::transport::EventTransport>,
            Arc::new(PlainSigner::new("buyer-pk")),
        );
        let source = MerchantInvoiceSource::new(listener, CancellationToken::new());

        let invoice = source.invoice_for(&order, 42_000).await.expect("invoice");
        assert_eq!(invoice.pr, "lnbc42...");
        assert_eq!(invoice.amount_sats, 42_000);
        assert!(invoice.min_sendable_msats.is_none());
    }

    #[test]
    fn payment_request_without_ln_option_yields_no_invoice() {
        let request: PaymentRequest = serde_json::from_str(
            r#"{"id":"ord-1","type":1,"payment_options":[{"type":"url","link":"https://pay"}]}"#,
        )
        .expect("parse");
        assert!(invoice_from_payment_request(&request, 1_000).is_none());
    }
}
