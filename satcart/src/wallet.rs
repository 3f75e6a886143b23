//! Payment channel abstractions.
//!
//! Three ways an invoice can be settled, in descending preference:
//!
//! 1. A persistent [`WalletConnection`] that pays on the buyer's behalf and
//!    returns a settlement proof.
//! 2. An in-context [`WalletAgent`] (a wallet embedded in the buyer's
//!    environment) whose outcome is advisory: failure or absence falls back
//!    to manual payment rather than failing the checkout.
//! 3. Manual payment from the invoice string or its QR rendering, confirmed
//!    out-of-band by the merchant's status message.

use async_trait::async_trait;

use crate::error::SettlementFailure;

/// An environment-provided wallet the buyer may or may not have.
///
/// Implementations should surface rejection (user declined, wallet locked)
/// as an `Err`, which callers treat as "fall back", not as a checkout
/// failure.
#[async_trait]
pub trait WalletAgent: Send + Sync {
    /// Requests access to the wallet.
    async fn enable(&self) -> Result<(), SettlementFailure>;

    /// Pays a BOLT11 invoice, returning the payment preimage.
    async fn send_payment(&self, bolt11: &str) -> Result<String, SettlementFailure>;
}

/// A persistent wallet connection that settles invoices directly.
#[async_trait]
pub trait WalletConnection: Send + Sync {
    /// Pays a BOLT11 invoice, returning a settlement proof.
    ///
    /// # Errors
    ///
    /// [`SettlementFailure`] when the wallet rejects or cannot complete the
    /// payment. Unlike agent payments this is a hard failure.
    async fn send_payment(&self, bolt11: &str) -> Result<String, SettlementFailure>;
}

/// Outcome of an agent payment attempt.
///
/// Never an error: an absent agent, a declined prompt, and a failed payment
/// all normalize to `success: false` so the caller can offer the remaining
/// channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPayment {
    /// Whether the agent settled the invoice.
    pub success: bool,
    /// Payment preimage, present on success when the agent reports one.
    pub preimage: Option<String>,
}

impl AgentPayment {
    const fn declined() -> Self {
        Self {
            success: false,
            preimage: None,
        }
    }
}

/// Attempts to pay through an agent if one is present.
pub async fn pay_with_agent(agent: Option<&dyn WalletAgent>, bolt11: &str) -> AgentPayment {
    let Some(agent) = agent else {
        return AgentPayment::declined();
    };
    if let Err(_err) = agent.enable().await {
        #[cfg(feature = "telemetry")]
        tracing::debug!(error = %_err, "wallet agent declined enable");
        return AgentPayment::declined();
    }
    match agent.send_payment(bolt11).await {
        Ok(preimage) => AgentPayment {
            success: true,
            preimage: Some(preimage),
        },
        Err(_err) => {
            #[cfg(feature = "telemetry")]
            tracing::debug!(error = %_err, "wallet agent payment failed");
            AgentPayment::declined()
        }
    }
}

/// URI form of an invoice for handing off to an external wallet.
#[must_use]
pub fn payment_uri(bolt11: &str) -> String {
    format!("lightning:{bolt11}")
}

/// Invoice text as encoded into a QR code.
///
/// Uppercased so the QR encoder can use the compact alphanumeric mode.
#[must_use]
pub fn qr_payload(bolt11: &str) -> String {
    bolt11.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedAgent {
        enable_ok: bool,
        payment: Result<String, SettlementFailure>,
    }

    #[async_trait]
    impl WalletAgent for ScriptedAgent {
        async fn enable(&self) -> Result<(), SettlementFailure> {
            if self.enable_ok {
                Ok(())
            } else {
                Err(SettlementFailure::new("agent").with_message("locked"))
            }
        }

        async fn send_payment(&self, _bolt11: &str) -> Result<String, SettlementFailure> {
            self.payment.clone()
        }
    }

    #[tokio::test]
    async fn absent_agent_is_a_soft_decline() {
        let outcome = pay_with_agent(None, "lnbc1...").await;
        assert_eq!(outcome, AgentPayment::declined());
    }

    #[tokio::test]
    async fn enable_refusal_is_a_soft_decline() {
        let agent = ScriptedAgent {
            enable_ok: false,
            payment: Ok("unreachable".to_owned()),
        };
        let outcome = pay_with_agent(Some(&agent), "lnbc1...").await;
        assert!(!outcome.success);
        assert!(outcome.preimage.is_none());
    }

    #[tokio::test]
    async fn failed_payment_is_a_soft_decline() {
        let agent = ScriptedAgent {
            enable_ok: true,
            payment: Err(SettlementFailure::new("agent").with_message("route not found")),
        };
        let outcome = pay_with_agent(Some(&agent), "lnbc1...").await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn successful_payment_carries_the_preimage() {
        let agent = ScriptedAgent {
            enable_ok: true,
            payment: Ok("preimage-hex".to_owned()),
        };
        let outcome = pay_with_agent(Some(&agent), "lnbc1...").await;
        assert!(outcome.success);
        assert_eq!(outcome.preimage.as_deref(), Some("preimage-hex"));
    }

    #[test]
    fn uri_and_qr_forms() {
        assert_eq!(payment_uri("lnbc20u1pabc"), "lightning:lnbc20u1pabc");
        assert_eq!(qr_payload("lnbc20u1pabc"), "LNBC20U1PABC");
    }
}
