//! Error types for the core checkout flow.

use std::fmt;

/// Base error type for checkout operations.
///
/// Transient query failures inside the polling loops are deliberately not
/// represented here: they are recovered locally (logged and retried) and
/// never surface to callers.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// No signing identity is active.
    #[error("a signing identity is required to place an order")]
    AuthenticationRequired,

    /// The active identity cannot perform direct-message encryption.
    #[error("the active identity does not support encrypted direct messages")]
    UnsupportedEncryption,

    /// The event network did not acknowledge a publish within the bound.
    #[error("publish not acknowledged within {0:?}")]
    PublishTimeout(std::time::Duration),

    /// The signing identity failed to sign or encrypt.
    #[error("{0}")]
    Signer(#[from] crate::transport::SignerError),

    /// The event network rejected an operation outright.
    #[error("{0}")]
    Transport(crate::transport::TransportError),

    /// A listener deadline elapsed with no matching reply.
    #[error("{0}")]
    Timeout(#[from] ListenTimeout),

    /// The checkout session was closed while an operation was in flight.
    #[error("checkout cancelled")]
    Cancelled,

    /// Another settlement attempt is already in flight.
    #[error("a payment attempt is already in progress")]
    Busy,

    /// A settlement channel reported a hard failure.
    #[error("{0}")]
    Settlement(#[from] SettlementFailure),
}

/// A listener deadline elapsed before a matching merchant reply arrived.
#[derive(Debug, Clone)]
pub struct ListenTimeout {
    /// What the listener was waiting for.
    pub waiting_for: &'static str,
    /// The total wait that elapsed.
    pub deadline: std::time::Duration,
}

impl ListenTimeout {
    /// Creates a new listener timeout.
    #[must_use]
    pub const fn new(waiting_for: &'static str, deadline: std::time::Duration) -> Self {
        Self {
            waiting_for,
            deadline,
        }
    }
}

impl fmt::Display for ListenTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out after {:?} waiting for {}",
            self.deadline, self.waiting_for
        )
    }
}

impl std::error::Error for ListenTimeout {}

/// Hard failure from a settlement channel.
///
/// Only the remote-wallet-control channel produces these; the in-app agent
/// normalizes its failures to a soft negative result instead.
#[derive(Debug, Clone)]
pub struct SettlementFailure {
    /// Machine-readable reason for the failure.
    pub reason: String,
    /// Human-readable message for the failure.
    pub message: Option<String>,
}

impl SettlementFailure {
    /// Creates a new settlement failure.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for SettlementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.message {
            write!(f, "{}: {}", self.reason, msg)
        } else {
            write!(f, "{}", self.reason)
        }
    }
}

impl std::error::Error for SettlementFailure {}
