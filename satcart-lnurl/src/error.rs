//! Error types for the LNURL payment rail.

use std::fmt;

/// Errors from the LNURL-pay rail and the exchange-rate oracle.
#[derive(Debug, thiserror::Error)]
pub enum PayRailError {
    /// The lightning address is not `user@domain`.
    #[error("invalid lightning address: {0:?}")]
    MalformedAddress(String),

    /// The exchange-rate oracle was unreachable, returned a non-OK status,
    /// or does not quote the requested currency.
    #[error("exchange rate lookup failed: {0}")]
    Conversion(String),

    /// The LNURL-pay endpoint signalled `status: "ERROR"` or returned an
    /// unusable response.
    #[error("lnurl endpoint error: {reason}")]
    Lnurl {
        /// The endpoint's `reason` field, or a description of the failure.
        reason: String,
    },

    /// The requested amount falls outside the sendable bounds. Caught
    /// before any network call.
    #[error("{bound}")]
    AmountOutOfRange {
        /// The rejected amount.
        amount_sats: u64,
        /// Which bound was violated.
        bound: AmountBound,
    },

    /// The invoice callback returned a non-OK status or `status: "ERROR"`.
    #[error("invoice request failed: {0}")]
    Invoice(String),

    /// Transport-level HTTP failure.
    #[error("http request failed")]
    Http(#[from] reqwest::Error),
}

/// The sendable bound an amount violated, expressed in whole sats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountBound {
    /// Below `minSendable`.
    TooLow {
        /// Minimum payable amount, rounded up to whole sats.
        min_sats: u64,
    },
    /// Above `maxSendable`.
    TooHigh {
        /// Maximum payable amount, rounded down to whole sats.
        max_sats: u64,
    },
}

impl fmt::Display for AmountBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLow { min_sats } => {
                write!(f, "Amount too low. Minimum: {min_sats} sats")
            }
            Self::TooHigh { max_sats } => {
                write!(f, "Amount too high. Maximum: {max_sats} sats")
            }
        }
    }
}
