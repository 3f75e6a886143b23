//! Lightning payment rail for satcart checkouts.
//!
//! Resolves lightning addresses to LNURL-pay endpoints, fetches pay
//! parameters, requests invoices, and converts fiat prices to satoshis via
//! an exchange-rate oracle. [`pay::LnurlRail`] plugs into the core crate's
//! [`satcart::session::InvoiceSource`] seam.
//!
//! # Modules
//!
//! - [`address`] — lightning address to LNURL endpoint resolution
//! - [`pay`] — pay-parameter fetch, invoice request, [`pay::LnurlRail`]
//! - [`rate`] — fiat to satoshi conversion
//! - [`error`] — payment-rail error types

pub mod address;
pub mod error;
pub mod pay;
pub mod rate;

pub use error::PayRailError;
