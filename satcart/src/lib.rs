#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core checkout and payment orchestration for event-network storefronts.
//!
//! This crate implements the buyer side of a decentralized marketplace
//! checkout: an order is composed locally, encrypted and published to the
//! merchant as direct-message events, and settled over Lightning. There is
//! no central server — asynchronous message exchange over the event network
//! and the Lightning rail are the only sources of truth.
//!
//! # Overview
//!
//! A checkout runs through a fixed sequence: the [`codec`] builds the order
//! payloads, [`submit`] encrypts and publishes them to the merchant,
//! [`listen`] polls for merchant replies (payment requests and status
//! updates), [`dispatch`] drives settlement through whichever wallet channel
//! is available, and [`session`] holds the state machine tying it all
//! together.
//!
//! The event-network client, the signing identity, and the wallet channels
//! are external collaborators consumed through the traits in [`transport`]
//! and [`wallet`]. The Lightning invoice rail lives in the companion
//! `satcart-lnurl` crate.
//!
//! # Modules
//!
//! - [`order`] - Order data model, identifiers, and shipping helpers
//! - [`proto`] - Wire format of the encrypted marketplace messages
//! - [`codec`] - Structured and human-readable order payload builders
//! - [`transport`] - Event-network and signer trait seams
//! - [`submit`] - Order submission channel (encrypt, sign, publish)
//! - [`listen`] - Polling listener for merchant replies
//! - [`wallet`] - Settlement channel trait seams
//! - [`dispatch`] - Payment execution across wallet channels
//! - [`session`] - Checkout session state machine
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod listen;
pub mod order;
pub mod proto;
pub mod session;
pub mod submit;
pub mod transport;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::CheckoutError;
