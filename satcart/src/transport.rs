//! Event-network and signer trait seams.
//!
//! The event network exposes pull-based query and publish semantics over
//! ephemeral relay connections; the signing identity is held outside this
//! crate (browser extension, remote signer, local key). Both are consumed
//! through the narrow traits here so the checkout flow never touches a
//! concrete client.
//!
//! Encryption is a dynamic capability: some identities can sign but cannot
//! encrypt direct messages. Query the capability via
//! [`SignerIdentity::dm_cipher`] before use instead of probing the concrete
//! type.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// A signed event as it travels over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event identifier.
    pub id: String,
    /// Author public key.
    pub pubkey: String,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    /// Event kind.
    pub kind: u16,
    /// Event tags; a `["p", pubkey]` tag addresses a recipient.
    pub tags: Vec<Vec<String>>,
    /// Event content — ciphertext for direct messages.
    pub content: String,
    /// Signature over the event.
    pub sig: String,
}

/// An unsigned event handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    /// Event kind.
    pub kind: u16,
    /// Event content.
    pub content: String,
    /// Event tags.
    pub tags: Vec<Vec<String>>,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
}

/// Query filter selecting events by kind, author set, recipient tag, and
/// time window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Event kinds to match.
    pub kinds: Vec<u16>,
    /// Author public keys to match.
    pub authors: Vec<String>,
    /// Recipient public key (matched against the `p` tag).
    pub recipient: Option<String>,
    /// Only events created at or after this time (seconds since epoch).
    pub since: Option<u64>,
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl Filter {
    /// Creates a filter matching the given kinds.
    #[must_use]
    pub fn kinds(kinds: impl Into<Vec<u16>>) -> Self {
        Self {
            kinds: kinds.into(),
            ..Self::default()
        }
    }

    /// Restricts the filter to the given authors.
    #[must_use]
    pub fn with_authors(mut self, authors: impl Into<Vec<String>>) -> Self {
        self.authors = authors.into();
        self
    }

    /// Restricts the filter to events `p`-tagged to the given recipient.
    #[must_use]
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Restricts the filter to events created at or after `since`.
    #[must_use]
    pub const fn with_since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Limits the number of returned events.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Errors from the event-network transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The network did not respond within the bound.
    #[error("network operation timed out after {0:?}")]
    Timeout(Duration),

    /// Relay or connection failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Pull-based event-network client.
///
/// Every call is bounded by an explicit timeout; there are no long-lived
/// subscriptions.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Queries the network for events matching any of the filters.
    async fn query(
        &self,
        filters: Vec<Filter>,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError>;

    /// Publishes a signed event, waiting up to `timeout` for acceptance.
    async fn publish(&self, event: Event, timeout: Duration) -> Result<(), TransportError>;
}

/// Errors from the signing identity.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The signer refused or failed to sign.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Encryption or decryption failed.
    #[error("cipher failed: {0}")]
    Cipher(String),
}

/// End-to-end encryption capability for direct messages.
#[async_trait]
pub trait DmCipher: Send + Sync {
    /// Encrypts a plaintext to a peer's public key.
    async fn encrypt(&self, peer_pubkey: &str, plaintext: &str) -> Result<String, SignerError>;

    /// Decrypts a ciphertext received from a peer.
    async fn decrypt(&self, peer_pubkey: &str, ciphertext: &str) -> Result<String, SignerError>;
}

/// The buyer's signing identity.
#[async_trait]
pub trait SignerIdentity: Send + Sync {
    /// The identity's public key.
    fn pubkey(&self) -> &str;

    /// Signs an event template, producing a publishable event.
    async fn sign_event(&self, template: EventTemplate) -> Result<Event, SignerError>;

    /// Returns the direct-message encryption capability, if the identity
    /// has one.
    fn dm_cipher(&self) -> Option<&dyn DmCipher>;
}

/// Current time in seconds since the Unix epoch.
///
/// # Panics
///
/// Panics if the system clock is set before the Unix epoch, which should
/// never happen on properly configured systems.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("SystemTime before UNIX epoch?!?")
        .as_secs()
}
