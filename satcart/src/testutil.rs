//! Shared in-memory fakes for the core crate's tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::order::{ContactInfo, Order, OrderId};
use crate::transport::{
    DmCipher, Event, EventTemplate, EventTransport, Filter, SignerError, SignerIdentity,
    TransportError,
};

#[derive(Debug, Clone, Copy)]
enum PublishMode {
    Ok,
    FailNext(usize),
    AllowThenFail(usize),
}

/// In-memory event transport recording publishes and serving canned replies.
#[derive(Debug)]
pub struct MemoryTransport {
    published: Mutex<Vec<Event>>,
    replies: Mutex<Vec<Event>>,
    publish_mode: Mutex<PublishMode>,
    fail_queries: AtomicUsize,
    query_count: AtomicUsize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            publish_mode: Mutex::new(PublishMode::Ok),
            fail_queries: AtomicUsize::new(0),
            query_count: AtomicUsize::new(0),
        }
    }
}

impl MemoryTransport {
    /// Events accepted by `publish` so far.
    pub fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }

    /// Queues an event to be returned by every subsequent query.
    pub fn push_reply(&self, event: Event) {
        self.replies.lock().unwrap().push(event);
    }

    /// Makes the next `n` publishes time out (0 restores normal behavior).
    pub fn fail_publishes(&self, n: usize) {
        *self.publish_mode.lock().unwrap() = if n == 0 {
            PublishMode::Ok
        } else {
            PublishMode::FailNext(n)
        };
    }

    /// Accepts the next `n` publishes, then times out all further ones.
    pub fn fail_publish_after(&self, n: usize) {
        *self.publish_mode.lock().unwrap() = PublishMode::AllowThenFail(n);
    }

    /// Makes the next `n` queries fail with a network error.
    pub fn fail_queries(&self, n: usize) {
        self.fail_queries.store(n, Ordering::SeqCst);
    }

    /// Number of queries attempted so far.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventTransport for MemoryTransport {
    async fn query(
        &self,
        _filters: Vec<Filter>,
        _timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_queries.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_queries.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Network("relay connection reset".into()));
        }
        Ok(self.replies.lock().unwrap().clone())
    }

    async fn publish(&self, event: Event, timeout: Duration) -> Result<(), TransportError> {
        let mut mode = self.publish_mode.lock().unwrap();
        match *mode {
            PublishMode::Ok => {}
            PublishMode::FailNext(n) => {
                *mode = if n > 1 {
                    PublishMode::FailNext(n - 1)
                } else {
                    PublishMode::Ok
                };
                return Err(TransportError::Timeout(timeout));
            }
            PublishMode::AllowThenFail(n) => {
                if n == 0 {
                    return Err(TransportError::Timeout(timeout));
                }
                *mode = PublishMode::AllowThenFail(n - 1);
            }
        }
        drop(mode);
        self.published.lock().unwrap().push(event);
        Ok(())
    }
}

/// Toy reversible cipher: `enc:{plaintext}`.
#[derive(Debug)]
pub struct PlainCipher;

#[async_trait]
impl DmCipher for PlainCipher {
    async fn encrypt(&self, _peer: &str, plaintext: &str) -> Result<String, SignerError> {
        Ok(format!("enc:{plaintext}"))
    }

    async fn decrypt(&self, _peer: &str, ciphertext: &str) -> Result<String, SignerError> {
        ciphertext
            .strip_prefix("enc:")
            .map(ToOwned::to_owned)
            .ok_or_else(|| SignerError::Cipher("not our ciphertext".into()))
    }
}

/// Test signer with an optional toy cipher.
#[derive(Debug)]
pub struct PlainSigner {
    pubkey: String,
    cipher: Option<PlainCipher>,
    counter: AtomicU64,
}

impl PlainSigner {
    pub fn new(pubkey: &str) -> Self {
        Self {
            pubkey: pubkey.to_owned(),
            cipher: Some(PlainCipher),
            counter: AtomicU64::new(0),
        }
    }

    pub fn without_cipher(pubkey: &str) -> Self {
        Self {
            cipher: None,
            ..Self::new(pubkey)
        }
    }
}

#[async_trait]
impl SignerIdentity for PlainSigner {
    fn pubkey(&self) -> &str {
        &self.pubkey
    }

    async fn sign_event(&self, template: EventTemplate) -> Result<Event, SignerError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Event {
            id: format!("evt-{n}"),
            pubkey: self.pubkey.clone(),
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            sig: "sig".to_owned(),
        })
    }

    fn dm_cipher(&self) -> Option<&dyn DmCipher> {
        self.cipher.as_ref().map(|c| c as &dyn DmCipher)
    }
}

/// A DM from the merchant carrying the given plaintext, encrypted with the
/// toy scheme.
pub fn merchant_dm(merchant_pubkey: &str, buyer_pubkey: &str, plaintext: &str) -> Event {
    Event {
        id: format!("merchant-evt-{}", plaintext.len()),
        pubkey: merchant_pubkey.to_owned(),
        created_at: crate::transport::now_secs(),
        kind: crate::proto::DM_KIND,
        tags: vec![vec!["p".to_owned(), buyer_pubkey.to_owned()]],
        content: format!("enc:{plaintext}"),
        sig: "sig".to_owned(),
    }
}

/// A digital (address-free) order fixture.
pub fn order_fixture() -> Order {
    Order {
        id: OrderId::from_raw("m3ab9xyz-q1w2e3"),
        merchant_pubkey: "merchant-pk".to_owned(),
        product_id: "print-42".to_owned(),
        product_name: "Sunrise Print".to_owned(),
        quantity: 1,
        shipping_id: "digital".to_owned(),
        shipping_zone_name: "Digital Delivery".to_owned(),
        price: 25.0,
        shipping_cost: 0.0,
        currency: "GBP".to_owned(),
        address: None,
        contact: ContactInfo {
            nostr: "npub1buyer".to_owned(),
            email: Some("buyer@example.com".to_owned()),
            phone: None,
        },
        message: None,
    }
}
