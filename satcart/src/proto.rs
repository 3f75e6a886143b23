//! Wire format of the encrypted marketplace messages.
//!
//! Orders, payment requests, and status updates travel as the ciphertext of
//! kind-4 direct-message events addressed to the counterparty through a
//! recipient tag. Each plaintext payload is a JSON object with an integer
//! `type` discriminant and an `id` correlation field:
//!
//! - type `0` — [`OrderMessage`], buyer → merchant
//! - type `1` — [`PaymentRequest`], merchant → buyer
//! - type `2` — [`OrderStatus`], merchant → buyer
//!
//! Fields are snake_case on the wire. Listeners must tolerate arbitrary
//! non-protocol plaintext in the same message stream; use
//! [`CheckoutMessage::from_plaintext`] for that.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::order::{ContactInfo, OrderId};

/// Event kind for encrypted 1:1 direct messages.
pub const DM_KIND: u16 = 4;

/// Tag name addressing an event to a recipient public key.
pub const RECIPIENT_TAG: &str = "p";

/// Payment option type carrying a bolt11 Lightning invoice. Authoritative
/// for this system; other option types are passed through untouched.
pub const LN_OPTION: &str = "ln";

/// A message type marker parameterized by its numeric discriminant.
///
/// Serializes as a bare integer (e.g., `0`, `1`, or `2`) and rejects any
/// other value on deserialization, so the discriminant is checked by the
/// type system rather than by hand.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct MessageType<const N: u8>;

impl<const N: u8> MessageType<N> {
    /// The numeric value of this message type.
    pub const VALUE: u8 = N;
}

impl<const N: u8> From<MessageType<N>> for u8 {
    fn from(_: MessageType<N>) -> Self {
        N
    }
}

impl<const N: u8> Serialize for MessageType<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(N)
    }
}

impl<'de, const N: u8> Deserialize<'de> for MessageType<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        if v == N {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected message type {N}, got {v}"
            )))
        }
    }
}

/// One ordered line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product identifier on the merchant's stall.
    pub product_id: String,
    /// Quantity ordered.
    pub quantity: u32,
}

/// Machine-parseable order payload (type `0`), buyer → merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderMessage {
    /// Order correlation identifier.
    pub id: OrderId,
    /// Message type discriminant (`0`).
    #[serde(rename = "type")]
    pub message_type: MessageType<0>,
    /// Buyer display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Formatted shipping address, present for physical delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Customer note to the merchant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Buyer contact details.
    pub contact: ContactInfo,
    /// Ordered line items.
    pub items: Vec<OrderItem>,
    /// Selected shipping zone identifier.
    pub shipping_id: String,
}

/// One way the merchant will accept payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOption {
    /// Option kind: `"ln"`, `"btc"`, `"lnurl"`, or `"url"`.
    #[serde(rename = "type")]
    pub option_type: String,
    /// The payment link — a bolt11 invoice for `"ln"`.
    pub link: String,
}

/// Payment request payload (type `1`), merchant → buyer.
///
/// Correlates to an order by `id`. May never arrive; listeners bound the
/// wait with a deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Order correlation identifier.
    pub id: OrderId,
    /// Message type discriminant (`1`).
    #[serde(rename = "type")]
    pub message_type: MessageType<1>,
    /// Optional note from the merchant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Accepted payment options.
    #[serde(default)]
    pub payment_options: Vec<PaymentOption>,
}

impl PaymentRequest {
    /// Returns the first Lightning (`"ln"`) invoice link, if any.
    #[must_use]
    pub fn lightning_invoice(&self) -> Option<&str> {
        self.payment_options
            .iter()
            .find(|opt| opt.option_type == LN_OPTION)
            .map(|opt| opt.link.as_str())
    }
}

/// Order status payload (type `2`), merchant → buyer.
///
/// Zero or more may arrive over time; the first one observed within a
/// polling window is treated as authoritative for that window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    /// Order correlation identifier.
    pub id: OrderId,
    /// Message type discriminant (`2`).
    #[serde(rename = "type")]
    pub message_type: MessageType<2>,
    /// Optional note from the merchant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the merchant recorded the order as paid.
    #[serde(default)]
    pub paid: bool,
    /// Whether the merchant recorded the order as shipped.
    #[serde(default)]
    pub shipped: bool,
}

/// Union of the three checkout payloads.
///
/// Deserialization dispatches on the integer `type` field via the
/// [`MessageType`] markers, so an untagged representation round-trips
/// unambiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckoutMessage {
    /// Buyer → merchant order (type `0`).
    Order(OrderMessage),
    /// Merchant → buyer payment request (type `1`).
    PaymentRequest(PaymentRequest),
    /// Merchant → buyer status update (type `2`).
    Status(OrderStatus),
}

impl CheckoutMessage {
    /// Attempts to parse a decrypted DM plaintext as a checkout message.
    ///
    /// Merchants also send free-form text over the same DM stream, so a
    /// parse failure is a normal negative result, not an error.
    #[must_use]
    pub fn from_plaintext(plaintext: &str) -> Option<Self> {
        serde_json::from_str(plaintext).ok()
    }

    /// Returns the order correlation identifier.
    #[must_use]
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::Order(m) => &m.id,
            Self::PaymentRequest(m) => &m.id,
            Self::Status(m) => &m.id,
        }
    }
}
