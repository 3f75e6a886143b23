//! Order data model, identifiers, and shipping helpers.
//!
//! An [`Order`] is the in-memory intent to purchase: created when the buyer
//! submits the checkout form, transmitted once to the merchant as encrypted
//! messages, and never mutated afterwards. Orders live only for the session;
//! nothing is persisted locally.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Zone display-name fragments that mark a zone as digital delivery.
const DIGITAL_NAME_HINTS: [&str; 5] = ["digital", "download", "email", "online", "free"];

/// Opaque unique order identifier.
///
/// Generated locally before submission and stable across retries, so a
/// resubmission after a publish timeout reuses the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generates a fresh order identifier.
    ///
    /// The format is `{base36 millisecond timestamp}-{6 random base36
    /// chars}`. Uniqueness is statistical (timestamp plus ~2 billion random
    /// suffixes), not cryptographic — acceptable for correlating checkout
    /// messages, and a deliberate tradeoff rather than a bug.
    #[must_use]
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| BASE36[rng.gen_range(0..36)] as char)
            .collect();
        Self(format!("{}-{suffix}", to_base36(millis)))
    }

    /// Wraps an existing identifier (e.g., parsed from a merchant reply).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the short display reference: the first eight characters,
    /// uppercased. Used in human-readable messages and invoice comments.
    #[must_use]
    pub fn short_ref(&self) -> String {
        self.0.chars().take(8).collect::<String>().to_uppercase()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

/// Shipping address for physical deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Recipient full name.
    pub full_name: String,
    /// First address line.
    pub address_line1: String,
    /// Optional second address line.
    pub address_line2: Option<String>,
    /// City.
    pub city: String,
    /// Postal code.
    pub postcode: String,
    /// Country.
    pub country: String,
}

/// Renders a shipping address for inclusion in an order message.
///
/// Each non-empty field appears on its own line; an absent or empty second
/// address line is omitted entirely, never left as a blank line.
#[must_use]
pub fn format_shipping_address(address: &ShippingAddress) -> String {
    let city_line = format!("{}, {}", address.city, address.postcode);
    let lines = [
        Some(address.full_name.as_str()),
        Some(address.address_line1.as_str()),
        address.address_line2.as_deref(),
        Some(city_line.as_str()),
        Some(address.country.as_str()),
    ];
    lines
        .into_iter()
        .flatten()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Buyer contact details carried in the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// The buyer's event-network identity (public key reference).
    pub nostr: String,
    /// Contact email. Required by the checkout form; digital goods are
    /// delivered here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A merchant shipping zone as advertised on the stall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingZone {
    /// Zone identifier, referenced by orders as `shipping_id`.
    pub id: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Shipping cost in the stall currency.
    pub cost: f64,
    /// Countries the zone covers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
}

impl ShippingZone {
    /// Returns whether this zone means digital (address-free) delivery.
    ///
    /// Heuristic: zero cost, or a display name containing "digital",
    /// "download", "email", "online", or "free" (case-insensitive). This is
    /// not a protocol field — a physical item under a promotional
    /// free-shipping zone is misclassified and skips address collection.
    /// Known latent gap in merchant-zone semantics; the behavior is kept
    /// as-is rather than silently reinterpreted.
    #[must_use]
    pub fn is_digital(&self) -> bool {
        if self.cost == 0.0 {
            return true;
        }
        let name = self.name.as_deref().unwrap_or_default().to_lowercase();
        DIGITAL_NAME_HINTS.iter().any(|hint| name.contains(hint))
    }

    /// Returns the display name, falling back to the covered countries and
    /// then to a generic label.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.countries {
            Some(countries) if !countries.is_empty() => countries.join(", "),
            _ => "Shipping".to_owned(),
        }
    }
}

/// Product-level shipping cost override for a stall zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOverride {
    /// The stall zone this override applies to.
    pub id: String,
    /// Replacement cost for this product.
    pub cost: f64,
}

/// Merges stall-level shipping zones with product-level cost overrides.
///
/// Zones keep their order; a zone whose id matches an override takes the
/// override's cost.
#[must_use]
pub fn merge_shipping_zones(
    zones: &[ShippingZone],
    overrides: &[ShippingOverride],
) -> Vec<ShippingZone> {
    zones
        .iter()
        .map(|zone| {
            let cost = overrides
                .iter()
                .find(|o| o.id == zone.id)
                .map_or(zone.cost, |o| o.cost);
            ShippingZone {
                cost,
                ..zone.clone()
            }
        })
        .collect()
}

/// An intent to purchase, built from the checkout form.
///
/// Immutable once submitted. The `address` is present iff the shipment is
/// physical.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Locally generated unique identifier.
    pub id: OrderId,
    /// The merchant's event-network public key.
    pub merchant_pubkey: String,
    /// Product identifier on the merchant's stall.
    pub product_id: String,
    /// Product display name, used in human-readable payloads.
    pub product_name: String,
    /// Quantity ordered.
    pub quantity: u32,
    /// Selected shipping zone identifier.
    pub shipping_id: String,
    /// Selected shipping zone display name.
    pub shipping_zone_name: String,
    /// Unit price in the stall currency.
    pub price: f64,
    /// Shipping cost in the stall currency.
    pub shipping_cost: f64,
    /// Stall currency code (e.g., "GBP").
    pub currency: String,
    /// Shipping address, present only for physical delivery.
    pub address: Option<ShippingAddress>,
    /// Buyer contact details.
    pub contact: ContactInfo,
    /// Optional customer note to the merchant.
    pub message: Option<String>,
}

impl Order {
    /// Total order value: unit price times quantity, plus shipping.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.price * f64::from(self.quantity) + self.shipping_cost
    }

    /// Short display reference derived from the order id.
    #[must_use]
    pub fn short_ref(&self) -> String {
        self.id.short_ref()
    }
}
