//! Order payload builders.
//!
//! Every order is emitted in two representations sharing the same
//! [`OrderId`](crate::order::OrderId): a machine-parseable [`OrderMessage`]
//! for merchant-side automation, and a multi-line text summary for merchants
//! reading the DM stream in a generic client. Merchant tooling is assumed to
//! dedup the pair on the shared id; no protocol-level handshake exists.

use crate::order::{Order, format_shipping_address};
use crate::proto::{MessageType, OrderItem, OrderMessage};

/// Builds the structured (type `0`) order payload.
#[must_use]
pub fn structured(order: &Order) -> OrderMessage {
    OrderMessage {
        id: order.id.clone(),
        message_type: MessageType,
        name: order.address.as_ref().map(|a| a.full_name.clone()),
        address: order.address.as_ref().map(format_shipping_address),
        message: order.message.clone(),
        contact: order.contact.clone(),
        items: vec![OrderItem {
            product_id: order.product_id.clone(),
            quantity: order.quantity,
        }],
        shipping_id: order.shipping_id.clone(),
    }
}

/// Builds the human-readable order summary.
///
/// Layout: order header, product block, shipping block, total, indented
/// address block for physical delivery, contact block, optional customer
/// note, and a footer with the full order and product ids.
#[must_use]
pub fn readable(order: &Order) -> String {
    let mut lines = vec![
        format!("🛒 NEW ORDER #{}", order.short_ref()),
        String::new(),
        format!("📦 Product: {}", order.product_name),
        format!("   Quantity: {}", order.quantity),
        format!("   Price: {} {}", order.price, order.currency),
        String::new(),
        format!("🚚 Shipping: {}", order.shipping_zone_name),
        format!("   Cost: {}", cost_label(order.shipping_cost, &order.currency)),
        String::new(),
        format!("💰 TOTAL: {} {}", order.total(), order.currency),
        String::new(),
    ];

    if let Some(address) = &order.address {
        lines.push("📍 Shipping Address:".to_owned());
        for line in format_shipping_address(address).lines() {
            lines.push(format!("   {line}"));
        }
        lines.push(String::new());
    }

    lines.push("📧 Contact:".to_owned());
    if let Some(email) = &order.contact.email {
        lines.push(format!("   Email: {email}"));
    }
    if let Some(phone) = &order.contact.phone {
        lines.push(format!("   Phone: {phone}"));
    }
    lines.push(String::new());

    if let Some(message) = &order.message {
        lines.push("💬 Message from customer:".to_owned());
        lines.push(format!("   {message}"));
        lines.push(String::new());
    }

    lines.push("---".to_owned());
    lines.push(format!("Order ID: {}", order.id));
    lines.push(format!("Product ID: {}", order.product_id));

    lines.join("\n")
}

/// Builds the post-settlement confirmation DM body.
#[must_use]
pub fn confirmation(order: &Order, amount_sats: u64) -> String {
    [
        "✅ PAYMENT RECEIVED".to_owned(),
        String::new(),
        format!("Order #{} has been paid!", order.short_ref()),
        String::new(),
        format!("📦 Product: {}", order.product_name),
        format!(
            "💰 Amount: {amount_sats} sats ({} {})",
            order.total(),
            order.currency
        ),
        String::new(),
        "Please process this order. Thank you!".to_owned(),
    ]
    .join("\n")
}

/// Builds the invoice comment sent to the payment rail.
#[must_use]
pub fn invoice_comment(order: &Order) -> String {
    format!("Order #{} - {}", order.short_ref(), order.product_name)
}

fn cost_label(cost: f64, currency: &str) -> String {
    if cost == 0.0 {
        "Free".to_owned()
    } else {
        format!("{cost} {currency}")
    }
}
