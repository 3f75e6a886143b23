//! Lightning address resolution.

use crate::error::PayRailError;

/// Derives the LNURL-pay endpoint for a `user@domain` lightning address.
///
/// # Errors
///
/// [`PayRailError::MalformedAddress`] unless the address contains exactly
/// one `@` with non-empty halves.
pub fn lightning_address_to_lnurl(address: &str) -> Result<String, PayRailError> {
    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(domain), None) if !user.is_empty() && !domain.is_empty() => {
            Ok(format!("https://{domain}/.well-known/lnurlp/{user}"))
        }
        _ => Err(PayRailError::MalformedAddress(address.to_owned())),
    }
}
