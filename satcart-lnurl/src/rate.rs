//! Fiat to satoshi conversion via an exchange-rate oracle.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::PayRailError;

/// Default oracle endpoint (CoinGecko simple-price API).
pub const DEFAULT_ORACLE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches bitcoin exchange rates and converts fiat amounts to sats.
///
/// No caching: checkout is infrequent and the rate must be fresh, so every
/// call re-fetches.
#[derive(Debug, Clone)]
pub struct RateOracle {
    base_url: String,
    client: reqwest::Client,
}

impl Default for RateOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_URL)
    }
}

impl RateOracle {
    /// Creates an oracle against the given simple-price endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("failed to build reqwest::Client");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        }
    }

    /// Uses a pre-configured reqwest client.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Converts a fiat amount to satoshis at the current rate, rounding up
    /// so the merchant is never short.
    ///
    /// # Errors
    ///
    /// [`PayRailError::Conversion`] if the oracle is unreachable, returns a
    /// non-OK status or an unparseable body, or does not quote `currency`.
    pub async fn fiat_to_sats(&self, amount: f64, currency: &str) -> Result<u64, PayRailError> {
        let rate = self.bitcoin_rate(currency).await?;
        if rate <= 0.0 {
            return Err(PayRailError::Conversion(format!(
                "oracle returned non-positive rate {rate} for {currency}"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let sats = (amount / rate * 100_000_000.0).ceil() as u64;
        #[cfg(feature = "telemetry")]
        tracing::debug!(amount, currency, rate, sats, "converted fiat to sats");
        Ok(sats)
    }

    /// Fetches the bitcoin price in the given currency.
    ///
    /// Every failure mode is a conversion error, transport included: the
    /// caller's contract is "could not convert", not "which hop broke".
    async fn bitcoin_rate(&self, currency: &str) -> Result<f64, PayRailError> {
        let currency = currency.to_lowercase();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ids", "bitcoin"), ("vs_currencies", currency.as_str())])
            .send()
            .await
            .map_err(|e| PayRailError::Conversion(format!("oracle unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(PayRailError::Conversion(format!(
                "oracle returned {}",
                response.status()
            )));
        }
        let quotes: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| PayRailError::Conversion(format!("malformed oracle response: {e}")))?;
        quotes
            .get("bitcoin")
            .and_then(|by_currency| by_currency.get(&currency))
            .copied()
            .ok_or_else(|| {
                PayRailError::Conversion(format!("oracle does not quote currency {currency:?}"))
            })
    }
}
