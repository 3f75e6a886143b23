//! LNURL-pay parameter fetch and invoice request.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use satcart::order::Order;
use satcart::session::{Invoice, InvoiceSource, InvoiceSourceError};

use crate::address::lightning_address_to_lnurl;
use crate::error::{AmountBound, PayRailError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// LNURL-pay parameters served from the lightning address's well-known
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LnurlPayParams {
    /// Callback URL the invoice is requested from.
    pub callback: String,
    /// Minimum payable amount, in millisats.
    pub min_sendable: u64,
    /// Maximum payable amount, in millisats.
    pub max_sendable: u64,
    /// Opaque metadata string echoed by the service.
    pub metadata: String,
    /// Protocol tag, `payRequest` for LNURL-pay.
    pub tag: String,
    /// Maximum accepted comment length, if comments are supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_allowed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    pr: String,
}

/// HTTP client for the LNURL-pay protocol.
#[derive(Debug, Clone)]
pub struct LnurlClient {
    client: reqwest::Client,
}

impl Default for LnurlClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LnurlClient {
    /// Creates a client with the default request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("failed to build reqwest::Client");
        Self { client }
    }

    /// Uses a pre-configured reqwest client.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Fetches the pay parameters behind a lightning address.
    ///
    /// # Errors
    ///
    /// [`PayRailError::MalformedAddress`] for a bad address,
    /// [`PayRailError::Lnurl`] when the endpoint returns a non-OK status or
    /// signals `status: "ERROR"`, [`PayRailError::Http`] on transport
    /// failure.
    pub async fn fetch_pay_params(&self, address: &str) -> Result<LnurlPayParams, PayRailError> {
        let endpoint = lightning_address_to_lnurl(address)?;
        self.fetch_pay_params_from(&endpoint).await
    }

    /// Fetches pay parameters from an already-resolved LNURL endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fetch_pay_params`], minus address validation.
    pub async fn fetch_pay_params_from(
        &self,
        endpoint: &str,
    ) -> Result<LnurlPayParams, PayRailError> {
        let response = self.client.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(PayRailError::Lnurl {
                reason: format!("pay parameter endpoint returned {}", response.status()),
            });
        }
        let body: serde_json::Value = response.json().await?;
        if let Some(reason) = error_reason(&body) {
            return Err(PayRailError::Lnurl { reason });
        }
        serde_json::from_value(body).map_err(|e| PayRailError::Lnurl {
            reason: format!("malformed pay parameters: {e}"),
        })
    }

    /// Requests an invoice for `amount_sats` from the callback.
    ///
    /// The amount is validated against the sendable bounds before any
    /// network call. The comment is attached only when non-empty and
    /// within the service's `commentAllowed` length.
    ///
    /// # Errors
    ///
    /// [`PayRailError::AmountOutOfRange`] when the bounds reject the
    /// amount, [`PayRailError::Invoice`] when the callback returns a non-OK
    /// status or `status: "ERROR"`, [`PayRailError::Http`] on transport
    /// failure.
    pub async fn request_invoice(
        &self,
        params: &LnurlPayParams,
        amount_sats: u64,
        comment: Option<&str>,
    ) -> Result<Invoice, PayRailError> {
        let amount_msats = validate_amount(params, amount_sats)?;

        let mut callback = Url::parse(&params.callback).map_err(|e| PayRailError::Lnurl {
            reason: format!("malformed callback URL: {e}"),
        })?;
        callback
            .query_pairs_mut()
            .append_pair("amount", &amount_msats.to_string());
        if let Some(comment) = comment.filter(|c| !c.is_empty()) {
            if let Some(allowed) = params.comment_allowed {
                if u64::try_from(comment.len()).is_ok_and(|len| len <= allowed) {
                    callback.query_pairs_mut().append_pair("comment", comment);
                }
            }
        }

        let response = self.client.get(callback).send().await?;
        if !response.status().is_success() {
            return Err(PayRailError::Invoice(format!(
                "callback returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await?;
        if let Some(reason) = error_reason(&body) {
            return Err(PayRailError::Invoice(reason));
        }
        let invoice: InvoiceResponse = serde_json::from_value(body)
            .map_err(|e| PayRailError::Invoice(format!("malformed invoice response: {e}")))?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(amount_sats, "received invoice from lnurl callback");

        Ok(Invoice {
            pr: invoice.pr,
            amount_sats,
            min_sendable_msats: Some(params.min_sendable),
            max_sendable_msats: Some(params.max_sendable),
        })
    }
}

/// Checks the amount against the sendable bounds, returning it in msats.
fn validate_amount(params: &LnurlPayParams, amount_sats: u64) -> Result<u64, PayRailError> {
    let Some(amount_msats) = amount_sats.checked_mul(1000) else {
        return Err(PayRailError::AmountOutOfRange {
            amount_sats,
            bound: AmountBound::TooHigh {
                max_sats: params.max_sendable / 1000,
            },
        });
    };
    if amount_msats < params.min_sendable {
        return Err(PayRailError::AmountOutOfRange {
            amount_sats,
            bound: AmountBound::TooLow {
                min_sats: params.min_sendable.div_ceil(1000),
            },
        });
    }
    if amount_msats > params.max_sendable {
        return Err(PayRailError::AmountOutOfRange {
            amount_sats,
            bound: AmountBound::TooHigh {
                max_sats: params.max_sendable / 1000,
            },
        });
    }
    Ok(amount_msats)
}

/// Extracts the `reason` from an LNURL `status: "ERROR"` envelope.
fn error_reason(body: &serde_json::Value) -> Option<String> {
    if body.get("status").and_then(serde_json::Value::as_str) != Some("ERROR") {
        return None;
    }
    Some(
        body.get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unspecified error")
            .to_owned(),
    )
}

/// Where a rail finds its pay parameters.
#[derive(Debug, Clone)]
enum PayTarget {
    /// `user@domain` lightning address, resolved per request.
    Address(String),
    /// Already-resolved LNURL-pay endpoint.
    Endpoint(String),
}

/// The full LNURL rail: pay-parameter fetch plus invoice request, with the
/// order's reference as the invoice comment.
#[derive(Debug, Clone)]
pub struct LnurlRail {
    client: LnurlClient,
    target: PayTarget,
}

impl LnurlRail {
    /// Creates a rail paying to the given lightning address.
    #[must_use]
    pub fn new(client: LnurlClient, address: impl Into<String>) -> Self {
        Self {
            client,
            target: PayTarget::Address(address.into()),
        }
    }

    /// Creates a rail against an already-resolved LNURL-pay endpoint, for
    /// merchants that publish the endpoint instead of an address.
    #[must_use]
    pub fn with_endpoint(client: LnurlClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            target: PayTarget::Endpoint(endpoint.into()),
        }
    }
}

#[async_trait]
impl InvoiceSource for LnurlRail {
    async fn invoice_for(
        &self,
        order: &Order,
        amount_sats: u64,
    ) -> Result<Invoice, InvoiceSourceError> {
        let params = match &self.target {
            PayTarget::Address(address) => self.client.fetch_pay_params(address).await?,
            PayTarget::Endpoint(endpoint) => self.client.fetch_pay_params_from(endpoint).await?,
        };
        let comment = satcart::codec::invoice_comment(order);
        self.client
            .request_invoice(&params, amount_sats, Some(&comment))
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(callback: &str) -> LnurlPayParams {
        LnurlPayParams {
            callback: callback.to_owned(),
            min_sendable: 1_000,
            max_sendable: 100_000_000,
            metadata: r#"[["text/plain","prints"]]"#.to_owned(),
            tag: "payRequest".to_owned(),
            comment_allowed: Some(64),
        }
    }

    #[tokio::test]
    async fn fetches_pay_params_from_the_well_known_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/lnurlp/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "callback": "https://ln.example.com/lnurlp/alice/callback",
                "minSendable": 1000,
                "maxSendable": 100_000_000,
                "metadata": "[[\"text/plain\",\"prints\"]]",
                "tag": "payRequest",
                "commentAllowed": 64,
            })))
            .mount(&server)
            .await;

        let fetched = LnurlClient::new()
            .fetch_pay_params_from(&format!("{}/.well-known/lnurlp/alice", server.uri()))
            .await
            .unwrap();
        assert_eq!(fetched.comment_allowed, Some(64));
        assert_eq!(fetched.min_sendable, 1_000);
        assert_eq!(fetched.tag, "payRequest");
    }

    #[tokio::test]
    async fn endpoint_error_status_carries_the_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ERROR",
                "reason": "user not found",
            })))
            .mount(&server)
            .await;

        let err = LnurlClient::new()
            .fetch_pay_params_from(&format!("{}/.well-known/lnurlp/bob", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PayRailError::Lnurl { reason } if reason == "user not found"));
    }

    #[tokio::test]
    async fn address_is_validated_before_any_request() {
        let err = LnurlClient::new()
            .fetch_pay_params("not-an-address")
            .await
            .unwrap_err();
        assert!(matches!(err, PayRailError::MalformedAddress(_)));
    }

    #[tokio::test]
    async fn out_of_range_amount_never_reaches_the_network() {
        let server = MockServer::start().await;
        // No mounted mock: any request would 404 and the hit counter below
        // would show it.
        let client = LnurlClient::new();
        let params = params(&format!("{}/callback", server.uri()));

        let low = client.request_invoice(&params, 0, None).await.unwrap_err();
        assert!(matches!(
            low,
            PayRailError::AmountOutOfRange {
                bound: AmountBound::TooLow { min_sats: 1 },
                ..
            }
        ));

        let high = client
            .request_invoice(&params, 200_000, None)
            .await
            .unwrap_err();
        assert!(matches!(
            high,
            PayRailError::AmountOutOfRange {
                bound: AmountBound::TooHigh { max_sats: 100_000 },
                ..
            }
        ));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requests_invoice_with_amount_and_comment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/callback"))
            .and(query_param("amount", "50000000"))
            .and(query_param("comment", "Order #M3AB9XYZ - Sunrise Print"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"pr": "lnbc500u1p...", "routes": []})),
            )
            .mount(&server)
            .await;

        let client = LnurlClient::new();
        let params = params(&format!("{}/callback", server.uri()));
        let invoice = client
            .request_invoice(&params, 50_000, Some("Order #M3AB9XYZ - Sunrise Print"))
            .await
            .unwrap();
        assert_eq!(invoice.pr, "lnbc500u1p...");
        assert_eq!(invoice.amount_sats, 50_000);
        assert_eq!(invoice.min_sendable_msats, Some(1_000));
        assert_eq!(invoice.max_sendable_msats, Some(100_000_000));
    }

    #[tokio::test]
    async fn overlong_comment_is_dropped_not_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/callback"))
            .and(query_param("amount", "1000000"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"pr": "lnbc10u1p..."})),
            )
            .mount(&server)
            .await;

        let client = LnurlClient::new();
        let params = params(&format!("{}/callback", server.uri()));
        let long_comment = "x".repeat(65);
        client
            .request_invoice(&params, 1_000, Some(&long_comment))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].url.query().unwrap_or("").contains("comment"));
    }

    #[tokio::test]
    async fn callback_error_status_is_an_invoice_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/callback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ERROR",
                "reason": "temporarily unavailable",
            })))
            .mount(&server)
            .await;

        let client = LnurlClient::new();
        let params = params(&format!("{}/callback", server.uri()));
        let err = client
            .request_invoice(&params, 1_000, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PayRailError::Invoice(reason) if reason == "temporarily unavailable"));
    }
}
