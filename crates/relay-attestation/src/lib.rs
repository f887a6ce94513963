//! A thin client for the upstream attestation API: `GET
//! {base}/v2/messages/{sourceDomain}?transactionHash={txHash}`. There is no
//! batch endpoint, no listing, and no push: each job must be polled
//! independently, which is exactly why [`relay_ratelimit::RateLimiter`] sits
//! in front of every call this client makes.

use std::time::Duration;

use serde::Deserialize;

const MAINNET_BASE_URL: &str = "https://iris-api.circle.com";
const TESTNET_BASE_URL: &str = "https://iris-api-sandbox.circle.com";

/// Default per-call timeout. A call that exceeds this is treated by the
/// poller as "other non-success" for this cycle, not retried inline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("request to attestation API failed")]
    Request(#[from] reqwest::Error),

    #[error("malformed attestation response body")]
    MalformedBody(#[from] serde_json::Error),
}

/// One row of the upstream's `messages` array.
#[derive(Debug, Deserialize)]
struct MessageEntry {
    message: String,
    attestation: String,
    #[serde(rename = "eventNonce")]
    event_nonce: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessagesBody {
    messages: Vec<MessageEntry>,
}

/// A complete, usable attestation for one burn. Corresponds to a `messages[0]`
/// entry whose `status` is `"complete"` and whose `attestation` is not the
/// sentinel string `"PENDING"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub message: String,
    pub attestation: String,
    pub event_nonce: String,
}

/// The outcome of one poll, mapped onto the taxonomy the poller's per-job
/// algorithm switches on (see the orchestrator's design doc §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// Upstream 404: not yet indexed.
    NotFound,
    /// Upstream 429: the caller must back off globally for 60s and abort
    /// the rest of its poll cycle.
    Throttled,
    /// Any other non-2xx: log and retry next cycle.
    Unavailable { status: u16 },
    /// 200, but the first message is not yet attested
    /// (`status != "complete"` or `attestation == "PENDING"`).
    Pending,
    /// 200, with a usable attestation in `messages[0]`.
    Attested(Attestation),
}

/// AttestationClient issues the single GET this system needs against the
/// upstream service; it carries no retry logic of its own, because retry
/// policy (back off 60s on throttle, else poll again next cycle) belongs to
/// the poller loop, not the client.
#[derive(Clone)]
pub struct AttestationClient {
    http: reqwest::Client,
    base_url: String,
}

impl AttestationClient {
    pub fn new(is_testnet: bool) -> Self {
        Self::with_base_url(if is_testnet {
            TESTNET_BASE_URL
        } else {
            MAINNET_BASE_URL
        })
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client with static config must build");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Polls for the attestation of `tx_hash` on `source_domain`, taking only
    /// the first entry of the `messages` array when the upstream returns
    /// more than one (see the orchestrator's open questions: additional
    /// attestations for the same tx are silently dropped, as upstream).
    #[tracing::instrument(skip(self), fields(source_domain, tx_hash))]
    pub async fn poll(
        &self,
        source_domain: i64,
        tx_hash: &str,
    ) -> Result<PollResponse, AttestationError> {
        let url = format!(
            "{}/v2/messages/{}?transactionHash={}",
            self.base_url, source_domain, tx_hash
        );

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = ?err, "attestation request failed to send");
                return Err(err.into());
            }
        };

        match response.status().as_u16() {
            404 => Ok(PollResponse::NotFound),
            429 => Ok(PollResponse::Throttled),
            status if !(200..300).contains(&status) => Ok(PollResponse::Unavailable { status }),
            _ => {
                let body: MessagesBody = response.json().await.map_err(|err| {
                    tracing::warn!(error = ?err, "failed to decode attestation response body");
                    AttestationError::Request(err)
                })?;

                match body.messages.into_iter().next() {
                    None => Ok(PollResponse::Pending),
                    Some(entry) if entry.status != "complete" || entry.attestation == "PENDING" => {
                        Ok(PollResponse::Pending)
                    }
                    Some(entry) => Ok(PollResponse::Attested(Attestation {
                        message: entry.message,
                        attestation: entry.attestation,
                        event_nonce: entry.event_nonce,
                    })),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn not_found_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v2/messages/3$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = AttestationClient::with_base_url(server.uri());
        let response = client.poll(3, "0xabc").await.unwrap();
        assert_eq!(response, PollResponse::NotFound);
    }

    #[tokio::test]
    async fn throttle_maps_to_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = AttestationClient::with_base_url(server.uri());
        let response = client.poll(3, "0xabc").await.unwrap();
        assert_eq!(response, PollResponse::Throttled);
    }

    #[tokio::test]
    async fn pending_attestation_string_is_still_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{
                    "message": "0x00",
                    "attestation": "PENDING",
                    "eventNonce": "1",
                    "status": "complete",
                }]
            })))
            .mount(&server)
            .await;

        let client = AttestationClient::with_base_url(server.uri());
        let response = client.poll(3, "0xabc").await.unwrap();
        assert_eq!(response, PollResponse::Pending);
    }

    #[tokio::test]
    async fn complete_and_signed_is_attested() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{
                    "message": "0xdead",
                    "attestation": "0xbeef",
                    "eventNonce": "42",
                    "status": "complete",
                }]
            })))
            .mount(&server)
            .await;

        let client = AttestationClient::with_base_url(server.uri());
        let response = client.poll(3, "0xabc").await.unwrap();
        assert_eq!(
            response,
            PollResponse::Attested(Attestation {
                message: "0xdead".into(),
                attestation: "0xbeef".into(),
                event_nonce: "42".into(),
            })
        );
    }

    #[tokio::test]
    async fn only_first_message_is_taken() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [
                    {"message": "0xfirst", "attestation": "0xfirst", "eventNonce": "1", "status": "complete"},
                    {"message": "0xsecond", "attestation": "0xsecond", "eventNonce": "2", "status": "complete"},
                ]
            })))
            .mount(&server)
            .await;

        let client = AttestationClient::with_base_url(server.uri());
        let response = client.poll(3, "0xabc").await.unwrap();
        match response {
            PollResponse::Attested(a) => assert_eq!(a.event_nonce, "1"),
            other => panic!("expected Attested, got {other:?}"),
        }
    }
}
