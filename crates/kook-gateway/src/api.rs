//! KOOK HTTP API client.
//!
//! Two concerns live here: resolving the gateway endpoint before each connect
//! attempt, and the outbound message sends. Every call carries the bot token
//! as `Authorization: Bot <token>`. Calls are never retried internally.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kook_proto::{ApiEnvelope, CreateMessageRequest, GatewayIndex, MessageReceipt};
use reqwest::header::AUTHORIZATION;
use tracing::{debug, info};
use url::Url;

use crate::error::GatewayError;
use crate::gateway::ResumeState;

/// Production API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://www.kookapp.cn/api/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque bot credential. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(Arc<str>);

impl BotToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    /// The raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value of the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bot {}", self.0)
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken(***)")
    }
}

/// A resolved gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// WebSocket URL to dial.
    pub url: String,
    /// Whether the lookup asked to resume an earlier session.
    pub resume: bool,
}

/// Client for the KOOK HTTP API.
#[derive(Debug, Clone)]
pub struct KookApi {
    client: reqwest::Client,
    base_url: Url,
    token: BotToken,
}

impl KookApi {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, token: BotToken) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::Config(format!("invalid api_base_url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(GatewayError::Config(format!(
                "api_base_url must be an http(s) URL: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("kook-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// The credential used by this client.
    #[must_use]
    pub const fn token(&self) -> &BotToken {
        &self.token
    }

    /// Resolve the gateway URL for the next connection attempt.
    ///
    /// When `resume` holds a session id the lookup is resume-flavored and
    /// carries `resume=1`, `sn` and `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Locator`] on transport failure, a non-2xx
    /// status, a non-zero body code, or a missing or non-WebSocket URL.
    pub async fn resolve_gateway(
        &self,
        compress: bool,
        resume: &ResumeState,
    ) -> Result<Endpoint, GatewayError> {
        let mut url = self.endpoint("gateway/index")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("compress", if compress { "1" } else { "0" });
            if let Some(session_id) = &resume.session_id {
                query
                    .append_pair("resume", "1")
                    .append_pair("sn", &resume.last_sequence.to_string())
                    .append_pair("session_id", session_id);
            }
        }

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.token.authorization())
            .send()
            .await
            .map_err(|e| GatewayError::Locator(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Locator(format!("HTTP {status}")));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::Locator(format!("invalid response body: {e}")))?;
        if !envelope.is_success() {
            return Err(GatewayError::Locator(format!(
                "code {}: {}",
                envelope.code, envelope.message
            )));
        }

        let index: GatewayIndex = envelope
            .into_data()
            .map_err(|e| GatewayError::Locator(format!("missing gateway url: {e}")))?;
        if !index.url.starts_with("ws://") && !index.url.starts_with("wss://") {
            return Err(GatewayError::Locator(format!(
                "not a websocket url: {}",
                index.url
            )));
        }

        debug!(resume = resume.session_id.is_some(), "resolved gateway endpoint");
        Ok(Endpoint {
            url: index.url,
            resume: resume.session_id.is_some(),
        })
    }

    /// Post a text message to a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn send_text(
        &self,
        target_id: &str,
        text: &str,
    ) -> Result<MessageReceipt, GatewayError> {
        self.create_message(&CreateMessageRequest::text(target_id, text))
            .await
    }

    /// Post an image message referencing an already-hosted image.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it.
    pub async fn send_image(
        &self,
        target_id: &str,
        image_url: &str,
    ) -> Result<MessageReceipt, GatewayError> {
        self.create_message(&CreateMessageRequest::image(target_id, image_url))
            .await
    }

    async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<MessageReceipt, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("message/create")?)
            .header(AUTHORIZATION, self.token.authorization())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                code: i64::from(status.as_u16()),
                message: body,
            });
        }

        let envelope: ApiEnvelope = response.json().await?;
        if !envelope.is_success() {
            return Err(GatewayError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        let receipt: MessageReceipt = envelope.into_data()?;
        info!(
            target_id = %request.target_id,
            msg_id = %receipt.msg_id,
            kind = request.type_code,
            "message sent"
        );
        Ok(receipt)
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Config(format!("invalid api_base_url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(path.split('/'));
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> KookApi {
        KookApi::new(base, BotToken::new("secret")).expect("client")
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = BotToken::new("very-secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("very-secret"));
        assert_eq!(token.authorization(), "Bot very-secret");
    }

    #[test]
    fn test_api_debug_does_not_leak_token() {
        let debug = format!("{:?}", api(DEFAULT_API_BASE_URL));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let api = api("https://www.kookapp.cn/api/v3");
        let url = api.endpoint("gateway/index").expect("url");
        assert_eq!(url.as_str(), "https://www.kookapp.cn/api/v3/gateway/index");

        let trailing = KookApi::new("https://example.com/api/v3/", BotToken::new("t"))
            .expect("client");
        let url = trailing.endpoint("message/create").expect("url");
        assert_eq!(url.as_str(), "https://example.com/api/v3/message/create");
    }

    #[test]
    fn test_rejects_non_http_base() {
        let err = KookApi::new("ws://example.com", BotToken::new("t")).expect_err("scheme");
        assert!(matches!(err, GatewayError::Config(_)));

        let err = KookApi::new("not a url", BotToken::new("t")).expect_err("parse");
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
