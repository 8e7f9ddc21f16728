//! HTTP client for the outbound SMS gateway.
//!
//! The gateway accepts one body with a list of recipients per request and
//! answers with a verdict per recipient, keyed by the id we send along.

use std::sync::Arc;
use std::time::Duration;

use domain::services::{GatewayError, MockSmsGateway, SendOutcome, SendUnit, SmsGateway};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Retries after the first attempt for transport errors and 5xx answers.
const MAX_RETRIES: u32 = 2;

/// Selects the gateway named by `[gateway] provider`.
pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<dyn SmsGateway>, GatewayError> {
    match config.provider.as_str() {
        "console" => {
            tracing::warn!("Using console SMS gateway; messages are logged, not sent");
            Ok(Arc::new(MockSmsGateway::new()))
        }
        "http" => Ok(Arc::new(HttpSmsGateway::new(config.clone())?)),
        other => Err(GatewayError::Rejected(format!(
            "Unknown gateway provider '{}'",
            other
        ))),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    from: &'a str,
    text: &'a str,
    messages: Vec<Destination<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Destination<'a> {
    to: &'a str,
    custom_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    results: Vec<DestinationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinationResult {
    custom_id: String,
    success: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl DestinationResult {
    fn into_outcome(self) -> Result<SendOutcome, GatewayError> {
        let message_id = self.custom_id.parse::<i64>().map_err(|_| {
            GatewayError::InvalidResponse(format!("unknown customId '{}'", self.custom_id))
        })?;
        Ok(if self.success {
            SendOutcome::delivered(message_id)
        } else {
            SendOutcome::rejected(message_id, self.reason.unwrap_or_else(|| "rejected".into()))
        })
    }
}

/// Gateway reached over HTTPS with key/secret basic auth.
pub struct HttpSmsGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpSmsGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        if config.base_url.is_empty() {
            return Err(GatewayError::Unavailable("gateway base_url is empty".into()));
        }
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(GatewayError::Credentials);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    async fn post(&self, request: &SendRequest<'_>) -> Result<SendResponse, GatewayError> {
        let url = self.url();
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                // 200ms, 400ms
                tokio::time::sleep(Duration::from_millis(200 * (1 << (attempt - 1)))).await;
            }

            let response = self
                .client
                .post(&url)
                .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(
                        recipients = request.messages.len(),
                        attempt = attempt,
                        "Gateway accepted request"
                    );
                    return resp
                        .json::<SendResponse>()
                        .await
                        .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let error_text = resp.text().await.unwrap_or_default();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(GatewayError::Credentials);
                    }
                    if status.is_server_error() {
                        last_error = Some(GatewayError::Unavailable(format!(
                            "{}: {}",
                            status, error_text
                        )));
                        continue;
                    }
                    return Err(GatewayError::Rejected(format!("{}: {}", status, error_text)));
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt, error = %e, "Gateway request failed");
                    last_error = Some(GatewayError::Unavailable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::Unavailable("no attempt made".into())))
    }
}

#[async_trait::async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send_one(&self, sender: &str, to: &str, body: &str) -> Result<(), GatewayError> {
        let outcomes = self
            .send_many(
                sender,
                body,
                &[SendUnit {
                    message_id: 0,
                    address: to.to_string(),
                }],
            )
            .await?;

        match outcomes.into_iter().next() {
            Some(outcome) if outcome.success => Ok(()),
            Some(outcome) => Err(GatewayError::Rejected(
                outcome.reason.unwrap_or_else(|| "rejected".into()),
            )),
            None => Err(GatewayError::InvalidResponse("empty result list".into())),
        }
    }

    async fn send_many(
        &self,
        sender: &str,
        body: &str,
        recipients: &[SendUnit],
    ) -> Result<Vec<SendOutcome>, GatewayError> {
        let request = SendRequest {
            from: sender,
            text: body,
            messages: recipients
                .iter()
                .map(|r| Destination {
                    to: &r.address,
                    custom_id: r.message_id.to_string(),
                })
                .collect(),
        };

        let response = self.post(&request).await?;
        response
            .results
            .into_iter()
            .map(DestinationResult::into_outcome)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config() -> GatewayConfig {
        GatewayConfig {
            provider: "http".to_string(),
            base_url: "https://sms.example.com/".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_build_console_gateway() {
        assert!(build_gateway(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_build_http_gateway_requires_credentials() {
        let mut config = http_config();
        config.api_secret.clear();
        assert!(matches!(
            build_gateway(&config).err(),
            Some(GatewayError::Credentials)
        ));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let gateway = HttpSmsGateway::new(http_config()).unwrap();
        assert_eq!(gateway.url(), "https://sms.example.com/v1/messages");
    }

    #[test]
    fn test_request_wire_format() {
        let request = SendRequest {
            from: "SHOP1",
            text: "Hi",
            messages: vec![Destination {
                to: "010-1",
                custom_id: "42".to_string(),
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["customId"], "42");
        assert_eq!(json["from"], "SHOP1");
    }

    #[test]
    fn test_response_maps_to_outcomes() {
        let response: SendResponse = serde_json::from_str(
            r#"{"results": [
                {"customId": "1", "success": true},
                {"customId": "2", "success": false, "reason": "blocked"}
            ]}"#,
        )
        .unwrap();
        let outcomes: Vec<SendOutcome> = response
            .results
            .into_iter()
            .map(|r| r.into_outcome().unwrap())
            .collect();
        assert_eq!(outcomes[0], SendOutcome::delivered(1));
        assert_eq!(outcomes[1], SendOutcome::rejected(2, "blocked"));
    }

    #[test]
    fn test_unknown_custom_id_is_invalid_response() {
        let result = DestinationResult {
            custom_id: "abc".to_string(),
            success: true,
            reason: None,
        };
        assert!(matches!(
            result.into_outcome(),
            Err(GatewayError::InvalidResponse(_))
        ));
    }
}
