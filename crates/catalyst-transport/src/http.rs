//! HTTP transport for Catalyst Center.
//!
//! Requests carry an `X-Auth-Token` obtained from the token endpoint with
//! basic credentials. The token is cached for the life of the transport and
//! refreshed once when the controller answers 401.

use std::time::Duration;

use async_trait::async_trait;
use catalyst_core::{ControllerVersion, Record};
use parking_lot::RwLock;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::routes::{Method, ResolvedRequest, Route};
use crate::types::{Invocation, TaskStatus};
use crate::Transport;

const AUTH_HEADER: &str = "X-Auth-Token";

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "Token")]
    token: String,
}

/// HTTP client for the Catalyst Center REST API.
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a new transport.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the HTTP client cannot be built.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(!config.verify)
            .build()
            .map_err(|e| TransportError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a transport with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: TransportConfig) -> Self {
        let base_url = config.base_url();
        Self {
            client,
            config,
            base_url,
            token: RwLock::new(None),
        }
    }

    /// Get the base URL of the controller.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    async fn authenticate(&self) -> Result<String> {
        let url = format!("{}{}", self.base_url, Route::AUTH_TOKEN.path);
        tracing::debug!(url = %url, user = %self.config.username, "Requesting auth token");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| TransportError::Authentication(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Controller rejected credentials");
            return Err(TransportError::Authentication(format!(
                "token endpoint returned {status}: {}",
                error_message(&body)
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| TransportError::Authentication(format!("invalid token response: {e}")))?
            .token;

        *self.token.write() = Some(token.clone());
        Ok(token)
    }

    /// Send a resolved request with token refresh and retry.
    ///
    /// Transient statuses and connection errors are retried with exponential
    /// backoff; a 429 honors `Retry-After` when the header carries seconds.
    /// A mutating request that timed out is never resent, since the
    /// controller may already have applied it.
    async fn send(
        &self,
        operation: &str,
        request: &ResolvedRequest,
        mutates: bool,
    ) -> Result<Value> {
        let retry = &self.config.retry;
        let url = format!("{}{}", self.base_url, request.path);
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            attempt += 1;
            let token = self.token().await?;

            let mut builder = self
                .client
                .request(reqwest_method(request.method), &url)
                .header(AUTH_HEADER, token)
                .header(header::ACCEPT, "application/json");
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            tracing::debug!(
                operation = %operation,
                method = %request.method,
                url = %url,
                attempt = attempt,
                "Sending controller request"
            );

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED && !refreshed {
                        tracing::info!(operation = %operation, "Token rejected, re-authenticating");
                        *self.token.write() = None;
                        refreshed = true;
                        continue;
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(TransportError::Authentication(format!(
                            "controller rejected refreshed token for {operation}"
                        )));
                    }

                    if retry.should_retry(status.as_u16()) && attempt <= retry.max_retries {
                        let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                            response
                                .headers()
                                .get(header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(parse_retry_after)
                                .unwrap_or_else(|| retry.backoff(attempt))
                        } else {
                            retry.backoff(attempt)
                        };
                        tracing::warn!(
                            operation = %operation,
                            status = %status,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            "Transient controller error, retrying with backoff"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    let text = response.text().await.map_err(|e| TransportError::Decode {
                        operation: operation.to_string(),
                        message: e.to_string(),
                    })?;

                    if !status.is_success() {
                        let message = error_message(&text);
                        tracing::warn!(
                            operation = %operation,
                            status = %status,
                            error = %message,
                            "Controller request failed"
                        );
                        return Err(TransportError::Http {
                            operation: operation.to_string(),
                            status: status.as_u16(),
                            message,
                        });
                    }

                    if text.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return serde_json::from_str(&text).map_err(|e| TransportError::Decode {
                        operation: operation.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    if should_resend(&e, mutates) && attempt <= retry.max_retries {
                        let wait = retry.backoff(attempt);
                        tracing::warn!(
                            operation = %operation,
                            error = %e,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            "Request failed, retrying with backoff"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(TransportError::Connection {
                        operation: operation.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(
        &self,
        family: &str,
        operation: &str,
        params: &Record,
        mutates: bool,
    ) -> Result<Invocation> {
        let route =
            Route::lookup(family, operation).ok_or_else(|| TransportError::UnknownOperation {
                family: family.to_string(),
                operation: operation.to_string(),
            })?;
        let request = route.resolve(operation, params)?;

        let body = self.send(operation, &request, mutates).await?;
        let invocation = Invocation::from_body(body);

        if mutates {
            tracing::info!(
                family = %family,
                operation = %operation,
                task_id = invocation.task_id.as_deref().unwrap_or("-"),
                "Controller mutation accepted"
            );
        }
        Ok(invocation)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let params = Record::new().with("task_id", task_id);
        let invocation = self
            .invoke("task", "get_task_by_id", &params, false)
            .await?;
        TaskStatus::from_body(&invocation.response).map_err(|message| TransportError::Decode {
            operation: "get_task_by_id".to_string(),
            message,
        })
    }

    async fn version(&self) -> Result<ControllerVersion> {
        let invocation = self
            .invoke("platform", "release_summary", &Record::new(), false)
            .await?;
        let payload = invocation.payload();
        let raw = ["displayVersion", "installedVersion"]
            .iter()
            .find_map(|field| payload.get(*field).and_then(Value::as_str))
            .ok_or_else(|| TransportError::Decode {
                operation: "release_summary".to_string(),
                message: "no version in release summary".to_string(),
            })?;
        raw.parse::<ControllerVersion>()
            .map_err(|e| TransportError::Decode {
            operation: "release_summary".to_string(),
            message: e.to_string(),
        })
    }
}

/// Whether a request that failed before any response may be sent again.
fn should_resend(error: &reqwest::Error, mutates: bool) -> bool {
    !(mutates && error.is_timeout())
}

const fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Parse a `Retry-After` header given in seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pull the most specific reason out of an error body.
fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let scopes = [json.get("response"), Some(&json)];
    let message = scopes
        .into_iter()
        .flatten()
        .find_map(|scope| {
            ["detail", "message", "errorMessage", "error", "failureReason"]
                .iter()
                .find_map(|field| scope.get(*field).and_then(Value::as_str))
        })
        .map_or_else(|| body.trim().to_string(), str::to_string);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn error_message_prefers_detail() {
        let body = r#"{"response": {"errorCode": "NCSP10250", "detail": "Site already exists"}}"#;
        assert_eq!(error_message(body), "Site already exists");
        assert_eq!(error_message(r#"{"message": "bad"}"#), "bad");
        assert_eq!(error_message("plain text "), "plain text");
        assert_eq!(error_message(r#"{"status": 500} "#), r#"{"status": 500}"#);
    }

    #[test]
    fn transport_uses_configured_base_url() {
        let config =
            TransportConfig::new("dnac", "u", "p").with_base_url("http://localhost:9000/");
        let transport = HttpTransport::new(config).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:9000");
    }
}
