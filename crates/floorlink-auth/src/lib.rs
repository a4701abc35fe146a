// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-auth
//!
//! HTTP client for the HMI authorization service.
//!
//! Credentials are POSTed as `{"username","password","service"}` JSON. Every
//! failure (unreachable service, timeout, HTTP error status, undecodable
//! body) surfaces as an [`AuthServiceError`], which the login handshake
//! answers with the reject code.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use floorlink_core::auth::{AuthReply, AuthRequest};
use floorlink_core::driver::AuthClient;
use floorlink_core::error::AuthServiceError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// AuthError
// =============================================================================

/// Client construction errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The service URL is not an absolute http(s) URL.
    #[error("Invalid authorization URL '{url}': {reason}")]
    InvalidUrl {
        /// The input.
        url: String,
        /// Reason.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// =============================================================================
// HttpAuthClient
// =============================================================================

/// Authorization client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl HttpAuthClient {
    /// Creates a client posting to `url` with a per-request `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| AuthError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::InvalidUrl {
                url: url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("floorlink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { url: parsed, client })
    }

    /// Returns the service URL.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

fn classify(error: reqwest::Error) -> AuthServiceError {
    if let Some(status) = error.status() {
        AuthServiceError::Status(status.as_u16())
    } else if error.is_timeout() {
        AuthServiceError::Unreachable("request timed out".to_string())
    } else {
        AuthServiceError::Unreachable(error.to_string())
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn authorize(&self, request: &AuthRequest) -> Result<AuthReply, AuthServiceError> {
        debug!(url = %self.url, username = %request.username, service = %request.service, "Sending authorization request");

        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "Authorization service error status");
            return Err(AuthServiceError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let reply = AuthReply::from_json(&body)?;
        info!(username = %request.username, approved = reply.is_approved(), "Authorization reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/server/auth/authenticate", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length || n == 0 {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    fn request() -> AuthRequest {
        AuthRequest {
            username: "bob".into(),
            password: "pw".into(),
            service: "factory".into(),
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(HttpAuthClient::new("not a url", DEFAULT_TIMEOUT).is_err());
        assert!(HttpAuthClient::new("ftp://host/auth", DEFAULT_TIMEOUT).is_err());
        assert!(HttpAuthClient::new("http://sat-mes/server/auth/authenticate", DEFAULT_TIMEOUT).is_ok());
    }

    #[tokio::test]
    async fn test_approved_reply() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"result":1,"displayName":"Bob","rights":{"mespoc":{"mespoc":{"User":"5"}}}}"#,
        )
        .await;
        let client = HttpAuthClient::new(&url, DEFAULT_TIMEOUT).unwrap();
        let reply = client.authorize(&request()).await.unwrap();
        assert!(reply.is_approved());
        assert_eq!(reply.display_name, "Bob");
        assert_eq!(reply.access_level, 5);

        let seen = server.await.unwrap();
        assert!(seen.starts_with("POST /server/auth/authenticate"));
        assert!(seen.contains(r#""username":"bob""#));
        assert!(seen.contains(r#""service":"factory""#));
    }

    #[tokio::test]
    async fn test_error_status() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let client = HttpAuthClient::new(&url, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.authorize(&request()).await, Err(AuthServiceError::Status(503)));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (url, _server) = serve_once("200 OK", "<html>").await;
        let client = HttpAuthClient::new(&url, DEFAULT_TIMEOUT).unwrap();
        assert!(matches!(
            client.authorize(&request()).await,
            Err(AuthServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/auth", listener.local_addr().unwrap());
        drop(listener);
        let client = HttpAuthClient::new(&url, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.authorize(&request()).await,
            Err(AuthServiceError::Unreachable(_))
        ));
    }
}
