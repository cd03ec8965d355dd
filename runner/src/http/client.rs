//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::RunnerError;

/// Request timeout for control plane calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for control plane communication
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl HttpClient {
    /// Create a new HTTP client authenticating with the runner token
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, RunnerError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("deployr-runner/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token.expose_secret()))
            .header(header::ACCEPT, "application/json")
    }

    async fn send(&self, method: &str, url: &str, request: RequestBuilder) -> Result<Response, RunnerError> {
        let response = self.authorized(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} {} failed: {} - {}", method, url, status, body);
            return Err(RunnerError::ControlPlaneError(format!("{}: {}", status, body)));
        }

        Ok(response)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RunnerError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self.send("GET", &url, self.client.get(&url)).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request and ignore the response body
    pub async fn post_ack<B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<(), RunnerError> {
        let url = self.url(path);
        debug!("POST {}", url);

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send("POST", &url, request).await?;
        Ok(())
    }
}
