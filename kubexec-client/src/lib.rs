//! Kubexec cluster client
//!
//! A small, type-safe HTTP client for the cluster `batch/v1` Jobs API.
//!
//! Only the three calls the executor needs are provided: creating a job from
//! a manifest, reading a job back, and deleting it.
//!
//! # Example
//!
//! ```no_run
//! use kubexec_client::ClusterClient;
//! use kubexec_core::domain::job::JobIdentifier;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ClusterClient::new("http://localhost:8001", "default");
//!
//!     let job = client.get_job(&JobIdentifier::from_name("dagA-taskX-1-1704067200")).await?;
//!     println!("status: {:?}", job.status.classify());
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use kubexec_core::dto::job::ClusterJob;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// HTTP client for the cluster Jobs API of one namespace
#[derive(Debug, Clone)]
pub struct ClusterClient {
    /// Base URL of the API server (e.g., "http://localhost:8001")
    base_url: String,
    /// Namespace jobs are created in
    namespace: String,
    /// Bearer token, if the API server requires one
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl ClusterClient {
    /// Create a new cluster client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the API server (e.g., "http://localhost:8001")
    /// * `namespace` - Namespace to manage jobs in
    ///
    /// # Example
    /// ```
    /// use kubexec_client::ClusterClient;
    ///
    /// let client = ClusterClient::new("http://localhost:8001", "default");
    /// ```
    pub fn new(base_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::with_client(base_url, namespace, Client::new())
    }

    /// Create a new cluster client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use kubexec_client::ClusterClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = ClusterClient::with_client("https://10.0.0.1:6443", "airflow", http_client);
    /// ```
    pub fn with_client(
        base_url: impl Into<String>,
        namespace: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token: None,
            client,
        }
    }

    /// Authenticate every request with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL of the API server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the namespace jobs are managed in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// URL of the jobs collection in this client's namespace
    fn jobs_url(&self) -> String {
        format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.base_url, self.namespace
        )
    }

    /// URL of a single job in this client's namespace
    fn job_url(&self, name: &str) -> String {
        format!("{}/{}", self.jobs_url(), name)
    }

    /// Attach the bearer token, if configured
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
