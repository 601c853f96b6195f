//! Shipyard HTTP Client
//!
//! A small, type-safe HTTP client for the prediction API exposed by a deployed
//! inference service.
//!
//! # Example
//!
//! ```no_run
//! use shipyard_client::PredictionClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PredictionClient::new("http://10.0.0.7:80");
//!
//!     let body = client
//!         .predict("titanic", "1", &serde_json::json!({"Pclass": [1]}))
//!         .await?;
//!
//!     println!("Prediction: {}", body);
//!     Ok(())
//! }
//! ```

pub mod error;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

/// HTTP client for an inference service
#[derive(Debug, Clone)]
pub struct PredictionClient {
    /// Base URL of the service (e.g., "http://10.0.0.7:80")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl PredictionClient {
    /// Create a new prediction client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the service (e.g., "http://10.0.0.7:80")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new prediction client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the predict route: `/<service-name>/v<api-version>/predict`
    ///
    /// A leading `v` on the version is accepted, so `1` and `v1` are the same.
    pub fn predict_url(&self, service_name: &str, api_version: &str) -> String {
        let version = api_version.trim_start_matches(['v', 'V']);
        format!("{}/{}/v{}/predict", self.base_url, service_name, version)
    }

    /// Send a prediction request and return the JSON response body
    ///
    /// # Arguments
    /// * `service_name` - Service name used as the first path segment
    /// * `api_version` - API version used as the second path segment
    /// * `payload` - Feature-name-to-array mapping
    pub async fn predict<P: Serialize + ?Sized>(
        &self,
        service_name: &str,
        api_version: &str,
        payload: &P,
    ) -> Result<JsonValue> {
        let url = self.predict_url(service_name, api_version);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(payload).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response(&self, response: reqwest::Response) -> Result<JsonValue> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ClientError::ParseError(format!("Failed to parse JSON response: {}: {}", e, body))
        })
    }
}
