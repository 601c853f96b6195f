//! Smoke test verification
//!
//! Sends one prediction request to the deployed service and checks the shape
//! of the answer. Read-only with respect to the deployment.

use serde_json::{Value as JsonValue, json};
use shipyard_client::PredictionClient;
use shipyard_core::StageError;
use shipyard_core::domain::deployment::ServiceEndpoint;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Default smoke test payload: one passenger of the Titanic dataset
pub fn sample_payload() -> JsonValue {
    json!({
        "Pclass": [1],
        "Sex": ["male"],
        "Age": [32],
        "SibSp": [1],
        "Parch": [0],
        "Fare": [100],
        "Embarked": ["S"]
    })
}

/// Outcome of a successful smoke test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub endpoint: ServiceEndpoint,
    pub prediction: Vec<i64>,
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} predicted {:?}", self.endpoint, self.prediction)
    }
}

/// Runs the smoke test against a deployed endpoint
#[derive(Debug, Clone)]
pub struct Verifier {
    timeout: Duration,
}

impl Verifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn verify(
        &self,
        endpoint: &ServiceEndpoint,
        service_name: &str,
        api_version: &str,
        payload: &JsonValue,
    ) -> Result<VerificationReport, StageError> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| StageError::Verification(format!("cannot create HTTP client: {}", e)))?;
        let client = PredictionClient::with_client(endpoint.base_url(), http);

        info!(
            "Verifying {}",
            client.predict_url(service_name, api_version)
        );
        let body = client
            .predict(service_name, api_version, payload)
            .await
            .map_err(|e| StageError::Verification(e.to_string()))?;

        let prediction = parse_prediction(&body).map_err(StageError::Verification)?;

        info!("Smoke test passed: prediction {:?}", prediction);
        Ok(VerificationReport {
            endpoint: endpoint.clone(),
            prediction,
        })
    }
}

/// Expects `{"prediction": [<int>, ...]}` with at least one element
fn parse_prediction(body: &JsonValue) -> Result<Vec<i64>, String> {
    let field = body
        .get("prediction")
        .ok_or_else(|| format!("response has no 'prediction' field: {}", body))?;

    let values = field
        .as_array()
        .filter(|values| !values.is_empty())
        .ok_or_else(|| format!("'prediction' is not a non-empty array: {}", field))?;

    values
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| format!("'prediction' holds a non-integer value: {}", v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn endpoint_returning(response: ResponseTemplate) -> (MockServer, ServiceEndpoint) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/titanic/v1/predict"))
            .and(body_json(sample_payload()))
            .respond_with(response)
            .mount(&server)
            .await;

        let address = server.address();
        let endpoint = ServiceEndpoint::new(address.ip().to_string(), address.port());
        (server, endpoint)
    }

    #[test]
    fn test_parse_prediction() {
        assert_eq!(parse_prediction(&json!({"prediction": [1]})), Ok(vec![1]));
        assert_eq!(
            parse_prediction(&json!({"prediction": [0, 1], "model": "v3"})),
            Ok(vec![0, 1])
        );
        assert!(parse_prediction(&json!({"result": [1]})).is_err());
        assert!(parse_prediction(&json!({"prediction": []})).is_err());
        assert!(parse_prediction(&json!({"prediction": 1})).is_err());
        assert!(parse_prediction(&json!({"prediction": ["yes"]})).is_err());
        assert!(parse_prediction(&json!({"prediction": [0.7]})).is_err());
    }

    #[tokio::test]
    async fn test_verify_success() {
        let (_server, endpoint) =
            endpoint_returning(ResponseTemplate::new(200).set_body_json(json!({"prediction": [1]})))
                .await;

        let report = Verifier::new(Duration::from_secs(5))
            .verify(&endpoint, "titanic", "1", &sample_payload())
            .await
            .unwrap();

        assert_eq!(report.prediction, vec![1]);
        assert_eq!(report.endpoint, endpoint);
    }

    #[tokio::test]
    async fn test_verify_missing_prediction() {
        let (_server, endpoint) =
            endpoint_returning(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
                .await;

        let result = Verifier::new(Duration::from_secs(5))
            .verify(&endpoint, "titanic", "1", &sample_payload())
            .await;

        assert!(matches!(result, Err(StageError::Verification(_))));
    }

    #[tokio::test]
    async fn test_verify_error_status() {
        let (_server, endpoint) =
            endpoint_returning(ResponseTemplate::new(503).set_body_string("warming up")).await;

        let result = Verifier::new(Duration::from_secs(5))
            .verify(&endpoint, "titanic", "1", &sample_payload())
            .await;

        match result {
            Err(StageError::Verification(msg)) => assert!(msg.contains("503")),
            other => panic!("Expected verification error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_connection_failure() {
        let result = Verifier::new(Duration::from_secs(5))
            .verify(
                &ServiceEndpoint::new("127.0.0.1", 9),
                "titanic",
                "1",
                &sample_payload(),
            )
            .await;

        assert!(matches!(result, Err(StageError::Verification(_))));
    }
}
