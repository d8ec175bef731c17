//! Delivery of the FileVault key and the deployment log to the collector.

use macdeploy_common::{Error, Result};
use macdeploy_report_schema::{CollectorResponse, Payload};
use std::time::Duration;
use tracing::{debug, info};

pub struct ResultReporter {
    client: reqwest::Client,
    host: String,
}

impl ResultReporter {
    pub fn new(host: &str) -> Result<Self> {
        // The collector runs on a private host with a certificate no public
        // CA signed. Skipping verification is a trust decision for that host.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: host.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Bare GET on the host. `Ok(false)` means it answered with something
    /// other than 200.
    pub async fn verify_connection(&self) -> Result<bool> {
        let response = self
            .client
            .get(&self.host)
            .send()
            .await
            .map_err(|e| Error::Unreachable(format!("{}: {}", self.host, e)))?;
        debug!("Collector answered {}", response.status());
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    /// POST `payload` and decode the `{status, content}` reply.
    pub async fn post_data<P: Payload>(&self, payload: &P) -> Result<CollectorResponse> {
        let url = format!("{}{}", self.host, payload.endpoint());
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Http(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading reply from {}: {}", url, e)))?;
        serde_json::from_str(&body).map_err(|e| {
            Error::Http(format!("unexpected reply from {} ({}): {}", url, status, e))
        })
    }

    /// [`post_data`](Self::post_data), treating any status other than
    /// `success` as a failure.
    pub async fn send<P: Payload>(&self, payload: &P) -> Result<CollectorResponse> {
        let response = self.post_data(payload).await?;
        if !response.is_success() {
            return Err(Error::Rejected(format!(
                "{} returned status {:?}: {}",
                payload.kind(),
                response.status,
                response.content
            )));
        }
        info!("Sent {} to {}", payload.kind(), self.host);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCollector;
    use macdeploy_report_schema::{FileVaultPayload, LogPayload};

    #[tokio::test]
    async fn test_verify_connection() {
        let collector = MockCollector::start("success", "success").await;
        let reporter = ResultReporter::new(&format!("{}/", collector.url)).unwrap();
        assert_eq!(reporter.host(), collector.url);
        assert!(reporter.verify_connection().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_collector() {
        let reporter = ResultReporter::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            reporter.verify_connection().await,
            Err(Error::Unreachable(_))
        ));
        let err = reporter
            .send(&FileVaultPayload::new("KEY", "C02"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[tokio::test]
    async fn test_send_posts_wire_format() {
        let collector = MockCollector::start("success", "success").await;
        let reporter = ResultReporter::new(&collector.url).unwrap();
        let response = reporter
            .send(&FileVaultPayload::new("KEY-1", "C02XYZ"))
            .await
            .unwrap();
        assert!(response.is_success());

        let requests = collector.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/api/fv");
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["key"], "KEY-1");
        assert_eq!(body["serialTag"], "C02XYZ");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let collector = MockCollector::start("success", "error").await;
        let reporter = ResultReporter::new(&collector.url).unwrap();
        let mut payload = LogPayload::new("run.log");
        payload.set_body("content");

        // transport succeeded, status says otherwise
        let raw = reporter.post_data(&payload).await.unwrap();
        assert_eq!(raw.status, "error");
        assert!(matches!(
            reporter.send(&payload).await,
            Err(Error::Rejected(_))
        ));
    }
}
