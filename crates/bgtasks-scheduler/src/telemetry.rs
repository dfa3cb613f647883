//! Telemetry dispatch: POSTs device and run reports to the backend.
//! Fire-and-forget: one attempt, no retry. Callers log and discard errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use bgtasks_core::config::TelemetryConfig;
use bgtasks_core::error::{BgTasksError, Result};
use bgtasks_core::traits::TelemetrySink;
use bgtasks_core::types::{DeviceMetadata, RunRecord};

/// HTTP telemetry client.
pub struct HttpTelemetry {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTelemetry {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn url(&self, device_id: &str, path: &str) -> String {
        format!("{}/device/{device_id}/{path}", self.base_url)
    }

    async fn post<B: Serialize + Sync>(&self, what: &str, url: &str, body: &B) -> Result<()> {
        tracing::info!("📡 Sending {what} to backend");
        let resp = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BgTasksError::Http(format!("{what} send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Sent {what} to backend");
            Ok(())
        } else {
            Err(BgTasksError::Telemetry(format!(
                "{what} rejected: {}",
                resp.status()
            )))
        }
    }
}

#[derive(Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct NotificationStatusBody {
    authorized: bool,
}

#[async_trait]
impl TelemetrySink for HttpTelemetry {
    async fn register_device_metadata(
        &self,
        device_id: &str,
        metadata: &DeviceMetadata,
    ) -> Result<()> {
        self.post("device metadata", &self.url(device_id, "metadata"), metadata)
            .await
    }

    async fn register_push_token(&self, device_id: &str, token: &str) -> Result<()> {
        self.post("device token", &self.url(device_id, "token"), &TokenBody { token })
            .await
    }

    async fn register_notification_status(&self, device_id: &str, authorized: bool) -> Result<()> {
        self.post(
            "notification status",
            &self.url(device_id, "notification/status"),
            &NotificationStatusBody { authorized },
        )
        .await
    }

    async fn record_refresh_run(&self, device_id: &str, record: &RunRecord) -> Result<()> {
        self.post(
            "app refresh task record",
            &self.url(device_id, "bgtask/apprefresh"),
            record,
        )
        .await
    }

    async fn record_processing_run(&self, device_id: &str, record: &RunRecord) -> Result<()> {
        self.post(
            "processing task record",
            &self.url(device_id, "bgtask/processing"),
            record,
        )
        .await
    }
}

/// Sink used when telemetry is disabled in config.
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn register_device_metadata(&self, _: &str, _: &DeviceMetadata) -> Result<()> {
        Ok(())
    }

    async fn register_push_token(&self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }

    async fn register_notification_status(&self, _: &str, _: bool) -> Result<()> {
        Ok(())
    }

    async fn record_refresh_run(&self, _: &str, _: &RunRecord) -> Result<()> {
        Ok(())
    }

    async fn record_processing_run(&self, _: &str, _: &RunRecord) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpTelemetry {
        HttpTelemetry::new(&TelemetryConfig {
            enabled: true,
            base_url: format!("{}/", server.uri()),
            timeout_secs: 5,
        })
    }

    fn record(task_num: usize) -> RunRecord {
        RunRecord {
            unix_ts_millis: 1_760_000_000_000,
            battery_level: -1.0,
            battery_state: "unknown".into(),
            task_num,
            connectivity: "connected".into(),
        }
    }

    #[tokio::test]
    async fn test_processing_run_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/device/DEV-1/bgtask/processing"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "unix_ts_millis": 1_760_000_000_000u64,
                "battery_level": -1.0,
                "battery_state": "unknown",
                "task_num": 2,
                "connectivity": "connected"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .record_processing_run("DEV-1", &record(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_device_registration_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/device/DEV-1/token"))
            .and(body_json(serde_json::json!({ "token": "abcd" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/device/DEV-1/notification/status"))
            .and(body_json(serde_json::json!({ "authorized": false })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/device/DEV-1/metadata"))
            .and(body_json(serde_json::json!({
                "system_name": "Linux",
                "system_version": "Debian 13",
                "model": "box"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = client(&server);
        sink.register_push_token("DEV-1", "abcd").await.unwrap();
        sink.register_notification_status("DEV-1", false).await.unwrap();
        sink.register_device_metadata(
            "DEV-1",
            &DeviceMetadata {
                system_name: "Linux".into(),
                system_version: "Debian 13".into(),
                model: "box".into(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/device/DEV-1/bgtask/apprefresh"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .record_refresh_run("DEV-1", &record(0))
            .await
            .unwrap_err();
        assert!(matches!(err, BgTasksError::Telemetry(_)));
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_an_error() {
        let sink = HttpTelemetry::new(&TelemetryConfig {
            enabled: true,
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
        });
        let err = sink.record_refresh_run("DEV-1", &record(0)).await.unwrap_err();
        assert!(matches!(err, BgTasksError::Http(_)));
    }
}
