//! HTTP client for the page-detection and device-control service.
//!
//! The service watches the device's video output, reports the page it
//! currently recognizes, and forwards key presses and app launches to the
//! device. Control endpoints reply with the resulting page when the service
//! already knows it, sparing the loop a re-detection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::command::Key;
use crate::page::{AttrValue, PageSnapshot};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The service reported 404. Recoverable: the model referenced something
    /// that does not exist on the device.
    #[error("{0}")]
    MissingResource(String),
    #[error("device service error ({status}): {message}")]
    Status { status: StatusCode, message: String },
    #[error("device request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Read side: what page is on screen right now.
#[async_trait]
pub trait PageDetector: Send + Sync {
    /// The page the detector currently recognizes, or `None` if the screen
    /// doesn't match any known page.
    async fn poll_page(&self) -> Result<Option<PageSnapshot>, DeviceError>;
}

/// Write side: key presses, app launches and page actions.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn press(&self, key: Key) -> Result<(), DeviceError>;
    async fn launch_app(&self, name: &str) -> Result<Option<PageSnapshot>, DeviceError>;
    async fn invoke_action(
        &self,
        name: &str,
        args: &[AttrValue],
    ) -> Result<Option<PageSnapshot>, DeviceError>;
}

pub struct HttpDeviceClient {
    client: Client,
    base_url: String,
}

impl HttpDeviceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DeviceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn page_from_response(
        response: reqwest::Response,
    ) -> Result<Option<PageSnapshot>, DeviceError> {
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status.is_success() {
            return Ok(Some(response.json().await?));
        }
        Err(Self::failure(response).await)
    }

    async fn failure(response: reqwest::Response) -> DeviceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body
        };
        if status == StatusCode::NOT_FOUND {
            DeviceError::MissingResource(message)
        } else {
            DeviceError::Status { status, message }
        }
    }
}

#[async_trait]
impl PageDetector for HttpDeviceClient {
    async fn poll_page(&self) -> Result<Option<PageSnapshot>, DeviceError> {
        let response = self.client.get(self.url("/v1/page")).send().await?;
        Self::page_from_response(response).await
    }
}

#[async_trait]
impl DeviceControl for HttpDeviceClient {
    async fn press(&self, key: Key) -> Result<(), DeviceError> {
        debug!(key = key.name(), "press");
        let response = self
            .client
            .post(self.url("/v1/press"))
            .json(&json!({"key": key.name()}))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn launch_app(&self, name: &str) -> Result<Option<PageSnapshot>, DeviceError> {
        debug!(app = name, "launch app");
        let response = self
            .client
            .post(self.url("/v1/launch"))
            .json(&json!({"app": name}))
            .send()
            .await?;
        Self::page_from_response(response).await
    }

    async fn invoke_action(
        &self,
        name: &str,
        args: &[AttrValue],
    ) -> Result<Option<PageSnapshot>, DeviceError> {
        debug!(action = name, "invoke page action");
        let response = self
            .client
            .post(self.url("/v1/action"))
            .json(&json!({"name": name, "args": args}))
            .send()
            .await?;
        Self::page_from_response(response).await
    }
}
