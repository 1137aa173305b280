use motion_preview_common::frame::Frame;
use motion_preview_detector::decode_bgr;
use std::time::Duration;
use tracing::{debug, info};

use super::{CaptureError, FrameSource, Resolution};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls a network camera's single-image endpoint, one request per capture.
pub struct HttpSnapshotSource {
    url: String,
    client: Option<reqwest::Client>,
    resolution: Option<Resolution>,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: None,
            resolution: None,
        }
    }
}

impl FrameSource for HttpSnapshotSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn configure(&mut self, resolution: Resolution) {
        self.resolution = Some(resolution);
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        self.client = Some(client);
        info!(url = %self.url, "HTTP frame source started");
        Ok(())
    }

    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        let client = self.client.as_ref().ok_or(CaptureError::NotStarted("http"))?;

        let response = client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        debug!(bytes = body.len(), "fetched camera image");

        let size = self.resolution.map(|r| (r.width, r.height));
        let frame = tokio::task::spawn_blocking(move || decode_bgr(&body, size))
            .await
            .map_err(|e| CaptureError::Worker(e.to_string()))??;
        Ok(frame)
    }

    fn stop(&mut self) {
        if self.client.take().is_some() {
            info!(url = %self.url, "HTTP frame source stopped");
        }
    }
}
