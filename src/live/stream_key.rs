use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Client for the media server's control API, which owns room publish keys.
#[derive(Clone)]
pub struct StreamKeys {
    client: reqwest::Client,
    base: String,
}

#[derive(Debug, Error)]
pub enum StreamKeyError {
    #[error("control request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("control api answered {0}")]
    Status(u16),
    #[error("control api returned no key")]
    Empty,
}

/// `GET /control/get` answers `{"status":200,"data":"<key>"}`.
#[derive(Debug, Deserialize)]
struct ControlResponse {
    status: u16,
    #[serde(default)]
    data: Option<String>,
}

fn key_from(body: ControlResponse) -> Result<String, StreamKeyError> {
    if body.status != 200 {
        return Err(StreamKeyError::Status(body.status));
    }
    body.data
        .filter(|k| !k.is_empty())
        .ok_or(StreamKeyError::Empty)
}

impl StreamKeys {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, StreamKeyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    /// The publish key of `room`. The media server creates one on first ask.
    pub async fn fetch(&self, room: &str) -> Result<String, StreamKeyError> {
        let response = self
            .client
            .get(format!("{}/control/get", self.base))
            .query(&[("room", room)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StreamKeyError::Status(response.status().as_u16()));
        }
        key_from(response.json().await?)
    }
}
