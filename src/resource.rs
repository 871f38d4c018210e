use std::time::Duration;

use crate::error::ResourceError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of raw artwork bytes.
pub trait ResourceProvider: Send + Sync {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ResourceError>;
}

pub struct HttpResourceProvider {
    http: reqwest::blocking::Client,
}

impl HttpResourceProvider {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }
}

impl ResourceProvider for HttpResourceProvider {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        let fail = |reason: String| ResourceError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status.as_u16())));
        }
        let bytes = response.bytes().map_err(|e| fail(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
