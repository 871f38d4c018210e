use thiserror::Error;

/// Failures from the playback service. None of them is fatal to the poller
/// or the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Access token expired or was revoked; re-authenticate and retry.
    #[error("authorization expired: {0}")]
    AuthExpired(String),
    /// Network trouble, timeouts, rate limiting or a server-side hiccup.
    #[error("transient playback API failure: {0}")]
    Transient(String),
    /// Premium-only feature, restricted device or no active device.
    #[error("command restricted: {0}")]
    Restricted(String),
}

impl ApiError {
    /// Classify a non-success HTTP status from the playback service.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        match status {
            401 => ApiError::AuthExpired(detail),
            403 | 404 => ApiError::Restricted(detail),
            _ => ApiError::Transient(detail),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ApiError::from_status(status.as_u16(), "");
        }
        ApiError::Transient(err.to_string())
    }
}

/// Failures while turning an artwork URL into an image and accent color.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to decode artwork: {0}")]
    Decode(#[from] image::ImageError),
    #[error("artwork has no opaque pixels")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_recovery_classes() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::AuthExpired(_)));
        assert!(matches!(
            ApiError::from_status(403, "restriction violated"),
            ApiError::Restricted(_)
        ));
        assert!(matches!(ApiError::from_status(404, ""), ApiError::Restricted(_)));
        assert!(matches!(ApiError::from_status(429, ""), ApiError::Transient(_)));
        assert!(matches!(ApiError::from_status(502, ""), ApiError::Transient(_)));
    }

    #[test]
    fn status_detail_keeps_body() {
        let err = ApiError::from_status(403, " PREMIUM_REQUIRED ");
        assert_eq!(err, ApiError::Restricted("HTTP 403: PREMIUM_REQUIRED".into()));
    }
}
